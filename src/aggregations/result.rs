//! Aggregation responses: the wire shape and the decoded result.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::clause::{AggregationClause, MetricValueType};
use crate::error::AggregateObjectsError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateObjectsResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<String>,
    #[serde(default)]
    pub data: Vec<AggregateObjectsResponseItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateObjectsResponseItem {
    #[serde(default)]
    pub group: BTreeMap<String, Value>,
    #[serde(default)]
    pub metrics: Vec<AggregationMetric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationMetric {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

/// A metric decoded according to its [`MetricValueType`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Numeric(f64),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Null,
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetricValue::Null)
    }

    fn decode(raw: &Value, metric_value_type: MetricValueType) -> Result<Self, String> {
        if raw.is_null() {
            return Ok(MetricValue::Null);
        }
        match metric_value_type {
            MetricValueType::Numeric => raw
                .as_f64()
                .or_else(|| raw.as_str().and_then(|s| s.parse().ok()))
                .map(MetricValue::Numeric)
                .ok_or_else(|| format!("expected a number, got {}", raw)),
            MetricValueType::Date => {
                let text = raw.as_str().ok_or_else(|| format!("expected a date, got {}", raw))?;
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .or_else(|_| DateTime::parse_from_rfc3339(text).map(|t| t.date_naive()))
                    .map(MetricValue::Date)
                    .map_err(|e| format!("invalid date `{}`: {}", text, e))
            }
            MetricValueType::Timestamp => {
                let text = raw
                    .as_str()
                    .ok_or_else(|| format!("expected a timestamp, got {}", raw))?;
                DateTime::parse_from_rfc3339(text)
                    .map(|t| MetricValue::Timestamp(t.with_timezone(&Utc)))
                    .map_err(|e| format!("invalid timestamp `{}`: {}", text, e))
            }
        }
    }
}

/// Metrics of one bucket: a bare value for a single terminal metric, or the
/// batch keyed by the caller's names.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Metrics {
    Value(MetricValue),
    Named(BTreeMap<String, MetricValue>),
}

impl Metrics {
    pub fn value(&self) -> Option<&MetricValue> {
        match self {
            Metrics::Value(value) => Some(value),
            Metrics::Named(_) => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        match self {
            Metrics::Named(named) => named.get(name),
            Metrics::Value(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationBucket {
    pub group: BTreeMap<String, Value>,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregationData {
    Buckets(Vec<AggregationBucket>),
    Metrics(Metrics),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded_items: Option<u64>,
    pub data: AggregationData,
}

impl AggregationResult {
    pub fn buckets(&self) -> Option<&[AggregationBucket]> {
        match &self.data {
            AggregationData::Buckets(buckets) => Some(buckets),
            AggregationData::Metrics(_) => None,
        }
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        match &self.data {
            AggregationData::Metrics(metrics) => Some(metrics),
            AggregationData::Buckets(_) => None,
        }
    }

    /// Decodes a response for the given clauses. Without group-by clauses the
    /// service answers with at most one bucket whose group is empty.
    pub(crate) fn decode(
        clauses: &[AggregationClause],
        grouped: bool,
        response: AggregateObjectsResponse,
    ) -> Result<Self, AggregateObjectsError> {
        let excluded_items = response.excluded_items;

        if grouped {
            let buckets = response
                .data
                .into_iter()
                .map(|item| {
                    Ok(AggregationBucket {
                        group: item.group,
                        metrics: decode_metrics(clauses, item.metrics)?,
                    })
                })
                .collect::<Result<Vec<_>, AggregateObjectsError>>()?;
            return Ok(Self {
                excluded_items,
                data: AggregationData::Buckets(buckets),
            });
        }

        let mut data = response.data;
        if data.len() > 1 {
            return Err(AggregateObjectsError::malformed_response(format!(
                "expected a single ungrouped bucket, got {}",
                data.len()
            )));
        }
        let metrics = data.pop().map(|item| item.metrics).unwrap_or_default();
        Ok(Self {
            excluded_items,
            data: AggregationData::Metrics(decode_metrics(clauses, metrics)?),
        })
    }
}

fn decode_metrics(
    clauses: &[AggregationClause],
    metrics: Vec<AggregationMetric>,
) -> Result<Metrics, AggregateObjectsError> {
    let mut raw: BTreeMap<String, Value> = metrics.into_iter().map(|m| (m.name, m.value)).collect();
    let mut decode = |clause: &AggregationClause| {
        let value = raw.remove(&clause.name).unwrap_or(Value::Null);
        MetricValue::decode(&value, clause.metric_value_type).map_err(|reason| {
            let message = format!("metric `{}`: {}", clause.name, reason);
            AggregateObjectsError::malformed_response(message)
        })
    };

    match clauses {
        [single] if single.named_aggregation => Ok(Metrics::Value(decode(single)?)),
        _ => {
            let mut named = BTreeMap::new();
            for clause in clauses {
                named.insert(clause.name.clone(), decode(clause)?);
            }
            Ok(Metrics::Named(named))
        }
    }
}
