//! Value types for a single aggregation operation and a single grouping clause.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

use crate::error::QueryBuildError;

/// Semantic type of a metric, used to decode the value the service returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricValueType {
    Numeric,
    Date,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregationType {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    ApproximateDistinct,
}

impl AggregationType {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregationType::Count => "count",
            AggregationType::Sum => "sum",
            AggregationType::Avg => "avg",
            AggregationType::Min => "min",
            AggregationType::Max => "max",
            AggregationType::ApproximateDistinct => "approximateDistinct",
        }
    }
}

impl Display for AggregationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One aggregation in a request.
///
/// `named_aggregation` is true for the single-metric terminal calls, whose
/// result is a bare value, and false for entries of a multi-aggregation batch,
/// whose result is keyed by `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationClause {
    #[serde(rename = "type")]
    pub aggregation_type: AggregationType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub metric_value_type: MetricValueType,
    pub named_aggregation: bool,
}

impl AggregationClause {
    pub fn count(name: impl Into<String>, named_aggregation: bool) -> Self {
        Self {
            aggregation_type: AggregationType::Count,
            name: name.into(),
            field: None,
            metric_value_type: MetricValueType::Numeric,
            named_aggregation,
        }
    }

    pub fn on_field(
        aggregation_type: AggregationType,
        name: impl Into<String>,
        field: impl Into<String>,
        metric_value_type: MetricValueType,
        named_aggregation: bool,
    ) -> Self {
        Self {
            aggregation_type,
            name: name.into(),
            field: Some(field.into()),
            metric_value_type,
            named_aggregation,
        }
    }
}

/// Operations that aggregate the values of one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldOperation {
    Min,
    Max,
    Avg,
    Sum,
    ApproximateDistinct,
}

impl FieldOperation {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "min" => Some(FieldOperation::Min),
            "max" => Some(FieldOperation::Max),
            "avg" => Some(FieldOperation::Avg),
            "sum" => Some(FieldOperation::Sum),
            "approximateDistinct" => Some(FieldOperation::ApproximateDistinct),
            _ => None,
        }
    }
}

impl From<FieldOperation> for AggregationType {
    fn from(op: FieldOperation) -> Self {
        match op {
            FieldOperation::Min => AggregationType::Min,
            FieldOperation::Max => AggregationType::Max,
            FieldOperation::Avg => AggregationType::Avg,
            FieldOperation::Sum => AggregationType::Sum,
            FieldOperation::ApproximateDistinct => AggregationType::ApproximateDistinct,
        }
    }
}

/// Descriptor for one entry of a multi-aggregation batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationOperation {
    Count,
    Field {
        property_api_name: String,
        operation: FieldOperation,
    },
}

impl AggregationOperation {
    pub fn count() -> Self {
        AggregationOperation::Count
    }

    /// Decodes a descriptor of the form `{"operation": "sum", "propertyApiName": "salary"}`.
    pub fn from_json(descriptor: &Value) -> Result<Self, QueryBuildError> {
        let tag = descriptor
            .get("operation")
            .and_then(Value::as_str)
            .ok_or_else(|| QueryBuildError::UnknownAggregationType {
                tag: descriptor
                    .get("operation")
                    .map(Value::to_string)
                    .unwrap_or_else(|| "<missing>".to_string()),
            })?;

        if tag == "count" {
            return Ok(AggregationOperation::Count);
        }

        let operation = FieldOperation::from_tag(tag).ok_or_else(|| {
            QueryBuildError::UnknownAggregationType {
                tag: tag.to_string(),
            }
        })?;
        let property_api_name = descriptor
            .get("propertyApiName")
            .and_then(Value::as_str)
            .ok_or_else(|| QueryBuildError::MalformedAggregation {
                reason: format!("`{}` requires a `propertyApiName`", tag),
            })?;

        Ok(AggregationOperation::Field {
            property_api_name: property_api_name.to_string(),
            operation,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DurationUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Quarters,
    Years,
}

impl DurationUnit {
    /// Whether the unit is coarse enough for date-only properties.
    pub fn applies_to_dates(self) -> bool {
        self >= DurationUnit::Days
    }
}

/// One bucket boundary pair; either side may be open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRange {
    #[serde(rename = "startValue", default, skip_serializing_if = "Option::is_none")]
    pub start_value: Option<Value>,
    #[serde(rename = "endValue", default, skip_serializing_if = "Option::is_none")]
    pub end_value: Option<Value>,
}

impl AggregationRange {
    pub fn numeric(start: Option<f64>, end: Option<f64>) -> Self {
        Self {
            start_value: start.map(Value::from),
            end_value: end.map(Value::from),
        }
    }

    pub fn dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            start_value: start.map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
            end_value: end.map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
        }
    }

    pub fn timestamps(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self {
            start_value: start.map(|t| Value::String(t.to_rfc3339())),
            end_value: end.map(|t| Value::String(t.to_rfc3339())),
        }
    }

    pub(crate) fn bounds(&self) -> impl Iterator<Item = &Value> {
        self.start_value.iter().chain(self.end_value.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BucketKind {
    Exact {
        #[serde(rename = "maxGroupCount", default, skip_serializing_if = "Option::is_none")]
        max_group_count: Option<u32>,
    },
    FixedWidth {
        #[serde(rename = "fixedWidth")]
        fixed_width: f64,
    },
    Ranges { ranges: Vec<AggregationRange> },
    Duration { value: u32, unit: DurationUnit },
}

impl BucketKind {
    pub fn name(&self) -> &'static str {
        match self {
            BucketKind::Exact { .. } => "exact",
            BucketKind::FixedWidth { .. } => "fixedWidth",
            BucketKind::Ranges { .. } => "ranges",
            BucketKind::Duration { .. } => "duration",
        }
    }
}

/// A single group-by instruction.
///
/// Only [`GroupableProperty`](super::GroupableProperty) creates these, which
/// records the object type the property was selected from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalBucketing {
    pub field: String,
    #[serde(flatten)]
    pub kind: BucketKind,
    #[serde(skip)]
    pub(crate) object_type: String,
}

impl InternalBucketing {
    pub(crate) fn new(object_type: &str, field: &str, kind: BucketKind) -> Self {
        Self {
            field: field.to_string(),
            kind,
            object_type: object_type.to_string(),
        }
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }
}
