//! Property capability maps.
//!
//! For one object type, three independent maps say which properties can be
//! aggregated by a single terminal metric, which can be grouped on, and which
//! can take part in a multi-aggregation batch. The maps are derived from the
//! generated metadata alone and never change after construction.

use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::clause::{
    AggregationOperation, AggregationRange, BucketKind, DurationUnit, FieldOperation,
    InternalBucketing, MetricValueType,
};
use crate::error::QueryBuildError;
use crate::metadata::{OntologyDefinition, PropertyType};

/// Property selectable by `min`, `max`, `avg`, `sum` and `approximate_distinct`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatableProperty {
    object_type: String,
    property_api_name: String,
    property_type: PropertyType,
    metric_value_type: MetricValueType,
}

impl AggregatableProperty {
    pub fn property_api_name(&self) -> &str {
        &self.property_api_name
    }

    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    pub fn metric_value_type(&self) -> MetricValueType {
        self.metric_value_type
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn supports(&self, operation: FieldOperation) -> bool {
        match operation {
            FieldOperation::ApproximateDistinct => true,
            FieldOperation::Sum => self.property_type.is_numeric(),
            FieldOperation::Min | FieldOperation::Max | FieldOperation::Avg => !matches!(
                self.property_type,
                PropertyType::String | PropertyType::Boolean
            ),
        }
    }

    /// Value type of the metric `operation` produces over this property.
    ///
    /// Approximate distinct is a count, so it decodes as NUMERIC even over
    /// date, timestamp or string properties. Every other operation keeps the
    /// property's own metric value type.
    pub fn metric_value_type_for(&self, operation: FieldOperation) -> MetricValueType {
        match operation {
            FieldOperation::ApproximateDistinct => MetricValueType::Numeric,
            _ => self.metric_value_type,
        }
    }
}

/// Property usable inside a multi-aggregation batch.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipleAggregatableProperty(AggregatableProperty);

impl MultipleAggregatableProperty {
    pub fn property_api_name(&self) -> &str {
        self.0.property_api_name()
    }

    pub fn metric_value_type(&self) -> MetricValueType {
        self.0.metric_value_type()
    }

    pub fn as_aggregatable(&self) -> &AggregatableProperty {
        &self.0
    }

    fn operation(&self, operation: FieldOperation) -> AggregationOperation {
        AggregationOperation::Field {
            property_api_name: self.0.property_api_name.clone(),
            operation,
        }
    }

    pub fn min(&self) -> AggregationOperation {
        self.operation(FieldOperation::Min)
    }

    pub fn max(&self) -> AggregationOperation {
        self.operation(FieldOperation::Max)
    }

    pub fn avg(&self) -> AggregationOperation {
        self.operation(FieldOperation::Avg)
    }

    pub fn sum(&self) -> AggregationOperation {
        self.operation(FieldOperation::Sum)
    }

    pub fn approximate_distinct(&self) -> AggregationOperation {
        self.operation(FieldOperation::ApproximateDistinct)
    }
}

/// Property that can be bucketed by `group_by`.
///
/// The bucketing constructors never fail; the aggregation builder validates
/// the resulting [`InternalBucketing`] before accepting it.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupableProperty {
    object_type: String,
    property_api_name: String,
    property_type: PropertyType,
    multiplicity: bool,
}

impl GroupableProperty {
    pub fn property_api_name(&self) -> &str {
        &self.property_api_name
    }

    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    pub fn is_array(&self) -> bool {
        self.multiplicity
    }

    fn bucket(&self, kind: BucketKind) -> InternalBucketing {
        InternalBucketing::new(&self.object_type, &self.property_api_name, kind)
    }

    pub fn exact(&self) -> InternalBucketing {
        self.bucket(BucketKind::Exact {
            max_group_count: None,
        })
    }

    pub fn exact_with_limit(&self, max_group_count: u32) -> InternalBucketing {
        self.bucket(BucketKind::Exact {
            max_group_count: Some(max_group_count),
        })
    }

    pub fn fixed_width(&self, width: f64) -> InternalBucketing {
        self.bucket(BucketKind::FixedWidth { fixed_width: width })
    }

    pub fn ranges(&self, ranges: impl IntoIterator<Item = AggregationRange>) -> InternalBucketing {
        self.bucket(BucketKind::Ranges {
            ranges: ranges.into_iter().collect(),
        })
    }

    pub fn by_duration(&self, value: u32, unit: DurationUnit) -> InternalBucketing {
        self.bucket(BucketKind::Duration { value, unit })
    }

    pub fn by_years(&self, value: u32) -> InternalBucketing {
        self.by_duration(value, DurationUnit::Years)
    }

    pub fn by_quarters(&self, value: u32) -> InternalBucketing {
        self.by_duration(value, DurationUnit::Quarters)
    }

    pub fn by_months(&self, value: u32) -> InternalBucketing {
        self.by_duration(value, DurationUnit::Months)
    }

    pub fn by_weeks(&self, value: u32) -> InternalBucketing {
        self.by_duration(value, DurationUnit::Weeks)
    }

    pub fn by_days(&self, value: u32) -> InternalBucketing {
        self.by_duration(value, DurationUnit::Days)
    }

    pub fn by_hours(&self, value: u32) -> InternalBucketing {
        self.by_duration(value, DurationUnit::Hours)
    }

    pub fn by_minutes(&self, value: u32) -> InternalBucketing {
        self.by_duration(value, DurationUnit::Minutes)
    }

    pub fn by_seconds(&self, value: u32) -> InternalBucketing {
        self.by_duration(value, DurationUnit::Seconds)
    }

    /// Checks that `kind` is a well-formed bucketing for this property.
    pub(crate) fn check(&self, kind: &BucketKind) -> Result<(), String> {
        let t = self.property_type;
        let is_temporal = matches!(t, PropertyType::Datetime | PropertyType::Timestamp);
        let allowed = match kind {
            BucketKind::Exact { .. } => true,
            BucketKind::FixedWidth { .. } => !self.multiplicity && t.is_numeric(),
            BucketKind::Ranges { .. } => !self.multiplicity && (t.is_numeric() || is_temporal),
            BucketKind::Duration { .. } => !self.multiplicity && is_temporal,
        };
        if !allowed {
            let type_label = format!("{:?}", t).to_lowercase();
            return Err(format!(
                "{} bucketing is not supported for {}{} properties",
                kind.name(),
                if self.multiplicity { "array " } else { "" },
                type_label,
            ));
        }

        match kind {
            BucketKind::Exact {
                max_group_count: Some(0),
            } => Err("maxGroupCount must be positive".to_string()),
            BucketKind::Exact { .. } => Ok(()),
            BucketKind::FixedWidth { fixed_width } => {
                if fixed_width.is_finite() && *fixed_width > 0.0 {
                    Ok(())
                } else {
                    Err(format!("fixed width must be a positive number, got {}", fixed_width))
                }
            }
            BucketKind::Ranges { ranges } => {
                if ranges.is_empty() {
                    return Err("at least one range is required".to_string());
                }
                for range in ranges {
                    if range.start_value.is_none() && range.end_value.is_none() {
                        return Err("every range needs a start or an end value".to_string());
                    }
                    if let Some(bound) = range.bounds().find(|b| !self.accepts_bound(b)) {
                        return Err(format!(
                            "range bound {} does not match the property type",
                            bound
                        ));
                    }
                }
                Ok(())
            }
            BucketKind::Duration { value, unit } => {
                if *value == 0 {
                    Err("duration value must be positive".to_string())
                } else if t == PropertyType::Datetime && !unit.applies_to_dates() {
                    Err(format!("{:?} is finer than a day", unit))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn accepts_bound(&self, bound: &Value) -> bool {
        match self.property_type {
            PropertyType::Datetime => bound
                .as_str()
                .map_or(false, |s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
            PropertyType::Timestamp => bound
                .as_str()
                .map_or(false, |s| DateTime::parse_from_rfc3339(s).is_ok()),
            _ => bound.is_number(),
        }
    }
}

/// Name-keyed capability map for one object type.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyMap<P> {
    object_type: String,
    capability: &'static str,
    properties: BTreeMap<String, P>,
    declared: BTreeSet<String>,
}

impl<P: Clone> PropertyMap<P> {
    fn new(object_type: &str, capability: &'static str, declared: &BTreeSet<String>) -> Self {
        Self {
            object_type: object_type.to_string(),
            capability,
            properties: BTreeMap::new(),
            declared: declared.clone(),
        }
    }

    /// Selects a property, failing if it is undeclared or lacks this capability.
    pub fn get(&self, name: &str) -> Result<P, QueryBuildError> {
        self.lookup(name).cloned().ok_or_else(|| {
            if self.declared.contains(name) {
                QueryBuildError::PropertyNotSelectable {
                    object_type: self.object_type.clone(),
                    property: name.to_string(),
                    capability: self.capability,
                }
            } else {
                QueryBuildError::UnknownProperty {
                    object_type: self.object_type.clone(),
                    property: name.to_string(),
                }
            }
        })
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&P> {
        self.properties.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }
}

pub type AggregatableProperties = PropertyMap<AggregatableProperty>;
pub type GroupableProperties = PropertyMap<GroupableProperty>;
pub type MultipleAggregatableProperties = PropertyMap<MultipleAggregatableProperty>;

/// The three capability maps of one object type.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyCapabilities {
    pub aggregatable: AggregatableProperties,
    pub groupable: GroupableProperties,
    pub multiple_aggregatable: MultipleAggregatableProperties,
}

impl PropertyCapabilities {
    pub fn from_metadata(
        ontology: &OntologyDefinition,
        object_type: &str,
    ) -> Result<Self, QueryBuildError> {
        let definition = ontology.object_type(object_type)?;
        let declared: BTreeSet<String> = definition.properties.keys().cloned().collect();

        let mut aggregatable = PropertyMap::new(object_type, "aggregation", &declared);
        let mut groupable = PropertyMap::new(object_type, "grouping", &declared);
        let mut multiple_aggregatable =
            PropertyMap::new(object_type, "multiple aggregation", &declared);

        for (name, property) in &definition.properties {
            let property_type = property.property_type;

            if is_groupable(property_type) {
                groupable.properties.insert(
                    name.clone(),
                    GroupableProperty {
                        object_type: object_type.to_string(),
                        property_api_name: name.clone(),
                        property_type,
                        multiplicity: property.multiplicity,
                    },
                );
            }

            // Array-valued properties only take part in exact grouping.
            if property.multiplicity {
                continue;
            }
            if let Some(metric_value_type) = metric_value_type(property_type) {
                let aggregatable_property = AggregatableProperty {
                    object_type: object_type.to_string(),
                    property_api_name: name.clone(),
                    property_type,
                    metric_value_type,
                };
                multiple_aggregatable.properties.insert(
                    name.clone(),
                    MultipleAggregatableProperty(aggregatable_property.clone()),
                );
                aggregatable.properties.insert(name.clone(), aggregatable_property);
            }
        }

        Ok(Self {
            aggregatable,
            groupable,
            multiple_aggregatable,
        })
    }
}

fn metric_value_type(property_type: PropertyType) -> Option<MetricValueType> {
    match property_type {
        t if t.is_numeric() => Some(MetricValueType::Numeric),
        PropertyType::Datetime => Some(MetricValueType::Date),
        PropertyType::Timestamp => Some(MetricValueType::Timestamp),
        PropertyType::String | PropertyType::Boolean => Some(MetricValueType::Numeric),
        _ => None,
    }
}

fn is_groupable(property_type: PropertyType) -> bool {
    property_type.is_numeric()
        || matches!(
            property_type,
            PropertyType::String
                | PropertyType::Boolean
                | PropertyType::Datetime
                | PropertyType::Timestamp
        )
}
