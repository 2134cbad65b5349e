use std::collections::BTreeMap;
use std::sync::Arc;

use super::clause::{
    AggregationClause, AggregationOperation, AggregationType, FieldOperation, InternalBucketing,
};
use super::compute::ComputeStep;
use super::properties::{
    AggregatableProperties, AggregatableProperty, GroupableProperties,
    MultipleAggregatableProperties, PropertyCapabilities,
};
use crate::client::ClientContext;
use crate::error::QueryBuildError;
use crate::object_set::ObjectSetDefinition;

/// Fluent aggregation builder over one object set.
///
/// Every method leaves `self` untouched. `group_by` hands back a new builder
/// with the clause appended, so a partially grouped builder can be branched
/// into several aggregations; the other methods produce a [`ComputeStep`].
/// Nothing here performs I/O.
#[derive(Debug, Clone)]
pub struct AggregationStep {
    context: ClientContext,
    object_type: String,
    definition: ObjectSetDefinition,
    group_by: Vec<InternalBucketing>,
    capabilities: Arc<PropertyCapabilities>,
}

impl AggregationStep {
    pub(crate) fn new(
        context: ClientContext,
        object_type: &str,
        definition: ObjectSetDefinition,
    ) -> Result<Self, QueryBuildError> {
        let capabilities = PropertyCapabilities::from_metadata(context.ontology(), object_type)?;
        Ok(Self {
            context,
            object_type: object_type.to_string(),
            definition,
            group_by: Vec::new(),
            capabilities: Arc::new(capabilities),
        })
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn capabilities(&self) -> &PropertyCapabilities {
        &self.capabilities
    }

    pub fn group_by_clauses(&self) -> &[InternalBucketing] {
        &self.group_by
    }

    /// Adds a grouping clause chosen from the groupable properties.
    ///
    /// ```rust,ignore
    /// let by_department = employees
    ///     .aggregation()?
    ///     .group_by(|p| Ok(p.get("department")?.exact()))?;
    /// ```
    pub fn group_by<F>(&self, selector: F) -> Result<AggregationStep, QueryBuildError>
    where
        F: FnOnce(&GroupableProperties) -> Result<InternalBucketing, QueryBuildError>,
    {
        let clause = selector(&self.capabilities.groupable)?;
        self.assert_bucketing_internal(&clause)?;

        let mut group_by = Vec::with_capacity(self.group_by.len() + 1);
        group_by.extend(self.group_by.iter().cloned());
        group_by.push(clause);

        Ok(AggregationStep {
            context: self.context.clone(),
            object_type: self.object_type.clone(),
            definition: self.definition.clone(),
            group_by,
            capabilities: Arc::clone(&self.capabilities),
        })
    }

    pub fn count(&self) -> ComputeStep {
        self.compute_step(vec![AggregationClause::count("count", true)])
    }

    pub fn min<F>(&self, selector: F) -> Result<ComputeStep, QueryBuildError>
    where
        F: FnOnce(&AggregatableProperties) -> Result<AggregatableProperty, QueryBuildError>,
    {
        self.single_metric(FieldOperation::Min, "min", selector)
    }

    pub fn max<F>(&self, selector: F) -> Result<ComputeStep, QueryBuildError>
    where
        F: FnOnce(&AggregatableProperties) -> Result<AggregatableProperty, QueryBuildError>,
    {
        self.single_metric(FieldOperation::Max, "max", selector)
    }

    pub fn avg<F>(&self, selector: F) -> Result<ComputeStep, QueryBuildError>
    where
        F: FnOnce(&AggregatableProperties) -> Result<AggregatableProperty, QueryBuildError>,
    {
        self.single_metric(FieldOperation::Avg, "avg", selector)
    }

    pub fn sum<F>(&self, selector: F) -> Result<ComputeStep, QueryBuildError>
    where
        F: FnOnce(&AggregatableProperties) -> Result<AggregatableProperty, QueryBuildError>,
    {
        self.single_metric(FieldOperation::Sum, "sum", selector)
    }

    pub fn approximate_distinct<F>(&self, selector: F) -> Result<ComputeStep, QueryBuildError>
    where
        F: FnOnce(&AggregatableProperties) -> Result<AggregatableProperty, QueryBuildError>,
    {
        self.single_metric(FieldOperation::ApproximateDistinct, "distinctCount", selector)
    }

    /// Computes several named metrics in one request.
    ///
    /// The callback returns the batch keyed by caller-chosen names; each name
    /// becomes the clause name and the key of the metric in the result.
    /// Clauses are sent in name order, not in the order the batch was built.
    pub fn aggregate<F>(&self, aggregate_builder: F) -> Result<ComputeStep, QueryBuildError>
    where
        F: FnOnce(
            &MultipleAggregatableProperties,
        ) -> Result<BTreeMap<String, AggregationOperation>, QueryBuildError>,
    {
        let aggregations = aggregate_builder(&self.capabilities.multiple_aggregatable)?;
        if aggregations.is_empty() {
            return Err(QueryBuildError::EmptyAggregation);
        }

        let clauses = aggregations
            .into_iter()
            .map(|(name, aggregation)| match aggregation {
                AggregationOperation::Count => Ok(AggregationClause::count(name, false)),
                AggregationOperation::Field {
                    property_api_name,
                    operation,
                } => {
                    let selected = self
                        .capabilities
                        .multiple_aggregatable
                        .get(&property_api_name)?;
                    let property = selected.as_aggregatable();
                    self.ensure_supported(property, operation)?;
                    Ok(AggregationClause::on_field(
                        operation.into(),
                        name,
                        property_api_name,
                        property.metric_value_type_for(operation),
                        false,
                    ))
                }
            })
            .collect::<Result<Vec<_>, QueryBuildError>>()?;

        Ok(self.compute_step(clauses))
    }

    fn single_metric<F>(
        &self,
        operation: FieldOperation,
        name: &str,
        selector: F,
    ) -> Result<ComputeStep, QueryBuildError>
    where
        F: FnOnce(&AggregatableProperties) -> Result<AggregatableProperty, QueryBuildError>,
    {
        let selected = selector(&self.capabilities.aggregatable)?;
        if self.capabilities.aggregatable.lookup(selected.property_api_name()) != Some(&selected) {
            return Err(QueryBuildError::ForeignProperty {
                expected: self.object_type.clone(),
                found: format!("{}.{}", selected.object_type(), selected.property_api_name()),
            });
        }
        self.ensure_supported(&selected, operation)?;

        Ok(self.compute_step(vec![AggregationClause::on_field(
            operation.into(),
            name,
            selected.property_api_name(),
            selected.metric_value_type_for(operation),
            true,
        )]))
    }

    fn ensure_supported(
        &self,
        property: &AggregatableProperty,
        operation: FieldOperation,
    ) -> Result<(), QueryBuildError> {
        if property.supports(operation) {
            Ok(())
        } else {
            Err(QueryBuildError::UnsupportedOperation {
                object_type: self.object_type.clone(),
                property: property.property_api_name().to_string(),
                operation: AggregationType::from(operation).to_string(),
            })
        }
    }

    fn assert_bucketing_internal(
        &self,
        bucketing: &InternalBucketing,
    ) -> Result<(), QueryBuildError> {
        if bucketing.object_type() != self.object_type {
            return Err(QueryBuildError::ForeignBucketing {
                expected: self.object_type.clone(),
                found: format!("{}.{}", bucketing.object_type(), bucketing.field),
            });
        }
        let property = self.capabilities.groupable.get(&bucketing.field)?;
        property
            .check(&bucketing.kind)
            .map_err(|reason| QueryBuildError::InvalidBucketing {
                property: bucketing.field.clone(),
                reason,
            })
    }

    fn compute_step(&self, aggregation: Vec<AggregationClause>) -> ComputeStep {
        ComputeStep::new(
            self.context.clone(),
            self.object_type.clone(),
            self.definition.clone(),
            self.group_by.clone(),
            aggregation,
        )
    }
}
