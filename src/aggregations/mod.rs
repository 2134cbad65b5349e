//! Aggregation compute pipeline.
//!
//! An [`AggregationStep`] collects group-by clauses for an object set, a
//! terminal call turns it into a [`ComputeStep`], and `compute()` sends the
//! single request. Property selection goes through the capability maps in
//! [`properties`], so a property that cannot take part in an operation is
//! rejected while the query is built rather than by the service.

pub mod builder;
pub mod clause;
pub mod compute;
pub mod properties;
pub mod result;

pub use builder::AggregationStep;
pub use clause::{
    AggregationClause, AggregationOperation, AggregationRange, AggregationType, BucketKind,
    DurationUnit, FieldOperation, InternalBucketing, MetricValueType,
};
pub use compute::{aggregate, AggregateObjectsRequest, ComputeStep};
pub use properties::{
    AggregatableProperties, AggregatableProperty, GroupableProperties, GroupableProperty,
    MultipleAggregatableProperties, MultipleAggregatableProperty, PropertyCapabilities, PropertyMap,
};
pub use result::{
    AggregateObjectsResponse, AggregateObjectsResponseItem, AggregationBucket, AggregationData,
    AggregationMetric, AggregationResult, MetricValue, Metrics,
};
