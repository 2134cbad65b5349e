//! Ontology SDK: typed object-set aggregations and time series
//!
//! Queries are built against generated ontology metadata, so a property that
//! cannot be grouped or aggregated the way it is asked for is rejected before
//! anything is sent.
//!
//! # Example
//!
//! ```rust,no_run
//! use ontology_sdk::{ClientSettings, OntologyClient, OntologyDefinition};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = ClientSettings::new()?;
//!     let ontology = OntologyDefinition::from_path("ontology.json")?;
//!     let client = OntologyClient::from_settings(&settings, ontology)?;
//!
//!     // Headcount per department
//!     let result = client
//!         .objects("Employee")?
//!         .group_by(|p| Ok(p.get("department")?.exact()))?
//!         .count()
//!         .compute()
//!         .await?;
//!
//!     for bucket in result.buckets().unwrap_or_default() {
//!         println!("{:?}: {:?}", bucket.group, bucket.metrics);
//!     }
//!
//!     // Highest salary
//!     let max = client.objects("Employee")?.max(|p| p.get("salary"))?.compute().await?;
//!     println!("max salary: {:?}", max.metrics());
//!
//!     // Last heart rate reading
//!     let point = client.time_series("Employee", 7, "heartRate")?.last_point().await?;
//!     println!("{} {:?}", point.time, point.value);
//!
//!     Ok(())
//! }
//! ```

pub mod aggregations;
pub mod client;
pub mod config;
pub mod error;
pub mod metadata;
pub mod object_set;
pub mod timeseries;
pub mod transport;

#[cfg(test)]
mod tests;

pub use aggregations::{
    AggregationBucket, AggregationData, AggregationOperation, AggregationRange, AggregationResult,
    AggregationStep, ComputeStep, DurationUnit, MetricValue, MetricValueType, Metrics,
};
pub use client::{ClientContext, OntologyClient};
pub use config::ClientSettings;
pub use error::{
    AggregateObjectsError, AggregateObjectsErrorKind, ApiError, QueryBuildError, ServiceError,
    TimeSeriesError, TimeSeriesErrorKind,
};
pub use metadata::{OntologyDefinition, PropertyType};
pub use object_set::{ObjectSet, ObjectSetDefinition};
pub use timeseries::{TimeRange, TimeSeriesPoint, TimeSeriesProperty, TimeSeriesValue};
pub use transport::{HttpTransport, OntologyTransport};
