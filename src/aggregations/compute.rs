use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::clause::{AggregationClause, InternalBucketing};
use super::result::AggregationResult;
use crate::client::ClientContext;
use crate::error::{AggregateObjectsError, ServiceErrorKind};
use crate::object_set::ObjectSetDefinition;

/// Request handed to
/// [`OntologyTransport::aggregate`](crate::transport::OntologyTransport::aggregate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateObjectsRequest {
    pub object_set: ObjectSetDefinition,
    pub aggregation: Vec<AggregationClause>,
    pub group_by: Vec<InternalBucketing>,
}

/// Runs one aggregation request and decodes the answer.
pub async fn aggregate(
    context: &ClientContext,
    request: AggregateObjectsRequest,
) -> Result<AggregationResult, AggregateObjectsError> {
    let grouped = !request.group_by.is_empty();
    let clauses = request.aggregation.clone();

    let response = context
        .transport()
        .aggregate(request)
        .await
        .map_err(AggregateObjectsError::from)?;

    AggregationResult::decode(&clauses, grouped, response)
}

/// Terminal step of the aggregation builder.
///
/// Holds a frozen request; nothing is sent until [`compute`](Self::compute)
/// is awaited, and every call sends it again.
#[derive(Debug, Clone)]
pub struct ComputeStep {
    context: ClientContext,
    object_type: String,
    definition: ObjectSetDefinition,
    group_by: Vec<InternalBucketing>,
    aggregation: Vec<AggregationClause>,
}

impl ComputeStep {
    pub(crate) fn new(
        context: ClientContext,
        object_type: String,
        definition: ObjectSetDefinition,
        group_by: Vec<InternalBucketing>,
        aggregation: Vec<AggregationClause>,
    ) -> Self {
        Self {
            context,
            object_type,
            definition,
            group_by,
            aggregation,
        }
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn object_set(&self) -> &ObjectSetDefinition {
        &self.definition
    }

    pub fn group_by_clauses(&self) -> &[InternalBucketing] {
        &self.group_by
    }

    pub fn aggregation_clauses(&self) -> &[AggregationClause] {
        &self.aggregation
    }

    pub fn request(&self) -> AggregateObjectsRequest {
        AggregateObjectsRequest {
            object_set: self.definition.clone(),
            aggregation: self.aggregation.clone(),
            group_by: self.group_by.clone(),
        }
    }

    /// Compute the specified aggregation(s).
    pub async fn compute(&self) -> Result<AggregationResult, AggregateObjectsError> {
        debug!(
            object_type = %self.object_type,
            group_by = self.group_by.len(),
            aggregations = self.aggregation.len(),
            "computing aggregation"
        );

        match aggregate(&self.context, self.request()).await {
            Ok(result) => {
                debug!(
                    object_type = %self.object_type,
                    buckets = result.buckets().map_or(1, <[_]>::len),
                    "aggregation computed"
                );
                Ok(result)
            }
            Err(err) => {
                warn!(
                    object_type = %self.object_type,
                    kind = err.kind.name(),
                    "aggregation failed: {}",
                    err.message
                );
                Err(err)
            }
        }
    }
}
