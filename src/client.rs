use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use tracing::debug;

use crate::config::ClientSettings;
use crate::error::{ApiError, QueryBuildError};
use crate::metadata::OntologyDefinition;
use crate::object_set::{ObjectSet, ObjectSetDefinition};
use crate::timeseries::TimeSeriesProperty;
use crate::transport::{HttpTransport, OntologyTransport};

/// Shared state behind every handle: the ontology metadata and the transport.
#[derive(Clone)]
pub struct ClientContext {
    ontology: Arc<OntologyDefinition>,
    transport: Arc<dyn OntologyTransport>,
}

impl ClientContext {
    pub fn new(ontology: OntologyDefinition, transport: Arc<dyn OntologyTransport>) -> Self {
        Self {
            ontology: Arc::new(ontology),
            transport,
        }
    }

    pub fn ontology(&self) -> &OntologyDefinition {
        &self.ontology
    }

    pub fn transport(&self) -> &Arc<dyn OntologyTransport> {
        &self.transport
    }
}

impl Debug for ClientContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext")
            .field("ontology", &self.ontology.api_name())
            .finish_non_exhaustive()
    }
}

/// Entry point of the SDK.
#[derive(Debug, Clone)]
pub struct OntologyClient {
    context: ClientContext,
}

impl OntologyClient {
    pub fn new(context: ClientContext) -> Self {
        Self { context }
    }

    /// Creates a client talking HTTP to the service described by `settings`.
    pub fn from_settings(
        settings: &ClientSettings,
        ontology: OntologyDefinition,
    ) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(&settings.service, ontology.api_name())?;
        debug!(
            url = %settings.service.url,
            ontology = %ontology.api_name(),
            "created ontology client"
        );
        Ok(Self::new(ClientContext::new(ontology, Arc::new(transport))))
    }

    pub fn context(&self) -> &ClientContext {
        &self.context
    }

    pub fn ontology(&self) -> &OntologyDefinition {
        self.context.ontology()
    }

    /// All objects of `object_type`.
    pub fn objects(&self, object_type: &str) -> Result<ObjectSet, QueryBuildError> {
        ObjectSet::from_definition(
            self.context.clone(),
            object_type,
            ObjectSetDefinition::base(object_type),
        )
    }

    /// The time-series property `property` of the object with `primary_key`.
    pub fn time_series(
        &self,
        object_type: &str,
        primary_key: impl ToString,
        property: &str,
    ) -> Result<TimeSeriesProperty, QueryBuildError> {
        TimeSeriesProperty::new(
            self.context.clone(),
            object_type,
            primary_key.to_string(),
            property,
        )
    }
}
