//! Error types.
//!
//! Two families live here. [`QueryBuildError`] is raised synchronously while a
//! query is being assembled and always indicates a caller mistake against the
//! generated metadata. [`ServiceError`] is what asynchronous calls resolve to
//! when the transport or the remote service fails; its kind parameter narrows
//! the error names that a particular endpoint is known to report.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display, Formatter};

/// Errors raised while building an object set, aggregation or time-series query.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryBuildError {
    #[error("object type `{object_type}` is not defined in the ontology")]
    UnknownObjectType { object_type: String },

    #[error("property `{property}` is not defined on object type `{object_type}`")]
    UnknownProperty {
        object_type: String,
        property: String,
    },

    #[error("property `{property}` of `{object_type}` does not support {capability}")]
    PropertyNotSelectable {
        object_type: String,
        property: String,
        capability: &'static str,
    },

    #[error("link `{link}` is not defined on object type `{object_type}`")]
    UnknownLink { object_type: String, link: String },

    #[error("`{operation}` is not supported for property `{property}` of `{object_type}`")]
    UnsupportedOperation {
        object_type: String,
        property: String,
        operation: String,
    },

    #[error("invalid bucketing on `{property}`: {reason}")]
    InvalidBucketing { property: String, reason: String },

    #[error("bucketing on `{found}` does not belong to object type `{expected}`")]
    ForeignBucketing { expected: String, found: String },

    #[error("property `{found}` was not selected from object type `{expected}`")]
    ForeignProperty { expected: String, found: String },

    #[error("Unknown aggregation type: {tag}")]
    UnknownAggregationType { tag: String },

    #[error("malformed aggregation descriptor: {reason}")]
    MalformedAggregation { reason: String },

    #[error("an aggregation batch needs at least one named aggregation")]
    EmptyAggregation,

    #[error("object sets over `{left}` and `{right}` cannot be combined")]
    MismatchedObjectTypes { left: String, right: String },

    #[error("property `{property}` of `{object_type}` is not a time series")]
    NotTimeSeries {
        object_type: String,
        property: String,
    },
}

/// Error body returned by the service on non-2xx responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireError {
    pub error_code: String,
    pub error_name: String,
    pub error_instance_id: Option<String>,
    pub parameters: BTreeMap<String, Value>,
}

impl Display for WireError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.error_name.is_empty() {
            write!(f, "{}", self.error_code)
        } else {
            write!(f, "{} ({})", self.error_name, self.error_code)
        }
    }
}

/// Failure reported by an [`OntologyTransport`](crate::transport::OntologyTransport).
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("service responded with status {status}: {error}")]
    Service { status: u16, error: WireError },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid service url: {0}")]
    Url(String),

    #[error("response ended early: {0}")]
    Truncated(String),
}

/// Endpoint-specific classification of service errors.
pub trait ServiceErrorKind: Copy + Debug + PartialEq + Send + Sync + 'static {
    /// Maps a service `errorName` to a known kind.
    fn from_error_name(name: &str) -> Option<Self>;

    /// Fallback when the error name is not recognized.
    fn from_status(status: u16) -> Self;

    fn transport() -> Self;

    fn malformed_response() -> Self;

    fn name(self) -> &'static str;
}

/// Structured error produced by an asynchronous ontology call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}: {message}", .kind.name())]
pub struct ServiceError<K: ServiceErrorKind> {
    pub kind: K,
    pub message: String,
    pub error_instance_id: Option<String>,
    pub parameters: BTreeMap<String, Value>,
}

impl<K: ServiceErrorKind> ServiceError<K> {
    pub fn new(kind: K, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            error_instance_id: None,
            parameters: BTreeMap::new(),
        }
    }

    pub fn malformed_response(message: impl Into<String>) -> Self {
        Self::new(K::malformed_response(), message)
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }
}

impl<K: ServiceErrorKind> From<ApiError> for ServiceError<K> {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Service { status, error } => {
                let kind = K::from_error_name(&error.error_name)
                    .unwrap_or_else(|| K::from_status(status));
                Self {
                    kind,
                    message: error.to_string(),
                    error_instance_id: error.error_instance_id,
                    parameters: error.parameters,
                }
            }
            ApiError::Decode(e) => Self::new(K::malformed_response(), e.to_string()),
            ApiError::Truncated(reason) => Self::new(K::malformed_response(), reason),
            other => Self::new(K::transport(), other.to_string()),
        }
    }
}

pub type AggregateObjectsError = ServiceError<AggregateObjectsErrorKind>;
pub type TimeSeriesError = ServiceError<TimeSeriesErrorKind>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateObjectsErrorKind {
    AggregationGroupCountExceededLimit,
    InvalidAggregationRange,
    InvalidAggregationRangePropertyType,
    InvalidAggregationRangeValue,
    InvalidDurationGroupByPropertyType,
    InvalidDurationGroupByValue,
    InvalidPropertyType,
    ObjectTypeNotFound,
    ObjectTypeNotSynced,
    PropertiesNotFound,
    PropertiesNotAggregatable,
    OntologyNotFound,
    PermissionDenied,
    Unauthorized,
    MalformedResponse,
    Transport,
    Unknown,
}

impl ServiceErrorKind for AggregateObjectsErrorKind {
    fn from_error_name(name: &str) -> Option<Self> {
        use AggregateObjectsErrorKind::*;
        let kind = match name {
            "AggregationGroupCountExceededLimit" => AggregationGroupCountExceededLimit,
            "InvalidAggregationRange" => InvalidAggregationRange,
            "InvalidAggregationRangePropertyType" => InvalidAggregationRangePropertyType,
            "InvalidAggregationRangeValue" => InvalidAggregationRangeValue,
            "InvalidDurationGroupByPropertyType" => InvalidDurationGroupByPropertyType,
            "InvalidDurationGroupByValue" => InvalidDurationGroupByValue,
            "InvalidPropertyType" => InvalidPropertyType,
            "ObjectTypeNotFound" => ObjectTypeNotFound,
            "ObjectTypeNotSynced" => ObjectTypeNotSynced,
            "PropertiesNotFound" => PropertiesNotFound,
            "PropertiesNotAggregatable" => PropertiesNotAggregatable,
            "OntologyNotFound" => OntologyNotFound,
            "PermissionDenied" => PermissionDenied,
            _ => return None,
        };
        Some(kind)
    }

    fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::PermissionDenied,
            _ => Self::Unknown,
        }
    }

    fn transport() -> Self {
        Self::Transport
    }

    fn malformed_response() -> Self {
        Self::MalformedResponse
    }

    fn name(self) -> &'static str {
        use AggregateObjectsErrorKind::*;
        match self {
            AggregationGroupCountExceededLimit => "AggregationGroupCountExceededLimit",
            InvalidAggregationRange => "InvalidAggregationRange",
            InvalidAggregationRangePropertyType => "InvalidAggregationRangePropertyType",
            InvalidAggregationRangeValue => "InvalidAggregationRangeValue",
            InvalidDurationGroupByPropertyType => "InvalidDurationGroupByPropertyType",
            InvalidDurationGroupByValue => "InvalidDurationGroupByValue",
            InvalidPropertyType => "InvalidPropertyType",
            ObjectTypeNotFound => "ObjectTypeNotFound",
            ObjectTypeNotSynced => "ObjectTypeNotSynced",
            PropertiesNotFound => "PropertiesNotFound",
            PropertiesNotAggregatable => "PropertiesNotAggregatable",
            OntologyNotFound => "OntologyNotFound",
            PermissionDenied => "PermissionDenied",
            Unauthorized => "Unauthorized",
            MalformedResponse => "MalformedResponse",
            Transport => "Transport",
            Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeSeriesErrorKind {
    ObjectNotFound,
    ObjectTypeNotFound,
    PropertyNotFound,
    InvalidTimeSeriesRange,
    PermissionDenied,
    Unauthorized,
    MalformedResponse,
    Transport,
    Unknown,
}

impl ServiceErrorKind for TimeSeriesErrorKind {
    fn from_error_name(name: &str) -> Option<Self> {
        let kind = match name {
            "ObjectNotFound" => Self::ObjectNotFound,
            "ObjectTypeNotFound" => Self::ObjectTypeNotFound,
            "PropertiesNotFound" | "PropertyNotFound" => Self::PropertyNotFound,
            "InvalidTimeSeriesRange" | "InvalidRangeQuery" => Self::InvalidTimeSeriesRange,
            "PermissionDenied" => Self::PermissionDenied,
            _ => return None,
        };
        Some(kind)
    }

    fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::PermissionDenied,
            404 => Self::ObjectNotFound,
            _ => Self::Unknown,
        }
    }

    fn transport() -> Self {
        Self::Transport
    }

    fn malformed_response() -> Self {
        Self::MalformedResponse
    }

    fn name(self) -> &'static str {
        match self {
            Self::ObjectNotFound => "ObjectNotFound",
            Self::ObjectTypeNotFound => "ObjectTypeNotFound",
            Self::PropertyNotFound => "PropertyNotFound",
            Self::InvalidTimeSeriesRange => "InvalidTimeSeriesRange",
            Self::PermissionDenied => "PermissionDenied",
            Self::Unauthorized => "Unauthorized",
            Self::MalformedResponse => "MalformedResponse",
            Self::Transport => "Transport",
            Self::Unknown => "Unknown",
        }
    }
}
