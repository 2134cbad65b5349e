//! Time-series properties of a single object.

use async_stream::stream;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::aggregations::DurationUnit;
use crate::client::ClientContext;
use crate::error::{QueryBuildError, TimeSeriesError};

/// Identifies one time-series property of one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeriesLocator {
    pub object_type: String,
    pub primary_key: String,
    pub property: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeSeriesValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub time: DateTime<Utc>,
    pub value: TimeSeriesValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelativeDirection {
    Before,
    After,
}

/// Offset from the time the service evaluates the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelativeTime {
    pub when: RelativeDirection,
    pub value: u32,
    pub unit: DurationUnit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TimeRange {
    #[serde(rename_all = "camelCase")]
    Absolute {
        #[serde(skip_serializing_if = "Option::is_none")]
        start_time: Option<DateTime<Utc>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        end_time: Option<DateTime<Utc>>,
    },
    #[serde(rename_all = "camelCase")]
    Relative {
        #[serde(skip_serializing_if = "Option::is_none")]
        start_time: Option<RelativeTime>,
        #[serde(skip_serializing_if = "Option::is_none")]
        end_time: Option<RelativeTime>,
    },
}

impl TimeRange {
    fn ago(value: u32, unit: DurationUnit) -> Self {
        TimeRange::Relative {
            start_time: Some(RelativeTime {
                when: RelativeDirection::Before,
                value,
                unit,
            }),
            end_time: None,
        }
    }
}

/// Body of the `streamPoints` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamPointsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<TimeRange>,
}

/// Handle on a time-series property, optionally narrowed to a range.
///
/// Range methods return a new handle; the original keeps its range.
#[derive(Debug, Clone)]
pub struct TimeSeriesProperty {
    context: ClientContext,
    locator: TimeSeriesLocator,
    range: Option<TimeRange>,
}

impl TimeSeriesProperty {
    pub(crate) fn new(
        context: ClientContext,
        object_type: &str,
        primary_key: String,
        property: &str,
    ) -> Result<Self, QueryBuildError> {
        let definition = context.ontology().object_type(object_type)?.property(property)?;
        if !definition.property_type.is_time_series() {
            return Err(QueryBuildError::NotTimeSeries {
                object_type: object_type.to_string(),
                property: property.to_string(),
            });
        }

        Ok(Self {
            context,
            locator: TimeSeriesLocator {
                object_type: object_type.to_string(),
                primary_key,
                property: property.to_string(),
            },
            range: None,
        })
    }

    pub fn locator(&self) -> &TimeSeriesLocator {
        &self.locator
    }

    pub fn range(&self) -> Option<&TimeRange> {
        self.range.as_ref()
    }

    fn with_range(&self, range: TimeRange) -> Self {
        Self {
            range: Some(range),
            ..self.clone()
        }
    }

    pub fn from_days_ago(&self, days: u32) -> Self {
        self.with_range(TimeRange::ago(days, DurationUnit::Days))
    }

    pub fn from_hours_ago(&self, hours: u32) -> Self {
        self.with_range(TimeRange::ago(hours, DurationUnit::Hours))
    }

    pub fn from_minutes_ago(&self, minutes: u32) -> Self {
        self.with_range(TimeRange::ago(minutes, DurationUnit::Minutes))
    }

    /// Restricts to `[start, end]`; either side may be left open.
    pub fn between(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.with_range(TimeRange::Absolute {
            start_time: start,
            end_time: end,
        })
    }

    pub async fn first_point(&self) -> Result<TimeSeriesPoint, TimeSeriesError> {
        debug!(
            object_type = %self.locator.object_type,
            property = %self.locator.property,
            "fetching first point"
        );
        Ok(self.context.transport().first_point(self.locator.clone()).await?)
    }

    pub async fn last_point(&self) -> Result<TimeSeriesPoint, TimeSeriesError> {
        debug!(
            object_type = %self.locator.object_type,
            property = %self.locator.property,
            "fetching last point"
        );
        Ok(self.context.transport().last_point(self.locator.clone()).await?)
    }

    /// Collects every point in the range. The first error aborts the call.
    pub async fn all(&self) -> Result<Vec<TimeSeriesPoint>, TimeSeriesError> {
        self.iterate().try_collect().await
    }

    /// Lazily streams the points in the range.
    ///
    /// Nothing is requested until the stream is first polled. The stream ends
    /// after the first error.
    pub fn iterate(&self) -> BoxStream<'static, Result<TimeSeriesPoint, TimeSeriesError>> {
        let transport = Arc::clone(self.context.transport());
        let locator = self.locator.clone();
        let request = StreamPointsRequest {
            range: self.range.clone(),
        };

        Box::pin(stream! {
            debug!(
                object_type = %locator.object_type,
                property = %locator.property,
                "streaming points"
            );
            match transport.stream_points(locator, request).await {
                Ok(mut points) => {
                    while let Some(point) = points.next().await {
                        let failed = point.is_err();
                        yield point.map_err(TimeSeriesError::from);
                        if failed {
                            break;
                        }
                    }
                }
                Err(err) => {
                    yield Err(TimeSeriesError::from(err));
                }
            }
        })
    }
}
