//! Service transport.
//!
//! Everything the SDK sends goes through [`OntologyTransport`], so tests can
//! swap in a double and the HTTP client stays out of the query builders.

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, trace};

use crate::aggregations::{
    AggregateObjectsRequest, AggregateObjectsResponse, AggregationType, InternalBucketing,
};
use crate::config::ServiceSettings;
use crate::error::{ApiError, WireError};
use crate::object_set::ObjectSetDefinition;
use crate::timeseries::{StreamPointsRequest, TimeSeriesLocator, TimeSeriesPoint};

pub type PointStream = BoxStream<'static, Result<TimeSeriesPoint, ApiError>>;

#[async_trait]
pub trait OntologyTransport: Send + Sync {
    async fn aggregate(
        &self,
        request: AggregateObjectsRequest,
    ) -> Result<AggregateObjectsResponse, ApiError>;

    async fn first_point(&self, locator: TimeSeriesLocator) -> Result<TimeSeriesPoint, ApiError>;

    async fn last_point(&self, locator: TimeSeriesLocator) -> Result<TimeSeriesPoint, ApiError>;

    /// Points are yielded as they are decoded from the response body.
    async fn stream_points(
        &self,
        locator: TimeSeriesLocator,
        request: StreamPointsRequest,
    ) -> Result<PointStream, ApiError>;
}

/// `reqwest` implementation of [`OntologyTransport`] against the v2 REST API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    ontology: String,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(settings: &ServiceSettings, ontology: &str) -> Result<Self, ApiError> {
        let base_url = Url::parse(&settings.url)
            .map_err(|e| ApiError::Url(format!("{}: {}", settings.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Url(settings.url.clone()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base_url,
            ontology: ontology.to_string(),
            token: settings.token.clone(),
        })
    }

    /// Builds `{base}/api/v2/ontologies/{ontology}/{segments...}`.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::Url(self.base_url.to_string()))?;
            path.pop_if_empty()
                .extend(["api", "v2", "ontologies", self.ontology.as_str()])
                .extend(segments);
        }
        Ok(url)
    }

    fn timeseries_endpoint(
        &self,
        locator: &TimeSeriesLocator,
        action: &str,
    ) -> Result<Url, ApiError> {
        self.endpoint(&[
            "objects",
            &locator.object_type,
            &locator.primary_key,
            "timeseries",
            &locator.property,
            action,
        ])
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        trace!(%method, %url, "ontology request");
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends the request and hands back a 2xx response with its body unread.
    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), "ontology response");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await?;
        let error = serde_json::from_slice::<WireError>(&body).unwrap_or_else(|_| WireError {
            error_code: status.canonical_reason().unwrap_or("UNKNOWN").to_string(),
            ..WireError::default()
        });
        Err(ApiError::Service {
            status: status.as_u16(),
            error,
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let body = self.send(request).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl OntologyTransport for HttpTransport {
    async fn aggregate(
        &self,
        request: AggregateObjectsRequest,
    ) -> Result<AggregateObjectsResponse, ApiError> {
        let url = self.endpoint(&["objectSets", "aggregate"])?;
        let body = WireAggregateRequest::from(&request);
        self.json(self.request(Method::POST, url).json(&body)).await
    }

    async fn first_point(&self, locator: TimeSeriesLocator) -> Result<TimeSeriesPoint, ApiError> {
        let url = self.timeseries_endpoint(&locator, "firstPoint")?;
        self.json(self.request(Method::GET, url)).await
    }

    async fn last_point(&self, locator: TimeSeriesLocator) -> Result<TimeSeriesPoint, ApiError> {
        let url = self.timeseries_endpoint(&locator, "lastPoint")?;
        self.json(self.request(Method::GET, url)).await
    }

    async fn stream_points(
        &self,
        locator: TimeSeriesLocator,
        request: StreamPointsRequest,
    ) -> Result<PointStream, ApiError> {
        let url = self.timeseries_endpoint(&locator, "streamPoints")?;
        let response = self.send(self.request(Method::POST, url).json(&request)).await?;
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ApiError::from));
        Ok(decode_points(chunks))
    }
}

/// Aggregate request as the service expects it. Client-only clause fields
/// are dropped.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireAggregateRequest<'a> {
    object_set: &'a ObjectSetDefinition,
    aggregation: Vec<WireAggregation<'a>>,
    group_by: &'a [InternalBucketing],
}

#[derive(Debug, Serialize)]
struct WireAggregation<'a> {
    #[serde(rename = "type")]
    aggregation_type: AggregationType,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'a str>,
}

impl<'a> From<&'a AggregateObjectsRequest> for WireAggregateRequest<'a> {
    fn from(request: &'a AggregateObjectsRequest) -> Self {
        Self {
            object_set: &request.object_set,
            aggregation: request
                .aggregation
                .iter()
                .map(|clause| WireAggregation {
                    aggregation_type: clause.aggregation_type,
                    name: &clause.name,
                    field: clause.field.as_deref(),
                })
                .collect(),
            group_by: &request.group_by,
        }
    }
}

/// Turns body chunks into points. Ends after the first error.
fn decode_points<S>(chunks: S) -> PointStream
where
    S: futures::Stream<Item = Result<Vec<u8>, ApiError>> + Send + 'static,
{
    Box::pin(stream! {
        let mut chunks = Box::pin(chunks);
        let mut decoder = PointDecoder::default();
        let mut failed = false;

        while !failed {
            let points = match chunks.next().await {
                Some(Ok(chunk)) => decoder.push(&chunk),
                Some(Err(err)) => vec![Err(err)],
                None => break,
            };
            for point in points {
                failed = point.is_err();
                yield point;
                if failed {
                    break;
                }
            }
        }

        if !failed {
            for point in decoder.finish() {
                yield point;
            }
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// `[{...}, {...}]`
    Array,
    /// One object per line.
    Lines,
}

/// Incremental decoder for `streamPoints` bodies.
///
/// Complete points are returned as soon as their closing byte arrives; a
/// partial point stays buffered until the next chunk.
#[derive(Debug, Default)]
struct PointDecoder {
    buffer: Vec<u8>,
    framing: Option<Framing>,
    closed: bool,
    failed: bool,
}

impl PointDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<Result<TimeSeriesPoint, ApiError>> {
        self.buffer.extend_from_slice(chunk);
        self.drain(false)
    }

    fn finish(&mut self) -> Vec<Result<TimeSeriesPoint, ApiError>> {
        let mut points = self.drain(true);
        if !self.failed && !self.closed && self.framing == Some(Framing::Array) {
            self.failed = true;
            points.push(Err(ApiError::Truncated(
                "point array is missing its closing `]`".to_string(),
            )));
        }
        points
    }

    fn drain(&mut self, at_end: bool) -> Vec<Result<TimeSeriesPoint, ApiError>> {
        let mut points = Vec::new();
        let mut pos = 0;

        while !self.failed && !self.closed {
            let framing = self.framing;
            pos += self.buffer[pos..]
                .iter()
                .take_while(|b| b.is_ascii_whitespace() || (*b == &b',' && framing.is_some()))
                .count();
            let Some(&next) = self.buffer.get(pos) else {
                break;
            };

            match framing {
                None => {
                    if next == b'[' {
                        self.framing = Some(Framing::Array);
                        pos += 1;
                    } else {
                        self.framing = Some(Framing::Lines);
                    }
                    continue;
                }
                Some(Framing::Array) if next == b']' => {
                    self.closed = true;
                    pos += 1;
                    break;
                }
                Some(_) => {}
            }

            if next != b'{' {
                // Not a point; let serde_json describe what it found.
                let mut values = serde_json::Deserializer::from_slice(&self.buffer[pos..])
                    .into_iter::<TimeSeriesPoint>();
                match values.next() {
                    Some(Err(e)) if e.is_eof() && !at_end => break,
                    Some(Err(e)) => {
                        self.failed = true;
                        points.push(Err(ApiError::Decode(e)));
                    }
                    Some(Ok(point)) => {
                        pos += values.byte_offset();
                        points.push(Ok(point));
                    }
                    None => break,
                }
                continue;
            }

            match object_len(&self.buffer[pos..]) {
                Some(len) => {
                    let object = &self.buffer[pos..pos + len];
                    let point = serde_json::from_slice::<TimeSeriesPoint>(object);
                    self.failed = point.is_err();
                    points.push(point.map_err(ApiError::Decode));
                    pos += len;
                }
                None if at_end => {
                    // Always an end-of-input error here.
                    let point = serde_json::from_slice::<TimeSeriesPoint>(&self.buffer[pos..]);
                    self.failed = point.is_err();
                    points.push(point.map_err(ApiError::Decode));
                    break;
                }
                None => break,
            }
        }

        if self.failed || self.closed {
            self.buffer.clear();
        } else {
            self.buffer.drain(..pos);
        }
        points
    }
}

/// Length of the JSON object at the start of `bytes`, once its closing brace
/// has arrived.
fn object_len(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
