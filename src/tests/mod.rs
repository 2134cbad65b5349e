//! Shared fixtures and end-to-end scenarios against a mocked transport.

use async_trait::async_trait;
use mockall::mock;
use serde_json::json;
use std::sync::Arc;

use crate::aggregations::{AggregateObjectsRequest, AggregateObjectsResponse};
use crate::client::{ClientContext, OntologyClient};
use crate::error::ApiError;
use crate::metadata::OntologyDefinition;
use crate::object_set::ObjectSet;
use crate::timeseries::{StreamPointsRequest, TimeSeriesLocator, TimeSeriesPoint};
use crate::transport::{OntologyTransport, PointStream};

mock! {
    pub Transport {}

    #[async_trait]
    impl OntologyTransport for Transport {
        async fn aggregate(
            &self,
            request: AggregateObjectsRequest,
        ) -> Result<AggregateObjectsResponse, ApiError>;
        async fn first_point(
            &self,
            locator: TimeSeriesLocator,
        ) -> Result<TimeSeriesPoint, ApiError>;
        async fn last_point(&self, locator: TimeSeriesLocator) -> Result<TimeSeriesPoint, ApiError>;
        async fn stream_points(
            &self,
            locator: TimeSeriesLocator,
            request: StreamPointsRequest,
        ) -> Result<PointStream, ApiError>;
    }
}

/// One object type carrying a property of every wire type.
pub(crate) fn all_property_types_ontology() -> OntologyDefinition {
    let mut properties = serde_json::Map::new();
    let scalars = [
        ("id", "integer"),
        ("string", "string"),
        ("boolean", "boolean"),
        ("date", "datetime"),
        ("dateTime", "timestamp"),
        ("decimal", "decimal"),
        ("integer", "integer"),
        ("long", "long"),
        ("short", "short"),
        ("float", "float"),
        ("double", "double"),
        ("byte", "byte"),
        ("attachment", "attachment"),
        ("attachment2", "attachment"),
        ("geoPoint", "geopoint"),
        ("geoShape", "geoshape"),
        ("numericTimeseries", "numericTimeseries"),
    ];
    for (name, property_type) in scalars {
        let property = json!({ "multiplicity": false, "type": property_type });
        properties.insert(name.to_string(), property);
    }
    let arrays = [
        ("stringArray", "string"),
        ("booleanArray", "boolean"),
        ("dateArray", "datetime"),
        ("dateTimeArray", "timestamp"),
        ("decimalArray", "decimal"),
        ("integerArray", "integer"),
        ("longArray", "long"),
        ("shortArray", "short"),
        ("floatArray", "float"),
        ("doubleArray", "double"),
        ("byteArray", "byte"),
        ("attachmentArray", "attachment"),
        ("geoPointArray", "geopoint"),
        ("geoShapeArray", "geoshape"),
    ];
    for (name, property_type) in arrays {
        properties.insert(name.to_string(), json!({ "multiplicity": true, "type": property_type }));
    }

    serde_json::from_value(json!({
        "metadata": {
            "ontologyRid": "ri.ontology.main.ontology.all-types",
            "ontologyApiName": "all-types"
        },
        "objects": {
            "objectTypeWithAllPropertyTypes": {
                "apiName": "objectTypeWithAllPropertyTypes",
                "primaryKeyType": "integer",
                "properties": properties
            }
        }
    }))
    .unwrap()
}

pub(crate) fn employee_ontology() -> OntologyDefinition {
    serde_json::from_value(json!({
        "metadata": {
            "ontologyRid": "ri.ontology.main.ontology.1",
            "ontologyApiName": "test-ontology",
            "userAgent": "ontology-sdk-tests/0.1.0"
        },
        "objects": {
            "Employee": {
                "apiName": "Employee",
                "description": "A person on the payroll",
                "primaryKeyType": "integer",
                "properties": {
                    "id": { "type": "integer", "nullable": false },
                    "fullName": { "type": "string" },
                    "title": { "type": "string" },
                    "department": { "type": "string" },
                    "salary": { "type": "double" },
                    "startDate": { "type": "datetime" },
                    "lastLogin": { "type": "timestamp" },
                    "isActive": { "type": "boolean" },
                    "skills": { "multiplicity": true, "type": "string" },
                    "badgePhoto": { "type": "attachment" },
                    "location": { "type": "geopoint" },
                    "heartRate": { "type": "numericTimeseries" },
                    "status": { "type": "stringTimeseries" }
                },
                "links": {
                    "office": { "targetType": "Office", "multiplicity": false },
                    "reports": { "targetType": "Employee", "multiplicity": true }
                }
            },
            "Office": {
                "apiName": "Office",
                "primaryKeyType": "string",
                "properties": {
                    "officeId": { "type": "string", "nullable": false },
                    "capacity": { "type": "integer" }
                }
            }
        }
    }))
    .unwrap()
}

pub(crate) fn client_with(transport: MockTransport) -> OntologyClient {
    OntologyClient::new(ClientContext::new(employee_ontology(), Arc::new(transport)))
}

/// A client whose transport fails the test if it is ever called.
pub(crate) fn test_client() -> OntologyClient {
    client_with(MockTransport::new())
}

pub(crate) fn employees(client: &OntologyClient) -> ObjectSet {
    client.objects("Employee").unwrap()
}

mod scenarios {
    use super::*;
    use crate::aggregations::{AggregationOperation, MetricValue, Metrics};
    use crate::error::{AggregateObjectsErrorKind, QueryBuildError, TimeSeriesErrorKind, WireError};
    use crate::timeseries::{TimeRange, TimeSeriesValue};
    use chrono::{TimeZone, Utc};
    use futures::stream::{self, StreamExt};
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    fn response(value: serde_json::Value) -> AggregateObjectsResponse {
        serde_json::from_value(value).unwrap()
    }

    fn point(day: u32, value: f64) -> TimeSeriesPoint {
        TimeSeriesPoint {
            time: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            value: TimeSeriesValue::Number(value),
        }
    }

    fn service_error(status: u16, error_name: &str) -> ApiError {
        ApiError::Service {
            status,
            error: WireError {
                error_code: "INVALID_ARGUMENT".to_string(),
                error_name: error_name.to_string(),
                error_instance_id: Some("0b6c".to_string()),
                ..WireError::default()
            },
        }
    }

    #[tokio::test]
    async fn test_group_by_count_round_trip() {
        let mut transport = MockTransport::new();
        transport
            .expect_aggregate()
            .withf(|request| {
                serde_json::to_value(request).unwrap()
                    == json!({
                        "objectSet": { "type": "base", "objectType": "Employee" },
                        "aggregation": [{
                            "type": "count",
                            "name": "count",
                            "metricValueType": "NUMERIC",
                            "namedAggregation": true
                        }],
                        "groupBy": [{ "field": "department", "type": "exact" }]
                    })
            })
            .times(1)
            .returning(|_| {
                Ok(response(json!({
                    "accuracy": "ACCURATE",
                    "data": [
                        {
                            "group": { "department": "Eng" },
                            "metrics": [{ "name": "count", "value": 5 }]
                        },
                        {
                            "group": { "department": "Ops" },
                            "metrics": [{ "name": "count", "value": 2 }]
                        }
                    ]
                })))
            });

        let client = client_with(transport);
        let compute = employees(&client)
            .group_by(|p| Ok(p.get("department")?.exact()))
            .unwrap()
            .count();
        let result = assert_ok!(compute.compute().await);

        let buckets = result.buckets().unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].group["department"], json!("Eng"));
        assert_eq!(buckets[0].metrics, Metrics::Value(MetricValue::Numeric(5.0)));
        assert_eq!(buckets[1].metrics.value().and_then(MetricValue::as_f64), Some(2.0));
    }

    #[tokio::test]
    async fn test_each_compute_sends_its_own_request() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut transport = MockTransport::new();
        let sent = Arc::clone(&seen);
        transport.expect_aggregate().times(2).returning(move |request| {
            sent.lock().unwrap().push(request);
            Ok(response(json!({
                "data": [{ "group": {}, "metrics": [{ "name": "max", "value": 180000.0 }] }]
            })))
        });

        let client = client_with(transport);
        let compute = employees(&client).max(|p| p.get("salary")).unwrap();
        let first = assert_ok!(compute.compute().await);
        let second = assert_ok!(compute.compute().await);

        assert_eq!(first, second);
        assert_eq!(
            first.metrics().and_then(Metrics::value),
            Some(&MetricValue::Numeric(180000.0))
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], seen[1]);
        assert_eq!(seen[0], compute.request());
    }

    #[tokio::test]
    async fn test_rejected_queries_never_reach_the_transport() {
        let mut transport = MockTransport::new();
        transport.expect_aggregate().never();
        let client = client_with(transport);

        let err = employees(&client)
            .aggregate(|_| {
                let p90 = json!({ "operation": "percentile", "propertyApiName": "salary" });
                Ok(BTreeMap::from([(
                    "p90".to_string(),
                    AggregationOperation::from_json(&p90)?,
                )]))
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown aggregation type: percentile");

        assert!(matches!(
            employees(&client).group_by(|p| Ok(p.get("location")?.exact())),
            Err(QueryBuildError::PropertyNotSelectable { .. })
        ));
        assert!(matches!(
            employees(&client).group_by(|p| Ok(p.get("skills")?.fixed_width(2.0))),
            Err(QueryBuildError::InvalidBucketing { .. })
        ));
    }

    fn assert_shareable<T: Clone + Send + Sync>() {}

    #[tokio::test]
    async fn test_steps_from_a_shared_prefix_compute_concurrently() {
        assert_shareable::<crate::aggregations::AggregationStep>();
        assert_shareable::<crate::aggregations::ComputeStep>();

        let mut transport = MockTransport::new();
        transport.expect_aggregate().times(2).returning(|request| {
            let name = request.aggregation[0].name.clone();
            Ok(response(json!({
                "data": [{
                    "group": { "department": "Eng" },
                    "metrics": [{ "name": name, "value": 1 }]
                }]
            })))
        });

        let client = client_with(transport);
        let by_department = employees(&client)
            .group_by(|p| Ok(p.get("department")?.exact()))
            .unwrap();
        let headcount = by_department.count();
        let payroll = by_department.sum(|p| p.get("salary")).unwrap();

        let (headcount, payroll) = tokio::join!(headcount.compute(), payroll.compute());
        assert_eq!(assert_ok!(headcount).buckets().unwrap().len(), 1);
        assert_eq!(
            assert_ok!(payroll).buckets().unwrap()[0].metrics.value(),
            Some(&MetricValue::Numeric(1.0))
        );
    }

    #[tokio::test]
    async fn test_service_errors_are_classified() {
        let mut transport = MockTransport::new();
        transport
            .expect_aggregate()
            .times(1)
            .returning(|_| Err(service_error(400, "AggregationGroupCountExceededLimit")));

        let client = client_with(transport);
        let compute = employees(&client)
            .group_by(|p| Ok(p.get("fullName")?.exact()))
            .unwrap()
            .count();
        let err = assert_err!(compute.compute().await);
        assert_eq!(err.kind, AggregateObjectsErrorKind::AggregationGroupCountExceededLimit);
        assert_eq!(err.error_instance_id.as_deref(), Some("0b6c"));
    }

    #[tokio::test]
    async fn test_undecodable_metric_is_malformed() {
        let mut transport = MockTransport::new();
        transport.expect_aggregate().returning(|_| {
            Ok(response(json!({
                "data": [{ "group": {}, "metrics": [{ "name": "min", "value": "yesterday" }] }]
            })))
        });

        let client = client_with(transport);
        let compute = employees(&client).min(|p| p.get("startDate")).unwrap();
        let err = assert_err!(compute.compute().await);
        assert_eq!(err.kind, AggregateObjectsErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_batch_over_linked_objects() {
        let mut transport = MockTransport::new();
        transport
            .expect_aggregate()
            .withf(|request| {
                let value = serde_json::to_value(request).unwrap();
                value["objectSet"]["type"] == "searchAround"
                    && value["aggregation"][0]["type"] == "count"
                    && value["aggregation"][1]["field"] == "capacity"
            })
            .times(1)
            .returning(|_| {
                Ok(response(json!({
                    "data": [{
                        "group": {},
                        "metrics": [
                            { "name": "seats", "value": 420 },
                            { "name": "offices", "value": 6 }
                        ]
                    }]
                })))
            });

        let client = client_with(transport);
        let offices = employees(&client).search_around("office").unwrap();
        let compute = offices
            .aggregate(|p| {
                Ok(BTreeMap::from([
                    ("seats".to_string(), p.get("capacity")?.sum()),
                    ("offices".to_string(), AggregationOperation::count()),
                ]))
            })
            .unwrap();
        let result = assert_ok!(compute.compute().await);

        let metrics = result.metrics().unwrap();
        assert_eq!(metrics.get("seats"), Some(&MetricValue::Numeric(420.0)));
        assert_eq!(metrics.get("offices"), Some(&MetricValue::Numeric(6.0)));
    }

    #[tokio::test]
    async fn test_time_series_first_and_last_point() {
        let mut transport = MockTransport::new();
        transport
            .expect_first_point()
            .withf(|locator| locator.primary_key == "7" && locator.property == "heartRate")
            .times(1)
            .returning(|_| Ok(point(1, 61.0)));
        transport
            .expect_last_point()
            .times(1)
            .returning(|_| Err(service_error(404, "ObjectNotFound")));

        let client = client_with(transport);
        let series = client.time_series("Employee", 7, "heartRate").unwrap();
        assert_eq!(assert_ok!(series.first_point().await), point(1, 61.0));

        let err = assert_err!(series.last_point().await);
        assert_eq!(err.kind, TimeSeriesErrorKind::ObjectNotFound);
    }

    #[tokio::test]
    async fn test_time_series_all_sends_the_range() {
        let mut transport = MockTransport::new();
        transport
            .expect_stream_points()
            .withf(|_, request| matches!(request.range, Some(TimeRange::Relative { .. })))
            .times(1)
            .returning(|_, _| {
                let points = vec![Ok(point(1, 60.0)), Ok(point(2, 64.0))];
                Ok(Box::pin(stream::iter(points)))
            });

        let client = client_with(transport);
        let series = client.time_series("Employee", 7, "heartRate").unwrap();
        let points = assert_ok!(series.from_days_ago(7).all().await);
        assert_eq!(points, vec![point(1, 60.0), point(2, 64.0)]);
        assert!(series.range().is_none());
    }

    #[tokio::test]
    async fn test_time_series_iterate_is_lazy_and_stops_on_error() {
        let client = test_client();
        let unpolled = client.time_series("Employee", 7, "heartRate").unwrap().iterate();
        drop(unpolled);

        let mut transport = MockTransport::new();
        transport.expect_stream_points().times(1).returning(|_, _| {
            let decode = serde_json::from_str::<TimeSeriesPoint>("{").unwrap_err();
            Ok(Box::pin(stream::iter(vec![
                Ok(point(1, 60.0)),
                Err(ApiError::Decode(decode)),
                Ok(point(3, 62.0)),
            ])))
        });

        let client = client_with(transport);
        let items: Vec<_> = client
            .time_series("Employee", 7, "heartRate")
            .unwrap()
            .iterate()
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &point(1, 60.0));
        assert_eq!(items[1].as_ref().unwrap_err().kind, TimeSeriesErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_time_series_request_failure_surfaces_once() {
        let mut transport = MockTransport::new();
        transport
            .expect_stream_points()
            .returning(|_, _| Err(service_error(400, "InvalidTimeSeriesRange")));

        let client = client_with(transport);
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let err = assert_err!(
            client
                .time_series("Employee", 7, "status")
                .unwrap()
                .between(Some(start), Some(end))
                .all()
                .await
        );
        assert_eq!(err.kind, TimeSeriesErrorKind::InvalidTimeSeriesRange);
    }
}
