use std::time::Duration;

use serde_json::{Value, json};
use streamstats::error::ErrorKind;
use streamstats::gateway::{Gateway, StreamStatsClient};
use streamstats::types::{BackendId, BasinCharacteristics, BasinParameter, Crs, Scenario};
use streamstats_config::shared::EndpointsConfig;
use streamstats_telemetry::tracing::init_test_tracing;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BACKEND_HEADER: &str = "USGSWiM-HostName";

fn client(server: &MockServer) -> StreamStatsClient {
    StreamStatsClient::new(
        EndpointsConfig::with_base_url(&server.uri()),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn watershed_body() -> Value {
    json!({
        "workspaceID": "VT20240101120000123",
        "featurecollection": [
            {
                "name": "globalwatershedpoint",
                "feature": {"type": "FeatureCollection", "features": [
                    {"type": "Feature", "geometry": {"type": "Point", "coordinates": [-72.5, 44.1]},
                     "properties": {"Name": "outlet"}}
                ]}
            },
            {
                "name": "globalwatershed",
                "feature": {"type": "FeatureCollection", "features": [
                    {"type": "Feature",
                     "geometry": {"type": "Polygon", "coordinates": [[[-72.5, 44.1], [-72.4, 44.1], [-72.5, 44.2], [-72.5, 44.1]]]},
                     "properties": {"Name": "watershed"}}
                ]}
            }
        ]
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn delineation_reports_the_backend_that_served_it() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/prodweba/streamstatsservices/watershed.geojson"))
        .and(query_param("rcode", "VT"))
        .and(query_param("crs", "4326"))
        .and(query_param("includeparameters", "true"))
        .and(query_param("includefeatures", "true"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(BACKEND_HEADER, "ProdWebB")
                .set_body_json(watershed_body()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let delineation = client(&server)
        .delineate_watershed("VT", -72.5, 44.1, Crs::WGS84, &BackendId::new("prodweba"))
        .await
        .unwrap();

    assert_eq!(delineation.workspace_id, "VT20240101120000123");
    assert_eq!(delineation.backend, BackendId::new("prodwebb"));
    assert_eq!(delineation.outlet.len(), 1);
    assert_eq!(delineation.watershed.len(), 1);
    assert_eq!(
        delineation.watershed_geometry().unwrap()["type"],
        json!("Polygon")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn delineation_without_backend_header_is_invalid() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/prodweba/streamstatsservices/watershed.geojson"))
        .respond_with(ResponseTemplate::new(200).set_body_json(watershed_body()))
        .mount(&server)
        .await;

    let err = client(&server)
        .delineate_watershed("VT", -72.5, 44.1, Crs::WGS84, &BackendId::new("prodweba"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidResponse);
}

#[tokio::test(flavor = "multi_thread")]
async fn error_statuses_carry_the_status_and_body() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/nssservices/regressionregions/bylocation"))
        .respond_with(ResponseTemplate::new(500).set_body_string("geometry rejected"))
        .mount(&server)
        .await;

    let err = client(&server)
        .get_regression_regions(&json!({"type": "Polygon", "coordinates": []}))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RemoteStatus);
    let detail = err.detail().unwrap();
    assert!(detail.contains("500"), "{detail}");
    assert!(detail.contains("geometry rejected"), "{detail}");
}

#[tokio::test(flavor = "multi_thread")]
async fn regression_regions_are_looked_up_by_geometry() {
    init_test_tracing();
    let server = MockServer::start().await;
    let geometry = json!({"type": "Polygon", "coordinates": [[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [0.0, 0.0]]]});

    Mock::given(method("POST"))
        .and(path("/nssservices/regressionregions/bylocation"))
        .and(body_json(&geometry))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"code": "GC1415", "name": "Peak Flow Statewide", "percentWeight": 100.0}
        ])))
        .mount(&server)
        .await;

    let regions = client(&server).get_regression_regions(&geometry).await.unwrap();

    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].code, "GC1415");
    assert_eq!(regions[0].percent_weight, Some(100.0));
}

#[tokio::test(flavor = "multi_thread")]
async fn scenarios_collect_parameter_codes_across_regions() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/nssservices/scenarios.json"))
        .and(query_param("regions", "VT"))
        .and(query_param("statisticgroups", "2"))
        .and(query_param("regressionregions", "GC1415,GC1416"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "statisticGroupID": 2,
            "regressionRegions": [
                {"code": "GC1415", "parameters": [
                    {"code": "DRNAREA", "value": null},
                    {"code": "PRECIP", "value": null}
                ]},
                {"code": "GC1416", "parameters": [
                    {"code": "drnarea", "value": null},
                    {"code": "LC06STOR", "value": null}
                ]}
            ]
        }])))
        .mount(&server)
        .await;

    let scenario = client(&server)
        .get_scenarios("VT", 2, &["GC1415".to_string(), "GC1416".to_string()])
        .await
        .unwrap();

    assert_eq!(scenario.parameter_codes, vec!["DRNAREA", "PRECIP", "LC06STOR"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn basin_characteristics_are_read_from_the_workspace_backend() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/prodwebb/streamstatsservices/parameters.json"))
        .and(query_param("workspaceID", "VT123"))
        .and(query_param("includeparameters", "DRNAREA,PRECIP"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "parameters": [
                {"code": "DRNAREA", "name": "Drainage Area", "unit": "square miles", "value": 3.2},
                {"code": "PRECIP", "name": "Mean Annual Precipitation", "unit": "inches"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let characteristics = client(&server)
        .get_basin_characteristics(
            "VT",
            "VT123",
            &["DRNAREA".to_string(), "PRECIP".to_string()],
            &BackendId::new("prodwebb"),
        )
        .await
        .unwrap();

    assert!(!characteristics.is_complete());
    assert_eq!(characteristics.missing_codes(), vec!["PRECIP"]);
    assert_eq!(characteristics.value_of("drnarea"), Some(3.2));
}

#[tokio::test(flavor = "multi_thread")]
async fn flow_statistics_post_the_valued_scenario() {
    init_test_tracing();
    let server = MockServer::start().await;

    let scenario = Scenario {
        body: json!({
            "statisticGroupID": 2,
            "regressionRegions": [{"code": "GC1415", "parameters": [{"code": "DRNAREA", "value": null}]}]
        }),
        parameter_codes: vec!["DRNAREA".to_string()],
    };
    let valued = scenario.with_values(&BasinCharacteristics {
        parameters: vec![BasinParameter {
            code: "DRNAREA".to_string(),
            name: None,
            description: None,
            unit: None,
            value: Some(3.2),
        }],
    });

    Mock::given(method("POST"))
        .and(path("/nssservices/scenarios/estimate.json"))
        .and(query_param("regions", "VT"))
        .and(body_json(json!([valued.clone()])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "regressionRegions": [{
                "code": "GC1415",
                "name": "Peak Flow Statewide",
                "percentWeight": 100.0,
                "results": [{
                    "code": "PK100",
                    "name": "1 Percent AEP flood",
                    "value": 1250.0,
                    "unit": {"unit": "cubic feet per second", "abbr": "ft^3/s"},
                    "equivalentYears": 12.0,
                    "intervalBounds": {"lower": 800.0, "upper": 1900.0}
                }]
            }]
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let statistics = client(&server)
        .compute_flow_statistics("VT", &valued)
        .await
        .unwrap();

    let region = &statistics.regions[0];
    assert_eq!(region.code, "GC1415");
    let result = &region.results[0];
    assert_eq!(result.code, "PK100");
    assert_eq!(result.value, Some(1250.0));
    assert_eq!(result.unit.as_deref(), Some("ft^3/s"));
    assert_eq!(result.interval_upper, Some(1900.0));
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_responses_time_out() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/nssservices/scenarios.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = StreamStatsClient::new(
        EndpointsConfig::with_base_url(&server.uri()),
        Duration::from_millis(100),
    )
    .unwrap();

    let err = client.get_scenarios("VT", 2, &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RemoteTimeout);
}
