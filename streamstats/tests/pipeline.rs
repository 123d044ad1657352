use std::collections::HashSet;
use std::time::Duration;

use streamstats::aggregator::AggregatedOutput;
use streamstats::error::ErrorKind;
use streamstats::exporter::MemoryExporter;
use streamstats::pipeline::Pipeline;
use streamstats::source::{GeoJsonSource, MemorySource};
use streamstats::test_utils::gateway::{FakeGateway, PARAMETER_CODES};
use streamstats::test_utils::points::{point_id, seeds};
use streamstats::types::{BackendId, PointOutcome, Stage};
use streamstats_config::shared::{PipelineConfig, PollingConfig};
use streamstats_telemetry::tracing::init_test_tracing;

fn config(max_retries: u32) -> PipelineConfig {
    PipelineConfig {
        max_retries,
        polling: PollingConfig {
            max_extra_polls: 4,
            backoff_base: 2,
            time_unit_ms: 1,
        },
        ..PipelineConfig::default()
    }
}

async fn run(
    config: PipelineConfig,
    gateway: &FakeGateway,
    points: usize,
    parallel: bool,
) -> AggregatedOutput {
    let exporter = MemoryExporter::new();
    let pipeline = Pipeline::new(
        config,
        gateway.clone(),
        MemorySource::new(seeds(points)),
        exporter.clone(),
    )
    .with_parallel(parallel);

    let report = pipeline.run().await.unwrap();
    assert_eq!(report.total, points);
    assert_eq!(report.completed + report.exhausted, points);
    assert_eq!(exporter.exports().await, 1);

    exporter.last_output().await.unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn every_point_gets_a_full_record() {
    init_test_tracing();
    let gateway = FakeGateway::new(&seeds(3));

    let output = run(config(3), &gateway, 3, true).await;

    assert_eq!(output.completed(), 3);
    assert_eq!(output.outlets.len(), 3);
    assert_eq!(output.watersheds.len(), 3);
    assert_eq!(output.characteristics.len(), 3 * PARAMETER_CODES.len());
    assert_eq!(output.statistics.len(), 3);
    for status in &output.statuses {
        assert_eq!(status.status, PointOutcome::Completed);
        assert_eq!(status.attempts, 0);
        assert_eq!(status.last_stage, Some(Stage::FlowStatistics));
        assert!(status.error.is_none());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn a_transient_failure_costs_one_attempt() {
    init_test_tracing();
    let gateway = FakeGateway::new(&seeds(3));
    gateway.fail(Stage::Scenarios, "p01", 1);

    let output = run(config(3), &gateway, 3, true).await;

    let status = &output.statuses[1];
    assert_eq!(status.point_id.as_str(), "p01");
    assert_eq!(status.status, PointOutcome::Completed);
    assert_eq!(status.attempts, 1);
    assert_eq!(status.last_stage, Some(Stage::FlowStatistics));
    assert_eq!(gateway.calls(Stage::Scenarios, "p01"), 2);
    assert_eq!(
        output
            .statistics
            .iter()
            .filter(|statistic| statistic.point_id.as_str() == "p01")
            .count(),
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn points_are_reported_exhausted_after_the_retry_budget() {
    init_test_tracing();
    let gateway = FakeGateway::new(&seeds(2));
    gateway.fail(Stage::Delineate, "p00", 4);

    let output = run(config(3), &gateway, 2, true).await;

    let status = &output.statuses[0];
    assert_eq!(status.point_id.as_str(), "p00");
    assert_eq!(status.status, PointOutcome::Exhausted);
    assert_eq!(status.attempts, 4);
    assert_eq!(status.last_stage, None);
    assert!(status.error.as_deref().unwrap().contains("RetryExhausted"));
    assert_eq!(gateway.calls(Stage::Delineate, "p00"), 4);
    assert!(output.outlets.iter().all(|outlet| outlet.point_id.as_str() != "p00"));

    assert_eq!(output.statuses[1].status, PointOutcome::Completed);
}

#[tokio::test(flavor = "multi_thread")]
async fn attempts_never_exceed_the_retry_budget() {
    init_test_tracing();
    let gateway = FakeGateway::new(&seeds(8));
    for (index, stage) in Stage::ALL.iter().enumerate() {
        gateway.fail(*stage, &point_id(index), 2);
        gateway.fail(*stage, &point_id(index + 3), 6);
    }

    let max_retries = 2;
    let output = run(config(max_retries), &gateway, 8, true).await;

    for status in &output.statuses {
        assert!(status.attempts <= max_retries + 1, "{status:?}");
    }
    // Two failures fit the budget, six do not.
    for index in 0..3 {
        assert_eq!(output.statuses[index].status, PointOutcome::Completed);
    }
    for index in 3..8 {
        assert_eq!(output.statuses[index].status, PointOutcome::Exhausted);
        assert_eq!(output.statuses[index].attempts, max_retries + 1);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn two_workers_never_share_a_point() {
    init_test_tracing();
    let gateway = FakeGateway::new(&seeds(10)).with_latency(Duration::from_millis(2));
    for index in (0..10).step_by(3) {
        gateway.fail(Stage::RegressionRegions, &point_id(index), 1);
    }

    let output = run(config(3), &gateway, 10, true).await;

    assert_eq!(gateway.overlaps(), 0);
    assert_eq!(output.statuses.len(), 10);
    let ids: HashSet<&str> = output
        .statuses
        .iter()
        .map(|status| status.point_id.as_str())
        .collect();
    assert_eq!(ids.len(), 10);
    assert_eq!(output.completed(), 10);
}

#[tokio::test(flavor = "multi_thread")]
async fn sequential_runs_use_only_the_first_backend() {
    init_test_tracing();
    let gateway = FakeGateway::new(&seeds(4));

    let output = run(config(3), &gateway, 4, false).await;

    assert_eq!(output.completed(), 4);
    assert!(
        gateway
            .delineations()
            .iter()
            .all(|(_, backend)| *backend == BackendId::new("prodweba"))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn incomplete_characteristics_do_not_count_as_failures() {
    init_test_tracing();
    let gateway = FakeGateway::new(&seeds(1));
    gateway.incomplete_polls("p00", 1);

    let output = run(config(3), &gateway, 1, true).await;

    assert_eq!(output.statuses[0].status, PointOutcome::Completed);
    assert_eq!(output.statuses[0].attempts, 0);
    assert_eq!(gateway.calls(Stage::BasinCharacteristics, "p00"), 2);
    assert!(output.characteristics.iter().all(|row| row.value.is_some()));
}

#[tokio::test(flavor = "multi_thread")]
async fn foreign_workspaces_restart_from_delineation() {
    init_test_tracing();
    let gateway = FakeGateway::new(&seeds(1));
    gateway.serve_delineation_from("p00", "prodwebb");

    let output = run(config(2), &gateway, 1, false).await;

    let status = &output.statuses[0];
    assert_eq!(status.status, PointOutcome::Exhausted);
    assert_eq!(status.attempts, 3);
    assert!(status.error.as_deref().unwrap().contains("BackendAffinityMismatch"));
    assert_eq!(gateway.calls(Stage::Delineate, "p00"), 3);
    assert_eq!(gateway.calls(Stage::BasinCharacteristics, "p00"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn an_unreadable_source_fails_before_any_work() {
    init_test_tracing();
    let gateway = FakeGateway::new(&[]);
    let exporter = MemoryExporter::new();
    let pipeline = Pipeline::new(
        config(3),
        gateway.clone(),
        GeoJsonSource::new("/nonexistent/points.geojson", "UID", "VT"),
        exporter.clone(),
    );

    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SourceLoadFailed);
    assert_eq!(exporter.exports().await, 0);
    assert_eq!(gateway.total_calls(Stage::Delineate), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn an_empty_source_exports_empty_tables() {
    init_test_tracing();
    let gateway = FakeGateway::new(&[]);

    let output = run(config(3), &gateway, 0, true).await;

    assert_eq!(output, AggregatedOutput::default());
}
