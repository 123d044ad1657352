//! Turns finished points into the rows written by an exporter.
//!
//! Completion order is arbitrary, so points are sorted by identifier first. Points that ran out
//! of retries contribute whatever their finished stages produced plus a status row; they never
//! abort the batch.

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::concurrency::queue::CompletionReceiver;
use crate::types::{PointId, PointOutcome, PointState, Stage};

#[derive(Debug, Clone, PartialEq)]
pub struct OutletRecord {
    pub point_id: PointId,
    pub input_x: f64,
    pub input_y: f64,
    pub geometry: Value,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatershedRecord {
    pub point_id: PointId,
    pub geometry: Value,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharacteristicRecord {
    pub point_id: PointId,
    pub code: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub value: Option<f64>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatisticRecord {
    pub point_id: PointId,
    pub region_code: String,
    pub region_name: Option<String>,
    pub code: String,
    pub name: String,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub equivalent_years: Option<f64>,
    pub interval_lower: Option<f64>,
    pub interval_upper: Option<f64>,
}

/// One row per point telling whether its data is complete.
#[derive(Debug, Clone, PartialEq)]
pub struct PointStatusRecord {
    pub point_id: PointId,
    pub status: PointOutcome,
    pub attempts: u32,
    pub backend: Option<String>,
    pub last_stage: Option<Stage>,
    pub error: Option<String>,
}

/// Rows of all output tables, each sorted by point identifier.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregatedOutput {
    pub outlets: Vec<OutletRecord>,
    pub watersheds: Vec<WatershedRecord>,
    pub characteristics: Vec<CharacteristicRecord>,
    pub statistics: Vec<StatisticRecord>,
    pub statuses: Vec<PointStatusRecord>,
}

impl AggregatedOutput {
    pub fn completed(&self) -> usize {
        self.count(PointOutcome::Completed)
    }

    pub fn exhausted(&self) -> usize {
        self.count(PointOutcome::Exhausted)
    }

    fn count(&self, outcome: PointOutcome) -> usize {
        self.statuses
            .iter()
            .filter(|status| status.status == outcome)
            .count()
    }
}

/// Receives every finished point. Returns once all completion senders are dropped.
pub async fn drain(mut completion: CompletionReceiver) -> Vec<PointState> {
    let mut points = Vec::new();
    while let Some(point) = completion.recv().await {
        points.push(point);
    }
    points
}

/// Groups finished points into output rows.
pub fn aggregate(mut points: Vec<PointState>) -> AggregatedOutput {
    points.sort_by(|a, b| a.id().cmp(b.id()));

    let mut output = AggregatedOutput::default();
    for point in &points {
        push_point(&mut output, point);
    }

    info!(
        points = points.len(),
        completed = output.completed(),
        exhausted = output.exhausted(),
        "aggregated finished points"
    );

    output
}

fn push_point(output: &mut AggregatedOutput, point: &PointState) {
    let results = point.results();

    if point.outcome() != PointOutcome::Completed || !results.is_complete() {
        let missing: Vec<&str> = Stage::ALL
            .iter()
            .filter(|stage| !results.contains(**stage))
            .map(Stage::as_str)
            .collect();

        warn!(
            point_id = %point.id(),
            status = point.outcome().as_str(),
            attempts = point.attempts(),
            missing = %missing.join(","),
            error = %point.last_error().map(|err| err.summary()).unwrap_or_default(),
            "point finished with partial results"
        );
    }

    output.statuses.push(PointStatusRecord {
        point_id: point.id().clone(),
        status: point.outcome(),
        attempts: point.attempts(),
        backend: point.backend().map(ToString::to_string),
        last_stage: results.last_completed(),
        error: point.last_error().map(|err| err.summary()),
    });

    if let Some(delineation) = &results.delineation {
        output
            .outlets
            .extend(delineation.outlet.iter().map(|feature| OutletRecord {
                point_id: point.id().clone(),
                input_x: point.x(),
                input_y: point.y(),
                geometry: feature.geometry.clone(),
                properties: feature.properties.clone(),
            }));

        output
            .watersheds
            .extend(delineation.watershed.iter().map(|feature| WatershedRecord {
                point_id: point.id().clone(),
                geometry: feature.geometry.clone(),
                properties: feature.properties.clone(),
            }));
    }

    if let Some(characteristics) = &results.basin_characteristics {
        output
            .characteristics
            .extend(characteristics.parameters.iter().map(|parameter| CharacteristicRecord {
                point_id: point.id().clone(),
                code: parameter.code.clone(),
                name: parameter.name.clone(),
                description: parameter.description.clone(),
                value: parameter.value,
                unit: parameter.unit.clone(),
            }));
    }

    if let Some(statistics) = &results.flow_statistics {
        for region in &statistics.regions {
            output
                .statistics
                .extend(region.results.iter().map(|statistic| StatisticRecord {
                    point_id: point.id().clone(),
                    region_code: region.code.clone(),
                    region_name: region.name.clone(),
                    code: statistic.code.clone(),
                    name: statistic.name.clone(),
                    value: statistic.value,
                    unit: statistic.unit.clone(),
                    equivalent_years: statistic.equivalent_years,
                    interval_lower: statistic.interval_lower,
                    interval_upper: statistic.interval_upper,
                }));
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::concurrency::queue::completion_queue;
    use crate::error::ErrorKind;
    use crate::ss_error;
    use crate::types::{
        BackendId, BasinCharacteristics, BasinParameter, Delineation, Feature, PointSeed,
        StageOutput,
    };

    fn delineated(id: &str) -> PointState {
        let mut point = PointState::new(PointSeed::new(id, -72.0, 44.0, "VT"));
        point.assign_backend(BackendId::new("prodweba"));
        point.record_output(StageOutput::Delineation(Delineation {
            workspace_id: format!("ws-{id}"),
            backend: BackendId::new("prodweba"),
            outlet: vec![Feature {
                geometry: json!({"type": "Point", "coordinates": [-72.0, 44.0]}),
                properties: Map::new(),
            }],
            watershed: vec![Feature {
                geometry: json!({"type": "Polygon", "coordinates": []}),
                properties: Map::new(),
            }],
        }));
        point
    }

    #[test]
    fn partial_points_get_rows_for_finished_stages_only() {
        let mut partial = delineated("b");
        for _ in 0..4 {
            partial.record_failure(ss_error!(ErrorKind::RemoteStatus, "status", "503"));
        }
        partial.mark_exhausted();

        let mut characterized = delineated("a");
        characterized.record_output(StageOutput::RegressionRegions(vec![]));
        characterized.record_output(StageOutput::BasinCharacteristics(BasinCharacteristics {
            parameters: vec![BasinParameter {
                code: "DRNAREA".into(),
                name: Some("Drainage Area".into()),
                description: None,
                unit: Some("square miles".into()),
                value: Some(3.2),
            }],
        }));
        characterized.mark_completed();

        let output = aggregate(vec![partial, characterized]);

        let ids: Vec<&str> = output.statuses.iter().map(|s| s.point_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(output.outlets.len(), 2);
        assert_eq!(output.watersheds.len(), 2);
        assert_eq!(output.characteristics.len(), 1);
        assert!(output.statistics.is_empty());

        let exhausted = &output.statuses[1];
        assert_eq!(exhausted.status, PointOutcome::Exhausted);
        assert_eq!(exhausted.attempts, 4);
        assert_eq!(exhausted.last_stage, Some(Stage::Delineate));
        assert!(exhausted.error.as_deref().unwrap().contains("RetryExhausted"));
        assert_eq!(output.exhausted(), 1);
    }

    #[tokio::test]
    async fn drain_returns_after_all_senders_drop() {
        let (tx, rx) = completion_queue();
        let other = tx.clone();
        tx.send(delineated("a")).unwrap();
        other.send(delineated("b")).unwrap();
        drop(tx);
        drop(other);

        assert_eq!(drain(rx).await.len(), 2);
    }
}
