use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::{Map, Value, json};

use crate::error::{ErrorKind, StreamStatsError, StreamStatsResult};
use crate::gateway::Gateway;
use crate::types::{
    BackendId, BasinCharacteristics, BasinParameter, Crs, Delineation, Feature, FlowStatistic,
    FlowStatistics, PointSeed, RegionStatistics, RegressionRegion, Scenario, Stage,
};
use crate::{bail, ss_error};

/// Parameter codes every fake scenario asks for.
pub const PARAMETER_CODES: [&str; 3] = ["DRNAREA", "PRECIP", "ELEV"];

const WORKSPACE_PREFIX: &str = "ws-";
const REGION_PREFIX: &str = "GC-";

#[derive(Debug, Default)]
struct Inner {
    /// Point id by the bit pattern of its coordinates.
    points: HashMap<(u64, u64), String>,
    failures: HashMap<(Stage, String), u32>,
    incomplete_polls: HashMap<String, u32>,
    foreign_backends: HashMap<String, BackendId>,
    calls: HashMap<(Stage, String), u32>,
    delineated_by: Vec<(String, BackendId)>,
    in_flight: HashSet<String>,
    overlaps: u32,
}

/// In-memory [`Gateway`] keyed by point identifier.
///
/// The point behind each call is recovered from what earlier stages returned: the coordinates
/// registered through [`FakeGateway::new`], the workspace id, the regression region codes and
/// a `pointId` member of the scenario body.
#[derive(Debug, Clone)]
pub struct FakeGateway {
    inner: Arc<Mutex<Inner>>,
    latency: Duration,
}

impl FakeGateway {
    pub fn new(seeds: &[PointSeed]) -> Self {
        let points = seeds
            .iter()
            .map(|seed| ((seed.x.to_bits(), seed.y.to_bits()), seed.id.to_string()))
            .collect();

        Self {
            inner: Arc::new(Mutex::new(Inner {
                points,
                ..Inner::default()
            })),
            latency: Duration::from_millis(1),
        }
    }

    /// Time every call holds the point, which widens the window for detecting overlaps.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes the next `times` calls of `stage` for `point_id` fail with a 503.
    pub fn fail(&self, stage: Stage, point_id: &str, times: u32) {
        self.lock()
            .failures
            .insert((stage, point_id.to_string()), times);
    }

    /// Makes the first `polls` basin characteristics responses for `point_id` miss values.
    pub fn incomplete_polls(&self, point_id: &str, polls: u32) {
        self.lock()
            .incomplete_polls
            .insert(point_id.to_string(), polls);
    }

    /// Reports the workspace of `point_id` as created by `backend`, whatever was requested.
    pub fn serve_delineation_from(&self, point_id: &str, backend: impl Into<BackendId>) {
        self.lock()
            .foreign_backends
            .insert(point_id.to_string(), backend.into());
    }

    pub fn calls(&self, stage: Stage, point_id: &str) -> u32 {
        self.lock()
            .calls
            .get(&(stage, point_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self, stage: Stage) -> u32 {
        self.lock()
            .calls
            .iter()
            .filter(|((called, _), _)| *called == stage)
            .map(|(_, count)| count)
            .sum()
    }

    /// Backends that delineated each point, in call order.
    pub fn delineations(&self) -> Vec<(String, BackendId)> {
        self.lock().delineated_by.clone()
    }

    /// Number of calls that found their point already held by another call.
    pub fn overlaps(&self) -> u32 {
        self.lock().overlaps
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers the call, holds the point for the configured latency and applies scripted
    /// failures.
    async fn enter(&self, stage: Stage, point_id: &str) -> StreamStatsResult<()> {
        {
            let mut inner = self.lock();
            *inner
                .calls
                .entry((stage, point_id.to_string()))
                .or_default() += 1;
            if !inner.in_flight.insert(point_id.to_string()) {
                inner.overlaps += 1;
            }
        }

        tokio::time::sleep(self.latency).await;

        let mut inner = self.lock();
        inner.in_flight.remove(point_id);

        if let Some(remaining) = inner.failures.get_mut(&(stage, point_id.to_string()))
            && *remaining > 0
        {
            *remaining -= 1;
            bail!(
                ErrorKind::RemoteStatus,
                "StreamStats service returned an error status",
                format!("503 Service Unavailable during {stage} for {point_id}")
            );
        }

        Ok(())
    }

    fn point_at(&self, x: f64, y: f64) -> StreamStatsResult<String> {
        self.lock()
            .points
            .get(&(x.to_bits(), y.to_bits()))
            .cloned()
            .ok_or_else(|| unknown_point(format!("no point registered at ({x}, {y})")))
    }
}

impl Gateway for FakeGateway {
    async fn delineate_watershed(
        &self,
        region_code: &str,
        x: f64,
        y: f64,
        crs: Crs,
        backend: &BackendId,
    ) -> StreamStatsResult<Delineation> {
        let point_id = self.point_at(x, y)?;
        self.enter(Stage::Delineate, &point_id).await?;

        let served_by = {
            let mut inner = self.lock();
            let served_by = inner
                .foreign_backends
                .get(&point_id)
                .cloned()
                .unwrap_or_else(|| backend.clone());
            inner
                .delineated_by
                .push((point_id.clone(), served_by.clone()));
            served_by
        };

        let mut properties = Map::new();
        properties.insert("rcode".to_string(), Value::from(region_code));
        properties.insert("crs".to_string(), Value::from(crs.code()));

        Ok(Delineation {
            workspace_id: format!("{WORKSPACE_PREFIX}{point_id}"),
            backend: served_by,
            outlet: vec![Feature {
                geometry: json!({"type": "Point", "coordinates": [x, y]}),
                properties: properties.clone(),
            }],
            watershed: vec![Feature {
                geometry: json!({
                    "type": "Polygon",
                    "coordinates": [[[x, y], [x + 0.01, y], [x, y + 0.01], [x, y]]],
                    "pointId": point_id,
                }),
                properties,
            }],
        })
    }

    async fn get_regression_regions(&self, geometry: &Value) -> StreamStatsResult<Vec<RegressionRegion>> {
        let Some(point_id) = geometry.get("pointId").and_then(Value::as_str) else {
            return Err(unknown_point("watershed geometry has no point id"));
        };
        self.enter(Stage::RegressionRegions, point_id).await?;

        Ok(vec![RegressionRegion {
            code: format!("{REGION_PREFIX}{point_id}"),
            name: Some("Statewide Peak Flow".to_string()),
            percent_weight: Some(100.0),
        }])
    }

    async fn get_scenarios(
        &self,
        region_code: &str,
        stat_group: u32,
        regression_region_codes: &[String],
    ) -> StreamStatsResult<Scenario> {
        let Some(point_id) = regression_region_codes
            .first()
            .and_then(|code| code.strip_prefix(REGION_PREFIX))
        else {
            return Err(unknown_point("no regression region carries a point id"));
        };
        self.enter(Stage::Scenarios, point_id).await?;

        let parameters: Vec<Value> = PARAMETER_CODES
            .iter()
            .map(|code| json!({"code": code, "value": null}))
            .collect();

        Ok(Scenario {
            body: json!({
                "pointId": point_id,
                "region": region_code,
                "statisticGroupID": stat_group,
                "regressionRegions": [{
                    "code": regression_region_codes[0],
                    "parameters": parameters,
                }],
            }),
            parameter_codes: PARAMETER_CODES.iter().map(ToString::to_string).collect(),
        })
    }

    async fn get_basin_characteristics(
        &self,
        _region_code: &str,
        workspace_id: &str,
        parameter_codes: &[String],
        _backend: &BackendId,
    ) -> StreamStatsResult<BasinCharacteristics> {
        let Some(point_id) = workspace_id.strip_prefix(WORKSPACE_PREFIX) else {
            return Err(unknown_point(format!("unknown workspace {workspace_id}")));
        };
        self.enter(Stage::BasinCharacteristics, point_id).await?;

        let incomplete = {
            let mut inner = self.lock();
            match inner.incomplete_polls.get_mut(point_id) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };

        let parameters = parameter_codes
            .iter()
            .enumerate()
            .map(|(index, code)| BasinParameter {
                code: code.clone(),
                name: Some(code.to_lowercase()),
                description: None,
                unit: Some("units".to_string()),
                value: (!incomplete || index == 0).then_some(10.0 + index as f64),
            })
            .collect();

        Ok(BasinCharacteristics { parameters })
    }

    async fn compute_flow_statistics(
        &self,
        _region_code: &str,
        scenario: &Value,
    ) -> StreamStatsResult<FlowStatistics> {
        let Some(point_id) = scenario.get("pointId").and_then(Value::as_str) else {
            return Err(unknown_point("scenario has no point id"));
        };
        self.enter(Stage::FlowStatistics, point_id).await?;

        let unvalued = scenario["regressionRegions"]
            .as_array()
            .into_iter()
            .flatten()
            .flat_map(|region| region["parameters"].as_array().into_iter().flatten())
            .any(|parameter| parameter["value"].is_null());
        if unvalued {
            return Err(ss_error!(
                ErrorKind::InvalidResponse,
                "Scenario parameters were sent without values",
                point_id
            ));
        }

        Ok(FlowStatistics {
            regions: vec![RegionStatistics {
                code: format!("{REGION_PREFIX}{point_id}"),
                name: Some("Statewide Peak Flow".to_string()),
                percent_weight: Some(100.0),
                results: vec![FlowStatistic {
                    code: "PK100".to_string(),
                    name: "1 Percent AEP flood".to_string(),
                    value: Some(1250.0),
                    unit: Some("ft^3/s".to_string()),
                    equivalent_years: Some(12.0),
                    interval_lower: Some(800.0),
                    interval_upper: Some(1900.0),
                }],
            }],
        })
    }
}

fn unknown_point(detail: impl Into<String>) -> StreamStatsError {
    ss_error!(
        ErrorKind::InvalidState,
        "Fake gateway cannot identify the point",
        detail = detail.into()
    )
}
