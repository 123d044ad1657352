use std::time::Duration;

use streamstats_config::shared::{PipelineConfig, PollingConfig};
use tracing::debug;

use crate::error::{ErrorKind, StreamStatsResult};
use crate::gateway::Gateway;
use crate::types::{
    BackendId, BasinCharacteristics, Delineation, PointState, Scenario, Stage, StageOutput,
};
use crate::{bail, ss_error};

/// Runs single stages of a point against a [`Gateway`].
///
/// The executor only reads the point; the caller stores the returned [`StageOutput`] or records
/// the failure.
#[derive(Debug, Clone)]
pub struct StageExecutor<G> {
    gateway: G,
    stat_group: u32,
    polling: PollingConfig,
}

impl<G> StageExecutor<G>
where
    G: Gateway,
{
    pub fn new(gateway: G, config: &PipelineConfig) -> Self {
        Self {
            gateway,
            stat_group: config.stat_group,
            polling: config.polling.clone(),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub async fn execute(&self, stage: Stage, point: &PointState) -> StreamStatsResult<StageOutput> {
        match stage {
            Stage::Delineate => self.delineate(point).await,
            Stage::RegressionRegions => self.regression_regions(point).await,
            Stage::Scenarios => self.scenarios(point).await,
            Stage::BasinCharacteristics => self.basin_characteristics(point).await,
            Stage::FlowStatistics => self.flow_statistics(point).await,
        }
    }

    async fn delineate(&self, point: &PointState) -> StreamStatsResult<StageOutput> {
        let backend = assigned_backend(point)?;
        let delineation = self
            .gateway
            .delineate_watershed(point.region_code(), point.x(), point.y(), point.crs(), backend)
            .await?;

        if delineation.backend != *backend {
            debug!(
                point_id = %point.id(),
                requested = %backend,
                served_by = %delineation.backend,
                "workspace created on a different backend than requested"
            );
        }

        Ok(StageOutput::Delineation(delineation))
    }

    async fn regression_regions(&self, point: &PointState) -> StreamStatsResult<StageOutput> {
        let delineation = require_delineation(point)?;
        let Some(geometry) = delineation.watershed_geometry() else {
            bail!(
                ErrorKind::InvalidState,
                "Delineation has no watershed geometry",
                point.id()
            );
        };

        let regions = self.gateway.get_regression_regions(geometry).await?;
        Ok(StageOutput::RegressionRegions(regions))
    }

    async fn scenarios(&self, point: &PointState) -> StreamStatsResult<StageOutput> {
        let Some(regions) = point.results().regression_regions.as_ref() else {
            bail!(
                ErrorKind::InvalidState,
                "Scenarios requested before regression regions",
                point.id()
            );
        };

        let codes: Vec<String> = regions.iter().map(|region| region.code.clone()).collect();
        let scenario = self
            .gateway
            .get_scenarios(point.region_code(), self.stat_group, &codes)
            .await?;

        Ok(StageOutput::Scenario(scenario))
    }

    async fn basin_characteristics(&self, point: &PointState) -> StreamStatsResult<StageOutput> {
        let delineation = require_delineation(point)?;
        let scenario = require_scenario(point)?;
        let backend = assigned_backend(point)?;

        if delineation.backend != *backend {
            bail!(
                ErrorKind::BackendAffinityMismatch,
                "Workspace lives on another backend",
                format!(
                    "workspace {} is on {} but point {} is handled by {}",
                    delineation.workspace_id,
                    delineation.backend,
                    point.id(),
                    backend
                )
            );
        }

        let characteristics = self.poll_basin_characteristics(point, delineation, scenario).await?;
        Ok(StageOutput::BasinCharacteristics(characteristics))
    }

    /// Requests basin characteristics until every value is present.
    ///
    /// Sleeps `backoff_base^attempt` time units between requests and gives up with
    /// [`ErrorKind::IncompleteData`] after `max_extra_polls` extra requests. Incomplete responses
    /// are not failures of the point and do not count towards its attempts.
    async fn poll_basin_characteristics(
        &self,
        point: &PointState,
        delineation: &Delineation,
        scenario: &Scenario,
    ) -> StreamStatsResult<BasinCharacteristics> {
        let mut attempt: u32 = 1;

        loop {
            let characteristics = self
                .gateway
                .get_basin_characteristics(
                    point.region_code(),
                    &delineation.workspace_id,
                    &scenario.parameter_codes,
                    &delineation.backend,
                )
                .await?;

            if characteristics.is_complete() {
                return Ok(characteristics);
            }

            let missing = characteristics.missing_codes().join(",");
            if attempt > self.polling.max_extra_polls {
                bail!(
                    ErrorKind::IncompleteData,
                    "Basin characteristics were not ready in time",
                    format!(
                        "workspace {} still missing [{missing}] after {attempt} requests",
                        delineation.workspace_id
                    )
                );
            }

            let delay: Duration = self.polling.backoff(attempt);
            debug!(
                point_id = %point.id(),
                attempt,
                missing = %missing,
                delay_ms = delay.as_millis() as u64,
                "basin characteristics incomplete, polling again"
            );

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn flow_statistics(&self, point: &PointState) -> StreamStatsResult<StageOutput> {
        let scenario = require_scenario(point)?;
        let Some(characteristics) = point.results().basin_characteristics.as_ref() else {
            bail!(
                ErrorKind::InvalidState,
                "Flow statistics requested before basin characteristics",
                point.id()
            );
        };

        let valued = scenario.with_values(characteristics);
        let statistics = self
            .gateway
            .compute_flow_statistics(point.region_code(), &valued)
            .await?;

        Ok(StageOutput::FlowStatistics(statistics))
    }
}

fn assigned_backend(point: &PointState) -> StreamStatsResult<&BackendId> {
    point.backend().ok_or_else(|| {
        ss_error!(
            ErrorKind::InvalidState,
            "Point has no assigned backend",
            point.id()
        )
    })
}

fn require_delineation(point: &PointState) -> StreamStatsResult<&Delineation> {
    point.results().delineation.as_ref().ok_or_else(|| {
        ss_error!(
            ErrorKind::InvalidState,
            "Stage requires a delineated watershed",
            point.id()
        )
    })
}

fn require_scenario(point: &PointState) -> StreamStatsResult<&Scenario> {
    point.results().scenario.as_ref().ok_or_else(|| {
        ss_error!(
            ErrorKind::InvalidState,
            "Stage requires a scenario",
            point.id()
        )
    })
}
