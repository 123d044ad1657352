use std::future::Future;

use serde_json::Value;

use crate::error::StreamStatsResult;
use crate::types::{
    BackendId, BasinCharacteristics, Crs, Delineation, FlowStatistics, RegressionRegion, Scenario,
};

/// Remote operations the pipeline needs from the StreamStats services.
///
/// Implementations issue exactly one request per call and never retry: retries and polling are
/// decided by the stage executor and the point worker. Every failure is returned as an error,
/// except for incomplete basin characteristics which are a successful, partial response.
pub trait Gateway {
    /// Delineates the watershed draining to `(x, y)`, addressed to `backend`.
    ///
    /// The returned [`Delineation::backend`] is the server that actually created the
    /// workspace, as reported by the service.
    fn delineate_watershed(
        &self,
        region_code: &str,
        x: f64,
        y: f64,
        crs: Crs,
        backend: &BackendId,
    ) -> impl Future<Output = StreamStatsResult<Delineation>> + Send;

    /// Finds the regression regions intersecting a watershed geometry.
    fn get_regression_regions(
        &self,
        geometry: &Value,
    ) -> impl Future<Output = StreamStatsResult<Vec<RegressionRegion>>> + Send;

    /// Fetches the scenario for a statistic group and the parameter codes its equations use.
    fn get_scenarios(
        &self,
        region_code: &str,
        stat_group: u32,
        regression_region_codes: &[String],
    ) -> impl Future<Output = StreamStatsResult<Scenario>> + Send;

    /// Fetches basin characteristics of a workspace from the backend holding it.
    ///
    /// Parameters the server has not finished computing come back without a value.
    fn get_basin_characteristics(
        &self,
        region_code: &str,
        workspace_id: &str,
        parameter_codes: &[String],
        backend: &BackendId,
    ) -> impl Future<Output = StreamStatsResult<BasinCharacteristics>> + Send;

    /// Evaluates flow statistics for a scenario whose parameters carry values.
    fn compute_flow_statistics(
        &self,
        region_code: &str,
        scenario: &Value,
    ) -> impl Future<Output = StreamStatsResult<FlowStatistics>> + Send;
}
