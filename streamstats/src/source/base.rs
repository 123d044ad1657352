use std::future::Future;

use crate::error::StreamStatsResult;
use crate::types::PointSeed;

/// Supplies the points of a batch.
///
/// Implementations return seeds with unique identifiers, in source order, with coordinates in
/// the working CRS (EPSG:4326). Any error is fatal for the batch and is raised before a
/// worker starts.
pub trait PointSource {
    fn name() -> &'static str;

    fn load(&self) -> impl Future<Output = StreamStatsResult<Vec<PointSeed>>> + Send;
}
