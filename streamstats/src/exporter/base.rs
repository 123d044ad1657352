use std::future::Future;

use crate::aggregator::AggregatedOutput;
use crate::error::StreamStatsResult;

/// Persists the aggregated rows of a batch.
///
/// Implementations write outlet points, watershed polygons, characteristics, statistics and
/// point statuses keyed by point identifier. Empty tables are valid and must not fail the export.
pub trait Exporter {
    fn name() -> &'static str;

    fn export(&self, output: &AggregatedOutput) -> impl Future<Output = StreamStatsResult<()>> + Send;
}
