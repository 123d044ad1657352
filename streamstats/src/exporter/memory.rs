use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::aggregator::AggregatedOutput;
use crate::error::StreamStatsResult;
use crate::exporter::Exporter;

#[derive(Debug, Default)]
struct Inner {
    exports: usize,
    last: Option<AggregatedOutput>,
}

/// Keeps exported rows in memory so tests can inspect them.
#[derive(Debug, Clone, Default)]
pub struct MemoryExporter {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times [`Exporter::export`] was called.
    pub async fn exports(&self) -> usize {
        self.inner.lock().await.exports
    }

    pub async fn last_output(&self) -> Option<AggregatedOutput> {
        self.inner.lock().await.last.clone()
    }
}

impl Exporter for MemoryExporter {
    fn name() -> &'static str {
        "memory"
    }

    async fn export(&self, output: &AggregatedOutput) -> StreamStatsResult<()> {
        info!(points = output.statuses.len(), "exporting to memory");

        let mut inner = self.inner.lock().await;
        inner.exports += 1;
        inner.last = Some(output.clone());

        Ok(())
    }
}
