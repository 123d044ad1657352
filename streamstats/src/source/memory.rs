use crate::error::StreamStatsResult;
use crate::source::PointSource;
use crate::types::PointSeed;

/// Source over seeds already held in memory, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    seeds: Vec<PointSeed>,
}

impl MemorySource {
    pub fn new(seeds: Vec<PointSeed>) -> Self {
        Self { seeds }
    }
}

impl PointSource for MemorySource {
    fn name() -> &'static str {
        "memory"
    }

    async fn load(&self) -> StreamStatsResult<Vec<PointSeed>> {
        Ok(self.seeds.clone())
    }
}
