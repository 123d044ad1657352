use std::fmt;

use serde::{Deserialize, Serialize};

/// Remote stages a point passes through, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Delineate,
    RegressionRegions,
    Scenarios,
    BasinCharacteristics,
    FlowStatistics,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Delineate,
        Stage::RegressionRegions,
        Stage::Scenarios,
        Stage::BasinCharacteristics,
        Stage::FlowStatistics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Delineate => "delineate",
            Stage::RegressionRegions => "regression_regions",
            Stage::Scenarios => "scenarios",
            Stage::BasinCharacteristics => "basin_characteristics",
            Stage::FlowStatistics => "flow_statistics",
        }
    }

    /// Returns the stage that follows this one, if any.
    pub fn next(&self) -> Option<Stage> {
        let index = Stage::ALL.iter().position(|stage| stage == self)?;
        Stage::ALL.get(index + 1).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
