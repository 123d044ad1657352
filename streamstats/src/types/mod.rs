//! Core value types: identifiers, stages, per-stage results and point state.

mod crs;
mod ids;
mod point;
mod results;
mod stage;

pub use crs::Crs;
pub use ids::{BackendId, PointId};
pub use point::{PointOutcome, PointSeed, PointState};
pub use results::{
    BasinCharacteristics, BasinParameter, Delineation, Feature, FlowStatistic, FlowStatistics,
    RegionStatistics, RegressionRegion, Scenario, StageOutput, StageResults,
};
pub use stage::Stage;
