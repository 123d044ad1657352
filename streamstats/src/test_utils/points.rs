use crate::types::PointSeed;

pub const TEST_REGION: &str = "VT";

/// Builds `count` seeds with ids `p00`, `p01`, ... spread along a line.
pub fn seeds(count: usize) -> Vec<PointSeed> {
    (0..count).map(seed).collect()
}

pub fn seed(index: usize) -> PointSeed {
    PointSeed::new(
        point_id(index),
        -72.5 + index as f64 * 0.01,
        44.0 + index as f64 * 0.01,
        TEST_REGION,
    )
}

pub fn point_id(index: usize) -> String {
    format!("p{index:02}")
}
