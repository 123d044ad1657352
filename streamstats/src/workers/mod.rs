pub mod executor;
pub mod point;
pub mod pool;
