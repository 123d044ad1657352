//! Configuration types shared by the batch binary and the pipeline library.

mod base;
mod batch;
mod endpoints;
mod pipeline;
mod polling;

pub use base::ValidationError;
pub use batch::BatchConfig;
pub use endpoints::{BACKEND_PLACEHOLDER, Endpoint, EndpointsConfig};
pub use pipeline::PipelineConfig;
pub use polling::PollingConfig;
