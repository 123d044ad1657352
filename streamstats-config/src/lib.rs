//! Configuration for StreamStats batch runs.
//!
//! Typed settings live in [`shared`]; [`load`] assembles them from `configuration/`
//! files and `APP_`-prefixed environment variables.

pub mod environment;
pub mod load;
pub mod shared;

pub use load::{Config, LoadConfigError, load_config, load_config_from};
