mod base;
mod client;
mod models;

pub use base::Gateway;
pub use client::StreamStatsClient;
