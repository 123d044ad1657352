//! Batch processing of points through the StreamStats watershed services.
//!
//! Every point runs five remote stages in order: watershed delineation, regression regions,
//! scenarios, basin characteristics and flow statistics. A [`pipeline::Pipeline`] loads the
//! points from a [`source::PointSource`], runs one [`workers::point::PointWorker`] per backend
//! over a shared intake queue, retries failed points up to a configured budget and hands the
//! aggregated rows to an [`exporter::Exporter`].

mod macros;

pub mod aggregator;
pub mod concurrency;
pub mod error;
pub mod exporter;
pub mod gateway;
pub mod pipeline;
pub mod source;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;
