//! Command-line entry point for StreamStats batch runs.
//!
//! Reads points from a GeoJSON file, runs them through the StreamStats services and writes
//! watersheds, basin characteristics and flow statistics to a SQLite database. The log is
//! written next to the input file.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use streamstats::pipeline::BatchReport;
use streamstats_telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::load_batch_config;
use crate::core::{BatchRequest, process};
use crate::error::{BatchError, BatchResult};

mod config;
mod core;
mod error;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// GeoJSON file with the points to process.
    #[arg(long)]
    input: PathBuf,

    /// SQLite database receiving the results. Created when missing.
    #[arg(long)]
    output: PathBuf,

    /// StreamStats region code, e.g. `VT`.
    #[arg(long)]
    region_code: String,

    /// Feature property holding each point's unique identifier.
    #[arg(long)]
    unique_field: String,

    /// Run a single worker against the first configured backend.
    #[arg(long)]
    sequential: bool,

    /// Skip points the output already holds as completed.
    #[arg(long)]
    skip_completed: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // The log goes next to the input file.
    let log_dir = match args.input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let _log_flusher = match init_tracing(env!("CARGO_BIN_NAME"), Some(log_dir.as_path())) {
        Ok(flusher) => flusher,
        Err(err) => {
            eprint!("{}", BatchError::from(err).render_report());
            return ExitCode::FAILURE;
        }
    };

    match run(args) {
        Ok(report) => {
            print_summary(&report);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(category = err.category(), "{err}");
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> BatchResult<BatchReport> {
    let config = load_batch_config()?;

    let request = BatchRequest {
        input: args.input,
        output: args.output,
        region_code: args.region_code,
        unique_field: args.unique_field,
        parallel: !args.sequential,
        skip_completed: args.skip_completed,
    };

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(process(config, request))
}

fn print_summary(report: &BatchReport) {
    let elapsed = report.finished_at - report.started_at;

    println!(
        "processed {} points in {}s: {} completed, {} exhausted",
        report.total,
        elapsed.num_seconds(),
        report.completed,
        report.exhausted
    );
    for worker in &report.workers {
        println!(
            "  {}: {} dequeued, {} completed, {} exhausted, {} requeued",
            worker.backend, worker.dequeued, worker.completed, worker.exhausted, worker.requeued
        );
    }
}
