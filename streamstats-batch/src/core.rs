use std::path::PathBuf;

use streamstats::exporter::SqliteExporter;
use streamstats::gateway::StreamStatsClient;
use streamstats::pipeline::{BatchReport, Pipeline};
use streamstats::source::{GeoJsonSource, MemorySource, PointSource};
use streamstats_config::shared::BatchConfig;
use tracing::info;

use crate::error::BatchResult;

/// What to process and where to write it, as given on the command line.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub region_code: String,
    pub unique_field: String,
    pub parallel: bool,
    pub skip_completed: bool,
}

/// Runs one batch against the StreamStats services and writes the results to SQLite.
///
/// The output database is only created once the input has been read, so an unreadable input
/// leaves no output file behind.
pub async fn process(config: BatchConfig, request: BatchRequest) -> BatchResult<BatchReport> {
    log_config(&config, &request);

    let mut source = GeoJsonSource::new(
        &request.input,
        &request.unique_field,
        &request.region_code,
    );
    let mut existing = None;
    if request.skip_completed && request.output.exists() {
        let exporter = SqliteExporter::connect(&request.output).await?;
        let completed = exporter.completed_ids().await?;
        info!(
            points = completed.len(),
            "skipping points already completed in the output"
        );
        source = source.with_ignored(completed);
        existing = Some(exporter);
    }

    let seeds = source.load().await?;
    let exporter = match existing {
        Some(exporter) => exporter,
        None => SqliteExporter::connect(&request.output).await?,
    };

    let gateway = StreamStatsClient::new(config.endpoints, config.pipeline.request_timeout())?;

    let pipeline = Pipeline::new(config.pipeline, gateway, MemorySource::new(seeds), exporter)
        .with_parallel(request.parallel);

    Ok(pipeline.run().await?)
}

fn log_config(config: &BatchConfig, request: &BatchRequest) {
    info!(
        input = %request.input.display(),
        output = %request.output.display(),
        region_code = %request.region_code,
        unique_field = %request.unique_field,
        parallel = request.parallel,
        backends = ?config.pipeline.backends_for(request.parallel),
        max_retries = config.pipeline.max_retries,
        stat_group = config.pipeline.stat_group,
        request_timeout_ms = config.pipeline.request_timeout_ms,
        "batch configuration"
    );
}
