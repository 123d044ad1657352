use chrono::{DateTime, Utc};
use streamstats_config::shared::PipelineConfig;
use tracing::{info, warn};

use crate::aggregator::{AggregatedOutput, aggregate, drain};
use crate::concurrency::queue::{IntakeQueue, completion_queue};
use crate::error::{ErrorKind, StreamStatsResult};
use crate::exporter::Exporter;
use crate::gateway::Gateway;
use crate::source::PointSource;
use crate::ss_error;
use crate::types::{BackendId, PointState};
use crate::workers::executor::StageExecutor;
use crate::workers::point::{PointWorker, WorkerSummary};
use crate::workers::pool::WorkerPool;

/// Outcome of a whole batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Points loaded from the source.
    pub total: usize,
    pub completed: usize,
    pub exhausted: usize,
    pub workers: Vec<WorkerSummary>,
}

/// Runs one batch: load, process with one worker per backend, aggregate, export.
#[derive(Debug)]
pub struct Pipeline<G, S, E> {
    config: PipelineConfig,
    parallel: bool,
    gateway: G,
    source: S,
    exporter: E,
}

impl<G, S, E> Pipeline<G, S, E>
where
    G: Gateway + Clone + Send + Sync + 'static,
    S: PointSource,
    E: Exporter,
{
    pub fn new(config: PipelineConfig, gateway: G, source: S, exporter: E) -> Self {
        Self {
            config,
            parallel: true,
            gateway,
            source,
            exporter,
        }
    }

    /// With `false`, only the first configured backend gets a worker.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn exporter(&self) -> &E {
        &self.exporter
    }

    pub async fn run(&self) -> StreamStatsResult<BatchReport> {
        let started_at = Utc::now();

        let backends: Vec<BackendId> = self
            .config
            .backends_for(self.parallel)
            .iter()
            .map(|backend| BackendId::new(backend.as_str()))
            .collect();
        if backends.is_empty() {
            return Err(ss_error!(
                ErrorKind::ConfigError,
                "No backend configured for the batch"
            ));
        }

        let seeds = self.source.load().await?;
        let total = seeds.len();
        info!(
            source = S::name(),
            points = total,
            workers = backends.len(),
            max_retries = self.config.max_retries,
            "starting batch"
        );

        let intake: IntakeQueue = seeds.into_iter().map(PointState::new).collect();
        let (completion_tx, completion_rx) = completion_queue();

        let mut pool = WorkerPool::new();
        for backend in backends {
            let executor = StageExecutor::new(self.gateway.clone(), &self.config);
            let worker = PointWorker::new(
                backend.clone(),
                executor,
                intake.clone(),
                completion_tx.clone(),
                self.config.max_retries,
            );
            pool.spawn(backend, worker.run());
        }
        // Workers hold the remaining senders, so draining ends once they all stop.
        drop(completion_tx);

        let (workers, points) = tokio::join!(pool.wait_all(), drain(completion_rx));
        let workers = workers?;

        if !intake.is_empty() {
            warn!(
                remaining = intake.len(),
                "intake queue not empty after all workers stopped"
            );
        }

        if points.len() != total {
            return Err(ss_error!(
                ErrorKind::InvalidState,
                "Not every point reached the completion queue",
                format!("{} of {total} points finished", points.len())
            ));
        }

        let output: AggregatedOutput = aggregate(points);
        self.exporter.export(&output).await?;

        let report = BatchReport {
            started_at,
            finished_at: Utc::now(),
            total,
            completed: output.completed(),
            exhausted: output.exhausted(),
            workers,
        };

        info!(
            exporter = E::name(),
            total = report.total,
            completed = report.completed,
            exhausted = report.exhausted,
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "batch finished"
        );

        Ok(report)
    }
}
