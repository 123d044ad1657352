use std::collections::HashSet;
use std::future::Future;

use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::error::{ErrorKind, StreamStatsResult};
use crate::ss_error;
use crate::types::BackendId;
use crate::workers::point::WorkerSummary;

/// Runs one point worker per backend and waits for all of them.
///
/// The only producer of retries is a running worker, so once every worker task has returned
/// the intake queue is empty for good.
#[derive(Debug, Default)]
pub struct WorkerPool {
    backends: HashSet<BackendId>,
    join_set: JoinSet<(BackendId, StreamStatsResult<WorkerSummary>)>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns the worker future for `backend`. A second worker for the same backend is refused.
    pub fn spawn<F>(&mut self, backend: BackendId, future: F) -> bool
    where
        F: Future<Output = StreamStatsResult<WorkerSummary>> + Send + 'static,
    {
        if !self.backends.insert(backend.clone()) {
            warn!(%backend, "worker for backend already running, not spawning another");
            return false;
        }

        let task_backend = backend.clone();
        self.join_set.spawn(async move {
            let result = future.await;
            (task_backend, result)
        });
        debug!(%backend, "spawned point worker");

        true
    }

    pub fn len(&self) -> usize {
        self.join_set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.join_set.is_empty()
    }

    /// Waits for every worker and returns their summaries, ordered by backend.
    ///
    /// Failed or panicked workers do not stop the others; their errors are aggregated.
    pub async fn wait_all(mut self) -> StreamStatsResult<Vec<WorkerSummary>> {
        let mut summaries = Vec::with_capacity(self.join_set.len());
        let mut errors = Vec::new();

        while let Some(result) = self.join_set.join_next().await {
            match result {
                Ok((_, Ok(summary))) => summaries.push(summary),
                Ok((backend, Err(err))) => {
                    error!(%backend, error = %err, "point worker failed");
                    errors.push(err);
                }
                Err(join_err) => {
                    if join_err.is_cancelled() {
                        debug!("point worker task was cancelled");
                    } else {
                        errors.push(ss_error!(
                            ErrorKind::WorkerPanic,
                            "Point worker panicked",
                            join_err
                        ));
                    }
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        summaries.sort_by(|a, b| a.backend.cmp(&b.backend));
        Ok(summaries)
    }
}
