use tracing::{debug, error, info, warn};

use crate::concurrency::queue::{CompletionSender, IntakeQueue};
use crate::error::{ErrorKind, StreamStatsResult};
use crate::gateway::Gateway;
use crate::ss_error;
use crate::types::{BackendId, PointState};
use crate::workers::executor::StageExecutor;

/// Counters reported by a worker once the intake queue is drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub backend: BackendId,
    /// Points taken from the intake queue, retries included.
    pub dequeued: u64,
    pub completed: u64,
    pub exhausted: u64,
    pub requeued: u64,
}

impl WorkerSummary {
    fn new(backend: BackendId) -> Self {
        Self {
            backend,
            dequeued: 0,
            completed: 0,
            exhausted: 0,
            requeued: 0,
        }
    }
}

/// Drives points through all stages on behalf of one backend.
///
/// The worker pops points until it observes an empty intake queue. A failed stage increments
/// the point's attempts and puts it at the back of the intake queue; completed and exhausted
/// points go to the completion queue.
#[derive(Debug)]
pub struct PointWorker<G> {
    backend: BackendId,
    executor: StageExecutor<G>,
    intake: IntakeQueue,
    completion: CompletionSender,
    max_retries: u32,
}

impl<G> PointWorker<G>
where
    G: Gateway,
{
    pub fn new(
        backend: BackendId,
        executor: StageExecutor<G>,
        intake: IntakeQueue,
        completion: CompletionSender,
        max_retries: u32,
    ) -> Self {
        Self {
            backend,
            executor,
            intake,
            completion,
            max_retries,
        }
    }

    pub async fn run(self) -> StreamStatsResult<WorkerSummary> {
        let mut summary = WorkerSummary::new(self.backend.clone());
        info!(backend = %self.backend, queued = self.intake.len(), "point worker started");

        while let Some(mut point) = self.intake.try_pop() {
            summary.dequeued += 1;
            debug!(
                backend = %self.backend,
                point_id = %point.id(),
                attempts = point.attempts(),
                queued = self.intake.len(),
                "point dequeued"
            );

            if point.is_exhausted(self.max_retries) {
                warn!(
                    backend = %self.backend,
                    point_id = %point.id(),
                    attempts = point.attempts(),
                    "retry budget exhausted, reporting partial results"
                );
                point.mark_exhausted();
                self.complete(point)?;
                summary.exhausted += 1;
                continue;
            }

            if point.assign_backend(self.backend.clone()) {
                info!(
                    backend = %self.backend,
                    point_id = %point.id(),
                    "workspace belongs to another backend, restarting from delineation"
                );
            }

            match self.advance(&mut point).await {
                Ok(()) => {
                    point.mark_completed();
                    info!(
                        backend = %self.backend,
                        point_id = %point.id(),
                        attempts = point.attempts(),
                        "point completed"
                    );
                    self.complete(point)?;
                    summary.completed += 1;
                }
                Err(err) => {
                    point.record_failure(err);
                    debug!(
                        backend = %self.backend,
                        point_id = %point.id(),
                        attempts = point.attempts(),
                        "point requeued"
                    );
                    self.intake.push(point);
                    summary.requeued += 1;
                }
            }
        }

        info!(
            backend = %self.backend,
            dequeued = summary.dequeued,
            completed = summary.completed,
            exhausted = summary.exhausted,
            requeued = summary.requeued,
            "intake queue empty, point worker stopping"
        );

        Ok(summary)
    }

    /// Runs the remaining stages in order, stopping at the first failure.
    async fn advance(&self, point: &mut PointState) -> StreamStatsResult<()> {
        while let Some(stage) = point.next_stage() {
            debug!(backend = %self.backend, point_id = %point.id(), %stage, "stage started");

            match self.executor.execute(stage, point).await {
                Ok(output) => {
                    point.record_output(output);
                    debug!(backend = %self.backend, point_id = %point.id(), %stage, "stage finished");
                }
                Err(err) => {
                    if err.kind().is_stage_failure() {
                        warn!(
                            backend = %self.backend,
                            point_id = %point.id(),
                            %stage,
                            attempts = point.attempts(),
                            error = %err.summary(),
                            "stage failed"
                        );
                    } else {
                        error!(
                            backend = %self.backend,
                            point_id = %point.id(),
                            %stage,
                            attempts = point.attempts(),
                            error = %err,
                            "stage failed unexpectedly"
                        );
                    }
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    fn complete(&self, point: PointState) -> StreamStatsResult<()> {
        let point_id = point.id().clone();
        self.completion.send(point).map_err(|_| {
            ss_error!(
                ErrorKind::InvalidState,
                "Completion queue closed before the point was reported",
                point_id
            )
        })
    }
}
