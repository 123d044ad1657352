use crate::error::{ErrorKind, StreamStatsError};
use crate::ss_error;
use crate::types::{BackendId, Crs, PointId, Stage, StageOutput, StageResults};

/// Input of one point as produced by a source loader.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSeed {
    pub id: PointId,
    pub x: f64,
    pub y: f64,
    pub crs: Crs,
    pub region_code: String,
}

impl PointSeed {
    pub fn new(id: impl Into<PointId>, x: f64, y: f64, region_code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            crs: Crs::WGS84,
            region_code: region_code.into(),
        }
    }
}

/// Terminal status of a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointOutcome {
    Pending,
    Completed,
    /// The retry budget ran out; results may be partial.
    Exhausted,
}

impl PointOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointOutcome::Pending => "pending",
            PointOutcome::Completed => "completed",
            PointOutcome::Exhausted => "exhausted",
        }
    }
}

/// Processing state of one point.
///
/// A point is moved between the intake queue, exactly one worker, and the completion queue.
/// It is never shared, so it needs no synchronization of its own.
#[derive(Debug, Clone)]
pub struct PointState {
    seed: PointSeed,
    backend: Option<BackendId>,
    attempts: u32,
    results: StageResults,
    last_error: Option<StreamStatsError>,
    outcome: PointOutcome,
}

impl PointState {
    pub fn new(seed: PointSeed) -> Self {
        Self {
            seed,
            backend: None,
            attempts: 0,
            results: StageResults::default(),
            last_error: None,
            outcome: PointOutcome::Pending,
        }
    }

    pub fn id(&self) -> &PointId {
        &self.seed.id
    }

    pub fn x(&self) -> f64 {
        self.seed.x
    }

    pub fn y(&self) -> f64 {
        self.seed.y
    }

    pub fn crs(&self) -> Crs {
        self.seed.crs
    }

    pub fn region_code(&self) -> &str {
        &self.seed.region_code
    }

    /// Backend of the worker currently or last holding the point.
    pub fn backend(&self) -> Option<&BackendId> {
        self.backend.as_ref()
    }

    /// Number of failed stage attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn results(&self) -> &StageResults {
        &self.results
    }

    pub fn last_error(&self) -> Option<&StreamStatsError> {
        self.last_error.as_ref()
    }

    pub fn outcome(&self) -> PointOutcome {
        self.outcome
    }

    /// True once the failed attempts exceed `max_retries`.
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.attempts > max_retries
    }

    /// Stamps the backend of the worker that just dequeued the point.
    ///
    /// A workspace only exists on the backend that created it. If the accumulated delineation
    /// lives elsewhere, all results are dropped so the point restarts from delineation, and
    /// `true` is returned.
    pub fn assign_backend(&mut self, backend: BackendId) -> bool {
        let stale = self
            .results
            .delineation
            .as_ref()
            .is_some_and(|delineation| delineation.backend != backend);

        if stale {
            self.results.clear();
        }

        self.backend = Some(backend);
        stale
    }

    /// Next stage to execute, or `None` when all results are present.
    pub fn next_stage(&self) -> Option<Stage> {
        self.results.next_pending()
    }

    pub fn record_output(&mut self, output: StageOutput) {
        self.results.insert(output);
    }

    /// Counts one failed stage attempt.
    pub fn record_failure(&mut self, error: StreamStatsError) {
        self.attempts += 1;
        self.last_error = Some(error);
    }

    pub fn mark_completed(&mut self) {
        self.outcome = PointOutcome::Completed;
    }

    /// Marks the point as out of retries, keeping the last stage failure as detail.
    pub fn mark_exhausted(&mut self) {
        let detail = self
            .last_error
            .as_ref()
            .map(StreamStatsError::summary)
            .unwrap_or_else(|| "no stage failure recorded".to_string());

        self.last_error = Some(ss_error!(
            ErrorKind::RetryExhausted,
            "Retry budget exhausted",
            detail = format!("after {} failed attempts: {detail}", self.attempts)
        ));
        self.outcome = PointOutcome::Exhausted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Delineation;

    fn delineation(backend: &str) -> StageOutput {
        StageOutput::Delineation(Delineation {
            workspace_id: "VT20240101".into(),
            backend: BackendId::new(backend),
            outlet: vec![],
            watershed: vec![],
        })
    }

    #[test]
    fn same_backend_keeps_results() {
        let mut point = PointState::new(PointSeed::new("p1", -72.5, 44.1, "VT"));
        point.assign_backend(BackendId::new("prodweba"));
        point.record_output(delineation("prodweba"));

        assert!(!point.assign_backend(BackendId::new("prodweba")));
        assert_eq!(point.next_stage(), Some(Stage::RegressionRegions));
    }

    #[test]
    fn other_backend_discards_workspace_results() {
        let mut point = PointState::new(PointSeed::new("p1", -72.5, 44.1, "VT"));
        point.record_output(delineation("prodweba"));
        point.record_output(StageOutput::RegressionRegions(vec![]));

        assert!(point.assign_backend(BackendId::new("prodwebb")));
        assert_eq!(point.next_stage(), Some(Stage::Delineate));
        assert_eq!(point.backend(), Some(&BackendId::new("prodwebb")));
    }

    #[test]
    fn exhaustion_wraps_last_failure() {
        let mut point = PointState::new(PointSeed::new("p1", -72.5, 44.1, "VT"));
        for _ in 0..4 {
            point.record_failure(ss_error!(ErrorKind::RemoteTimeout, "Remote call timed out"));
        }
        assert!(point.is_exhausted(3));

        point.mark_exhausted();
        let error = point.last_error().unwrap();
        assert_eq!(error.kind(), ErrorKind::RetryExhausted);
        assert!(error.detail().unwrap().contains("RemoteTimeout"));
        assert_eq!(point.outcome(), PointOutcome::Exhausted);
        assert_eq!(point.attempts(), 4);
    }
}
