use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::types::PointState;

/// Shared FIFO of points waiting for a worker.
///
/// Popping moves the point out of the queue, so at most one worker holds a point at a time.
/// The lock is never held across an await point.
#[derive(Debug, Clone, Default)]
pub struct IntakeQueue {
    inner: Arc<Mutex<VecDeque<PointState>>>,
}

impl IntakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PointState>> {
        // Every critical section is a single deque call, so a poisoned deque is still consistent.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends a point at the back.
    pub fn push(&self, point: PointState) {
        self.lock().push_back(point);
    }

    /// Takes the front point without waiting. `None` means the queue was empty.
    pub fn try_pop(&self) -> Option<PointState> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl FromIterator<PointState> for IntakeQueue {
    fn from_iter<T: IntoIterator<Item = PointState>>(iter: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(iter.into_iter().collect())),
        }
    }
}

/// Sending half of the completion queue, cloned into every worker.
pub type CompletionSender = mpsc::UnboundedSender<PointState>;

/// Receiving half of the completion queue, drained by the aggregator.
pub type CompletionReceiver = mpsc::UnboundedReceiver<PointState>;

pub fn completion_queue() -> (CompletionSender, CompletionReceiver) {
    mpsc::unbounded_channel()
}
