//! Task handles and statistics for the timer

use serde::{Deserialize, Serialize};
use tokio::task::{JoinError, JoinHandle};

/// Identifier of a scheduled timer task, unique per Timer and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a tick callback asks of its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Wait another interval and fire again
    Continue,

    /// End the loop after this round
    Stop,
}

/// Handle to a spawned timer task
///
/// Dropping the handle detaches the task; it keeps running. Use
/// [`Timer::clear`](super::Timer::clear) to cancel it.
#[derive(Debug)]
pub struct TimerTask<T> {
    id: TaskId,
    handle: JoinHandle<T>,
}

impl<T> TimerTask<T> {
    pub(crate) fn new(id: TaskId, handle: JoinHandle<T>) -> Self {
        Self { id, handle }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to end
    ///
    /// A panicking callback surfaces here as a [`JoinError`].
    pub async fn join(self) -> Result<T, JoinError> {
        self.handle.await
    }

    /// Let the task run on unobserved, keeping only its id
    pub fn detach(self) -> TaskId {
        self.id
    }
}

/// Timer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerStats {
    /// Timer tasks spawned and not yet finished
    pub num: usize,

    /// Completed rounds summed over tick loops still running
    ///
    /// Each non-terminal round adds one; a finishing tick loop subtracts
    /// everything it added.
    pub round: i64,
}
