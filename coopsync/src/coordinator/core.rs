//! Single-use broadcast wait/notify gate

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channel::{Channel, PopError};
use crate::timeout::Timeout;

/// The two states a Coordinator moves through, once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorState {
    /// Not yet resumed; waiters park
    Open,

    /// Resumed; every current and future waiter is released
    Closing,
}

/// A single-use gate: any number of tasks `wait`, one `resume` releases them all.
///
/// Built on a capacity-1 [`Channel`] that is never pushed to. Waiting pops it;
/// resuming closes it, and the channel's broadcast close wakes every waiter.
/// Closing is sticky, so a `wait` issued after `resume` returns at once.
/// Starting a new wait cycle needs a new Coordinator.
pub struct Coordinator {
    channel: Channel<()>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            channel: Channel::bounded(NonZeroUsize::MIN),
        }
    }

    /// Suspend until resumed or until `timeout` elapses
    ///
    /// Returns `true` if the Coordinator is closing, `false` if the wait timed
    /// out while still open. [`Timeout::Poll`] reports the current state
    /// without suspending. If both happen together, closing wins.
    pub async fn wait(&self, timeout: Timeout) -> bool {
        debug!(?timeout, "Coordinator::wait: called");
        match self.channel.pop(timeout).await {
            Err(PopError::Closed) => true,
            // Resume may have landed right as the deadline passed
            Err(PopError::Timeout) => self.is_closing(),
            // Nothing is ever pushed onto the gate channel
            Ok(()) => self.is_closing(),
        }
    }

    pub fn is_closing(&self) -> bool {
        self.channel.is_closed()
    }

    pub fn state(&self) -> CoordinatorState {
        if self.is_closing() {
            CoordinatorState::Closing
        } else {
            CoordinatorState::Open
        }
    }

    /// Release every waiter, now and forever after
    ///
    /// Only the first call has any effect; it alone returns `true`.
    pub fn resume(&self) -> bool {
        let resumed = self.channel.close();
        debug!(resumed, "Coordinator::resume: called");
        resumed
    }

    /// Number of tasks currently parked in `wait`
    pub fn waiters(&self) -> usize {
        self.channel.stats().consumers
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("state", &self.state())
            .field("waiters", &self.waiters())
            .finish()
    }
}
