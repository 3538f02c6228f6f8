//! Timer configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::coordinator::Identifier;

/// Timer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Rendezvous used when a schedule call names no identifier
    #[serde(rename = "default-identifier", default = "default_identifier")]
    pub default_identifier: Identifier,

    /// Shortest interval a tick timer may wait between rounds, in milliseconds
    #[serde(rename = "min-tick-interval-ms", default = "default_min_tick_interval_ms")]
    pub min_tick_interval_ms: u64,
}

fn default_identifier() -> Identifier {
    debug!("default_identifier: called");
    Identifier::WORKER_EXIT
}

fn default_min_tick_interval_ms() -> u64 {
    debug!("default_min_tick_interval_ms: called");
    1
}

impl Default for TimerConfig {
    fn default() -> Self {
        debug!("TimerConfig::default: called");
        Self {
            default_identifier: default_identifier(),
            min_tick_interval_ms: default_min_tick_interval_ms(),
        }
    }
}

impl TimerConfig {
    pub fn default_identifier(&self) -> &Identifier {
        &self.default_identifier
    }

    /// Get the tick floor as a Duration, never below one millisecond
    pub fn min_tick_interval(&self) -> Duration {
        debug!(min_tick_interval_ms = %self.min_tick_interval_ms, "TimerConfig::min_tick_interval: called");
        Duration::from_millis(self.min_tick_interval_ms.max(1))
    }
}
