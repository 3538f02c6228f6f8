//! Timeout conventions shared by every blocking operation

use std::time::Duration;

use tokio::time::Instant;

/// How long a blocking operation may suspend the calling task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// Block until the operation can complete or the channel closes
    #[default]
    Forever,

    /// Never block: succeed immediately or report failure
    Poll,

    /// Block for at most this long
    After(Duration),
}

impl Timeout {
    /// Map the numeric seconds convention onto a timeout
    ///
    /// Negative (or NaN) blocks forever, zero polls, positive waits that long.
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_nan() || secs < 0.0 {
            Self::Forever
        } else if secs == 0.0 {
            Self::Poll
        } else {
            Self::After(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
        }
    }

    /// Build a timeout from milliseconds, zero meaning poll
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 { Self::Poll } else { Self::After(Duration::from_millis(ms)) }
    }

    /// True if the operation must not suspend
    pub fn is_poll(&self) -> bool {
        matches!(self, Self::Poll)
    }

    /// Absolute deadline for this timeout, measured from now
    ///
    /// `None` means no deadline. A poll has a deadline of right now.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        match self {
            Self::Forever => None,
            Self::Poll => Some(Instant::now()),
            Self::After(d) => Some(Instant::now().checked_add(*d).unwrap_or_else(far_future)),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        if d.is_zero() { Self::Poll } else { Self::After(d) }
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(d: Option<Duration>) -> Self {
        d.map(Self::from).unwrap_or(Self::Forever)
    }
}

// Roughly thirty years out, matching what tokio itself uses for "never".
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}
