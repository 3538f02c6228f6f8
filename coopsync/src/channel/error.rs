//! Channel error types

use thiserror::Error;

/// Errors constructing a channel
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Channel capacity must be at least 1")]
    ZeroCapacity,
}

/// A push that did not enqueue its value
///
/// The value is handed back so the caller can retry or drop it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushError<T> {
    #[error("Channel closed")]
    Closed(T),

    #[error("Push timed out while channel was full")]
    Timeout(T),
}

impl<T> PushError<T> {
    /// Recover the value that was not pushed
    pub fn into_inner(self) -> T {
        match self {
            Self::Closed(value) | Self::Timeout(value) => value,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

/// A pop that produced no data
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// Closed and fully drained
    #[error("Channel closed")]
    Closed,

    #[error("Pop timed out while channel was empty")]
    Timeout,
}
