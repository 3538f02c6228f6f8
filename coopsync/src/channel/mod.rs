//! Bounded blocking channel
//!
//! The foundation of every other primitive in this crate. Unlike an ordinary
//! work queue, closing a [`Channel`] is a broadcast: every task parked in
//! `push` or `pop` wakes at once, and later pops on a drained channel return
//! immediately.

mod core;
mod error;

pub use core::{Channel, ChannelStats};
pub use error::{ChannelError, PopError, PushError};
