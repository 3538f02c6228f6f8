//! coopsync - cooperative coordination primitives
//!
//! The substrate that lets many tasks in one worker process wait for an event,
//! wait with a timeout, be woken in a single broadcast, and be scheduled to
//! run once, repeatedly, or until something happens.
//!
//! # Core Concepts
//!
//! - **Broadcast close**: closing a [`Channel`] wakes every parked task, not one
//! - **Single-use gates**: a [`Coordinator`] is resumed once and stays resumed
//! - **Rendezvous by name**: [`CoordinatorManager`] maps [`Identifier`]s to Coordinators
//! - **Cancellable timers**: [`Timer`] tasks all park on a named Coordinator, so
//!   resuming [`Identifier::WORKER_EXIT`] ends every default-scoped timer at once
//!
//! # Modules
//!
//! - [`channel`] - Bounded blocking channel
//! - [`coordinator`] - Coordinator, Identifier and CoordinatorManager
//! - [`timer`] - One-shot, repeating and resume-triggered timers
//! - [`timeout`] - Timeout conventions for blocking operations
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod channel;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod timeout;
pub mod timer;

// Re-export commonly used types
pub use channel::{Channel, ChannelError, ChannelStats, PopError, PushError};
pub use config::Config;
pub use coordinator::{Coordinator, CoordinatorManager, CoordinatorState, Identifier};
pub use timeout::Timeout;
pub use timer::{TaskId, Tick, Timer, TimerConfig, TimerStats, TimerTask};
