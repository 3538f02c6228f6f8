//! Timer for one-shot, repeating and resume-triggered callbacks
//!
//! Every task suspends on a named Coordinator, so one resume can end many
//! timers at once. Tasks are tracked for best-effort cancellation and two
//! counters are exposed through [`Timer::stats`].

mod config;
mod core;
mod task;

pub use config::TimerConfig;
pub use core::Timer;
pub use task::{TaskId, Tick, TimerStats, TimerTask};
