//! Named broadcast wait gates
//!
//! - **Coordinator:** single-use gate; `resume` releases every current and future waiter
//! - **Identifier:** typed rendezvous name
//! - **CoordinatorManager:** registry so unrelated code can meet on one Coordinator by name

mod core;
mod identifier;
mod manager;

pub use core::{Coordinator, CoordinatorState};
pub use identifier::Identifier;
pub use manager::CoordinatorManager;
