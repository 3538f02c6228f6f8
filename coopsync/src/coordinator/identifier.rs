//! Rendezvous identifiers

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Name under which unrelated code meets at the same Coordinator
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(Cow<'static, str>);

impl Identifier {
    /// Default rendezvous for every timer that should stop when the worker exits
    pub const WORKER_EXIT: Identifier = Identifier(Cow::Borrowed("worker.exit"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Identifier namespaced by subsystem, e.g. `rpc:shutdown`
    ///
    /// Registered Coordinators live until retired; callers minting
    /// short-lived names should [`retire`](super::CoordinatorManager::retire)
    /// them when done.
    pub fn scoped(scope: &str, name: &str) -> Self {
        Self(Cow::Owned(format!("{}:{}", scope, name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_worker_exit(&self) -> bool {
        *self == Self::WORKER_EXIT
    }
}

impl Default for Identifier {
    fn default() -> Self {
        Self::WORKER_EXIT
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&'static str> for Identifier {
    fn from(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }
}

impl From<String> for Identifier {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}
