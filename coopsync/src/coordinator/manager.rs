//! CoordinatorManager - registry mapping identifiers to Coordinators

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use super::core::Coordinator;
use super::identifier::Identifier;

static GLOBAL: LazyLock<Arc<CoordinatorManager>> = LazyLock::new(|| Arc::new(CoordinatorManager::new()));

/// Lets unrelated code rendezvous on a Coordinator by name.
///
/// Holds at most one Coordinator per identifier. Lookups create lazily under a
/// single lock, so concurrent first access never produces duplicates. A resumed
/// Coordinator stays registered (late waiters see it closing) until it is
/// explicitly renewed or retired.
#[derive(Debug, Default)]
pub struct CoordinatorManager {
    coordinators: Mutex<HashMap<Identifier, Arc<Coordinator>>>,
}

impl CoordinatorManager {
    /// Create an isolated registry
    pub fn new() -> Self {
        debug!("CoordinatorManager::new: called");
        Self::default()
    }

    /// The process-wide registry
    pub fn global() -> Arc<CoordinatorManager> {
        GLOBAL.clone()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Identifier, Arc<Coordinator>>> {
        self.coordinators.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the Coordinator registered under `identifier`, creating it on first access
    pub fn until(&self, identifier: &Identifier) -> Arc<Coordinator> {
        let mut coordinators = self.lock();
        if let Some(coord) = coordinators.get(identifier) {
            return coord.clone();
        }
        debug!(%identifier, "CoordinatorManager::until: registering new coordinator");
        let coord = Arc::new(Coordinator::new());
        coordinators.insert(identifier.clone(), coord.clone());
        coord
    }

    /// Resume the Coordinator registered under `identifier`
    ///
    /// Registers one first if absent, so tasks arriving later still observe
    /// the resume. Returns `true` if this call performed the transition.
    pub fn resume(&self, identifier: &Identifier) -> bool {
        let resumed = self.until(identifier).resume();
        debug!(%identifier, resumed, "CoordinatorManager::resume: called");
        resumed
    }

    /// Start a new wait cycle under `identifier`
    ///
    /// Replaces the registered Coordinator with a fresh one if it has been
    /// resumed; an open Coordinator is left in place. Returns whichever is
    /// registered afterwards.
    pub fn renew(&self, identifier: &Identifier) -> Arc<Coordinator> {
        let mut coordinators = self.lock();
        match coordinators.get(identifier) {
            Some(coord) if !coord.is_closing() => {
                debug!(%identifier, "CoordinatorManager::renew: still open, keeping");
                coord.clone()
            }
            _ => {
                info!(%identifier, "Renewing coordinator");
                let coord = Arc::new(Coordinator::new());
                coordinators.insert(identifier.clone(), coord.clone());
                coord
            }
        }
    }

    /// Unregister `identifier`
    ///
    /// Once removed, the Coordinator can no longer be reached by name. If
    /// anything besides the registry still holds it (a parked waiter, a timer
    /// task between rounds) it is resumed, so those holders end instead of
    /// waiting on a name nobody can resume. An unheld Coordinator is dropped
    /// open.
    pub fn retire(&self, identifier: &Identifier) -> Option<Arc<Coordinator>> {
        let retired = self.lock().remove(identifier)?;
        let held = Arc::strong_count(&retired) > 1;
        if held {
            retired.resume();
        }
        info!(%identifier, held, "Retired coordinator");
        Some(retired)
    }

    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.lock().contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Registered identifiers, sorted
    pub fn identifiers(&self) -> Vec<Identifier> {
        let mut ids: Vec<_> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}
