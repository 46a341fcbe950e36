//! Process-wide orchestrator slot.

use std::sync::Arc;

use parking_lot::Mutex;

use super::Orchestrator;
use crate::error::OrchestratorResult;

/// Lazily initialized, shareable orchestrator.
///
/// Owned by: the embedding application, typically as a `static`.
/// Handed to: every subsystem that needs the orchestrator, as an
/// `Arc<Orchestrator>` clone.
///
/// The slot holds at most one orchestrator. `take` empties it so the
/// application can stop the orchestrator and later install a fresh one.
///
/// ```
/// use std::sync::Arc;
/// use arena_engine::ReferenceEngine;
/// use arena_orchestrator::{Orchestrator, SharedOrchestrator};
///
/// static ORCHESTRATOR: SharedOrchestrator = SharedOrchestrator::new();
///
/// let first = ORCHESTRATOR
///     .get_or_init(|| Orchestrator::new(Arc::new(ReferenceEngine::new())))
///     .unwrap();
/// let again = ORCHESTRATOR.get().unwrap();
/// assert!(Arc::ptr_eq(&first, &again));
/// ```
pub struct SharedOrchestrator {
    slot: Mutex<Option<Arc<Orchestrator>>>,
}

impl SharedOrchestrator {
    /// Creates an empty slot. Usable in `static` initializers.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slot: parking_lot::const_mutex(None),
        }
    }

    /// Returns the orchestrator, building it with `init` on first use.
    ///
    /// Concurrent callers block until the first `init` finishes; `init`
    /// runs at most once unless it fails.
    ///
    /// # Errors
    ///
    /// Whatever `init` returns. The slot stays empty.
    pub fn get_or_init<F>(&self, init: F) -> OrchestratorResult<Arc<Orchestrator>>
    where
        F: FnOnce() -> OrchestratorResult<Orchestrator>,
    {
        let mut slot = self.slot.lock();
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }
        let orchestrator = Arc::new(init()?);
        *slot = Some(orchestrator.clone());
        Ok(orchestrator)
    }

    /// The orchestrator, if initialized.
    #[must_use]
    pub fn get(&self) -> Option<Arc<Orchestrator>> {
        self.slot.lock().clone()
    }

    /// Empties the slot and returns what it held.
    pub fn take(&self) -> Option<Arc<Orchestrator>> {
        self.slot.lock().take()
    }
}

impl Default for SharedOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrchestratorError;
    use arena_engine::ReferenceEngine;

    #[test]
    fn test_init_runs_once() {
        let shared = SharedOrchestrator::new();
        let mut calls = 0;
        let first = shared
            .get_or_init(|| {
                calls += 1;
                Orchestrator::new(Arc::new(ReferenceEngine::new()))
            })
            .unwrap();
        let second = shared
            .get_or_init(|| Err(OrchestratorError::ShuttingDown))
            .unwrap();
        assert_eq!(calls, 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_failed_init_leaves_slot_empty() {
        let shared = SharedOrchestrator::default();
        assert!(shared
            .get_or_init(|| Err(OrchestratorError::ShuttingDown))
            .is_err());
        assert!(shared.get().is_none());
        assert!(shared.take().is_none());
    }

    #[test]
    fn test_take_allows_a_fresh_orchestrator() {
        let shared = SharedOrchestrator::new();
        let first = shared
            .get_or_init(|| Orchestrator::new(Arc::new(ReferenceEngine::new())))
            .unwrap();
        first.start().unwrap();

        let taken = shared.take().unwrap();
        assert!(Arc::ptr_eq(&first, &taken));
        taken.stop();
        assert!(shared.get().is_none());

        let second = shared
            .get_or_init(|| Orchestrator::new(Arc::new(ReferenceEngine::new())))
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.is_running());
    }
}
