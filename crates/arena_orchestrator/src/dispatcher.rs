//! # Session Dispatcher
//!
//! The session registry: session id → [`Session`], behind one read/write
//! lock.
//!
//! ```text
//!   create ───► write lock: reserve id ──► unlock ──► engine.create ──► write lock: insert
//!   destroy ──► write lock: remove ──────► unlock ──► engine.destroy
//!   input ────► read lock: clone entry ──► unlock ──► session lock ──► engine.submit
//! ```
//!
//! ## Rules
//!
//! - No engine call is made while the registry lock is held.
//! - `create` registers a session only after the engine accepted it. While
//!   the engine call is in flight the id is reserved: a second create of it
//!   is a duplicate, and input to it is not found.
//! - `destroy` always removes the entry, even when the engine call fails.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arena_engine::{EngineError, SimulationEngine};
use arena_protocol::{ContextCodec, Input, SessionEnv};
use parking_lot::{Mutex, RwLock};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::session::{Session, SessionController};

/// Outcome of [`Dispatcher::shutdown_all`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Sessions removed from the registry.
    pub removed: usize,
    /// Engine-side destroy failures, by session id.
    pub failures: Vec<(u64, EngineError)>,
}

impl ShutdownReport {
    /// True when every engine destroy succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Session registry capability.
pub trait Dispatcher: Send + Sync {
    /// Registers a new session.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::DuplicateSession`] if `session_id` is taken,
    /// or the engine's rejection.
    fn create(&self, session_id: u64, env: SessionEnv) -> OrchestratorResult<()>;

    /// Routes an input command to the session's controller.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::SessionNotFound`], or the controller's error.
    fn input(&self, session_id: u64, input: &Input) -> OrchestratorResult<()>;

    /// Removes a session.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::SessionNotFound`] only; engine failures are
    /// logged.
    fn destroy(&self, session_id: u64) -> OrchestratorResult<()>;

    /// Destroys every session and stops accepting new ones.
    fn shutdown_all(&self) -> ShutdownReport;

    /// Registered sessions.
    fn session_count(&self) -> usize;

    /// True if `session_id` is registered.
    fn contains(&self, session_id: u64) -> bool;
}

struct Registry {
    sessions: HashMap<u64, Arc<Mutex<Session>>>,
    /// Ids whose engine create is in flight. Never routable.
    pending: HashSet<u64>,
    accepting: bool,
}

/// The default [`Dispatcher`], backed by a [`SimulationEngine`].
pub struct SessionDispatcher {
    engine: Arc<dyn SimulationEngine>,
    codec: ContextCodec,
    input_capacity: usize,
    registry: RwLock<Registry>,
}

impl SessionDispatcher {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(
        engine: Arc<dyn SimulationEngine>,
        codec: ContextCodec,
        input_capacity: usize,
    ) -> Self {
        Self {
            engine,
            codec,
            input_capacity,
            registry: RwLock::new(Registry {
                sessions: HashMap::new(),
                pending: HashSet::new(),
                accepting: true,
            }),
        }
    }

    /// Ids of every registered session, ascending.
    #[must_use]
    pub fn session_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.registry.read().sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Creation parameters of a registered session.
    #[must_use]
    pub fn env(&self, session_id: u64) -> Option<SessionEnv> {
        let session = self.registry.read().sessions.get(&session_id).cloned()?;
        let env = session.lock().env().clone();
        Some(env)
    }

    fn wire_id(session_id: u64) -> OrchestratorResult<u32> {
        u32::try_from(session_id).map_err(|_| OrchestratorError::SessionIdOutOfRange(session_id))
    }
}

impl Dispatcher for SessionDispatcher {
    fn create(&self, session_id: u64, mut env: SessionEnv) -> OrchestratorResult<()> {
        let wire_id = Self::wire_id(session_id)?;

        {
            let mut registry = self.registry.write();
            if !registry.accepting {
                return Err(OrchestratorError::ShuttingDown);
            }
            if registry.sessions.contains_key(&session_id)
                || !registry.pending.insert(session_id)
            {
                return Err(OrchestratorError::DuplicateSession(session_id));
            }
        }

        let engine_result = self
            .engine
            .create_session(wire_id, env.atk_team(), env.def_team());

        let mut registry = self.registry.write();
        registry.pending.remove(&session_id);
        engine_result?;
        if !registry.accepting {
            // shutdown_all drained the registry while the engine call ran.
            drop(registry);
            if let Err(e) = self.engine.destroy_session(wire_id) {
                tracing::warn!(session_id, error = %e, "engine destroy of late create failed");
            }
            return Err(OrchestratorError::ShuttingDown);
        }

        env.session_id = wire_id;
        let controller = SessionController::new(
            wire_id,
            self.codec.clone(),
            self.engine.clone(),
            self.input_capacity,
        );
        registry.sessions.insert(
            session_id,
            Arc::new(Mutex::new(Session::new(session_id, env, controller))),
        );
        tracing::info!(session_id, "session created");
        Ok(())
    }

    fn input(&self, session_id: u64, input: &Input) -> OrchestratorResult<()> {
        let session = self
            .registry
            .read()
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or(OrchestratorError::SessionNotFound(session_id))?;

        let result = session.lock().submit_input(input);
        if let Err(e) = &result {
            tracing::debug!(session_id, variant = input.variant_name(), error = %e, "input rejected");
        }
        result
    }

    fn destroy(&self, session_id: u64) -> OrchestratorResult<()> {
        let session = self
            .registry
            .write()
            .sessions
            .remove(&session_id)
            .ok_or(OrchestratorError::SessionNotFound(session_id))?;
        // Waits for an in-flight submit on this session to finish.
        let wire_id = session.lock().wire_id();

        match self.engine.destroy_session(wire_id) {
            Ok(()) => tracing::info!(session_id, "session destroyed"),
            Err(e) => tracing::warn!(session_id, error = %e, "engine destroy failed, entry removed"),
        }
        Ok(())
    }

    fn shutdown_all(&self) -> ShutdownReport {
        let sessions: Vec<(u64, Arc<Mutex<Session>>)> = {
            let mut registry = self.registry.write();
            registry.accepting = false;
            registry.sessions.drain().collect()
        };
        let mut drained: Vec<(u64, u32)> = sessions
            .into_iter()
            .map(|(id, session)| (id, session.lock().wire_id()))
            .collect();
        drained.sort_unstable();

        let mut report = ShutdownReport {
            removed: drained.len(),
            failures: Vec::new(),
        };
        for (session_id, wire_id) in drained {
            if let Err(e) = self.engine.destroy_session(wire_id) {
                tracing::warn!(session_id, error = %e, "engine destroy failed during shutdown");
                report.failures.push((session_id, e));
            }
        }
        tracing::info!(
            removed = report.removed,
            failures = report.failures.len(),
            "all sessions shut down"
        );
        report
    }

    fn session_count(&self) -> usize {
        self.registry.read().sessions.len()
    }

    fn contains(&self, session_id: u64) -> bool {
        self.registry.read().sessions.contains_key(&session_id)
    }
}

impl std::fmt::Debug for SessionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("SessionDispatcher")
            .field("sessions", &registry.sessions.len())
            .field("accepting", &registry.accepting)
            .field("input_capacity", &self.input_capacity)
            .finish_non_exhaustive()
    }
}
