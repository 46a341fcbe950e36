//! # Sessions
//!
//! A [`Session`] is one registered battle. Its [`SessionController`] owns
//! the pre-allocated input buffer and is the only path from a caller's
//! input command to the engine's `submit`.
//!
//! ```text
//!   Input ──► ContextCodec::inject_input ──► input_buffer ──► engine.submit(view)
//! ```

use std::sync::Arc;

use arena_engine::SimulationEngine;
use arena_protocol::{ContextCodec, FixedBuffer, Input, SessionEnv};

use crate::error::OrchestratorResult;

/// Per-session boundary driver.
///
/// Never shared across sessions. Submissions are serialized by whoever
/// owns the controller; it adds no locking of its own.
pub struct SessionController {
    session_id: u32,
    codec: ContextCodec,
    engine: Arc<dyn SimulationEngine>,
    input_buffer: FixedBuffer,
}

impl SessionController {
    /// Creates a controller with an input buffer of `input_capacity` bytes.
    #[must_use]
    pub fn new(
        session_id: u32,
        codec: ContextCodec,
        engine: Arc<dyn SimulationEngine>,
        input_capacity: usize,
    ) -> Self {
        Self {
            session_id,
            codec,
            engine,
            input_buffer: FixedBuffer::new(input_capacity),
        }
    }

    /// Session this controller drives.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Capacity of the input buffer.
    #[inline]
    #[must_use]
    pub fn input_capacity(&self) -> usize {
        self.input_buffer.capacity()
    }

    /// Serializes `input` stamped with the current frame and hands it to
    /// the engine.
    ///
    /// # Errors
    ///
    /// - [`crate::OrchestratorError::Protocol`] if the input carries no
    ///   command or does not fit the buffer. The engine is not called.
    /// - [`crate::OrchestratorError::Engine`] if the engine rejects it.
    pub fn submit_input(&mut self, input: &Input) -> OrchestratorResult<()> {
        self.codec
            .inject_input(self.session_id, input, &mut self.input_buffer)?;
        self.engine.submit(self.input_buffer.view())?;
        Ok(())
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("session_id", &self.session_id)
            .field("input_capacity", &self.input_capacity())
            .finish_non_exhaustive()
    }
}

/// A registered session.
#[derive(Debug)]
pub struct Session {
    id: u64,
    env: SessionEnv,
    controller: SessionController,
}

impl Session {
    /// Bundles a session id, its parameters and its controller.
    #[must_use]
    pub fn new(id: u64, env: SessionEnv, controller: SessionController) -> Self {
        Self {
            id,
            env,
            controller,
        }
    }

    /// Session id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Id as carried on the wire.
    #[inline]
    #[must_use]
    pub fn wire_id(&self) -> u32 {
        self.controller.session_id()
    }

    /// Creation parameters.
    #[inline]
    #[must_use]
    pub fn env(&self) -> &SessionEnv {
        &self.env
    }

    /// Forwards to [`SessionController::submit_input`].
    ///
    /// # Errors
    ///
    /// See [`SessionController::submit_input`].
    pub fn submit_input(&mut self, input: &Input) -> OrchestratorResult<()> {
        self.controller.submit_input(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrchestratorError;
    use arena_core::LogicalClock;
    use arena_engine::{EngineOp, ReferenceEngine};
    use arena_protocol::{input, ProtocolError, UseItem};

    fn controller(engine: &Arc<ReferenceEngine>, capacity: usize) -> SessionController {
        let codec = ContextCodec::new(Arc::new(LogicalClock::new(30)));
        SessionController::new(1000, codec, engine.clone(), capacity)
    }

    fn ready_engine() -> Arc<ReferenceEngine> {
        let engine = Arc::new(ReferenceEngine::new());
        engine.initialize().unwrap();
        engine.create_session(1000, 100, 101).unwrap();
        engine
    }

    #[test]
    fn test_submit_reaches_engine() {
        let engine = ready_engine();
        let mut controller = controller(&engine, 512);
        let item = UseItem {
            team_id: 100,
            item_id: 9,
            target_id: 101,
        };
        controller.submit_input(&item.clone().into()).unwrap();

        let submissions = engine.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].session_id, 1000);
        assert_eq!(
            submissions[0].as_input().and_then(|i| i.op.clone()),
            Some(input::Op::UseItem(item))
        );
    }

    #[test]
    fn test_oversized_input_never_reaches_engine() {
        let engine = ready_engine();
        let mut controller = controller(&engine, 4);
        let err = controller
            .submit_input(&arena_protocol::Pause { team_id: 1 }.into())
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Protocol(ProtocolError::CapacityExceeded { capacity: 4, .. })
        ));
        assert!(engine.submissions().is_empty());
    }

    #[test]
    fn test_engine_rejection_is_returned() {
        let engine = ready_engine();
        engine.fail_next(EngineOp::Submit);
        let mut controller = controller(&engine, 512);
        let err = controller
            .submit_input(&arena_protocol::Resume { team_id: 1 }.into())
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Engine(_)));
    }

    #[test]
    fn test_session_accessors() {
        let engine = ready_engine();
        let session = Session::new(1000, SessionEnv::new(1000, 100, 101), controller(&engine, 64));
        assert_eq!(session.id(), 1000);
        assert_eq!(session.env().def_team(), 101);
    }
}
