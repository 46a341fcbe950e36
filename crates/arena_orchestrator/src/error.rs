//! # Orchestrator Error Types
//!
//! Errors returned synchronously to callers. Asynchronous bus drops are not
//! errors; see [`crate::bus::PublishOutcome`].

use arena_engine::EngineError;
use arena_protocol::ProtocolError;
use thiserror::Error;

use crate::orchestrator::LifecycleState;

/// Errors that can occur in the orchestration layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// A session with this id is already registered.
    #[error("duplicate session: {0}")]
    DuplicateSession(u64),

    /// No session with this id is registered.
    #[error("session not found: {0}")]
    SessionNotFound(u64),

    /// The id does not fit the 32-bit wire field.
    #[error("session id {0} does not fit in the envelope")]
    SessionIdOutOfRange(u64),

    /// The registry was shut down and accepts no new sessions.
    #[error("registry is shutting down")]
    ShuttingDown,

    /// Lifecycle call made in the wrong state.
    #[error("cannot {action} while {from}")]
    InvalidStateTransition {
        /// State at the time of the call.
        from: LifecycleState,
        /// The rejected call.
        action: &'static str,
    },

    /// The channel was closed by `stop`.
    #[error("channel closed")]
    ChannelClosed,

    /// The channel is at capacity.
    #[error("channel full")]
    ChannelFull,

    /// The loop thread could not be spawned.
    #[error("failed to spawn orchestrator loop: {0}")]
    LoopSpawn(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Envelope build or parse failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Engine boundary failure.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Result type for orchestration operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
