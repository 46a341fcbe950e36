//! # Engine Boundary
//!
//! Everything the orchestrator needs from a simulation engine, and nothing
//! more. Implementations must be callable from any thread.

use std::sync::Arc;

use arena_protocol::BufferView;

use crate::error::EngineResult;

/// Invoked by the engine, from an engine-owned thread, with one serialized
/// envelope.
///
/// The slice is only valid for the duration of the call; receivers must
/// decode or copy it before returning.
pub type ResultCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// The external simulation engine.
///
/// Calls may block and may be slow. Apart from `tick`, which the
/// orchestrator loop drives, they are made from the caller's thread.
pub trait SimulationEngine: Send + Sync {
    /// Brings the engine up. Called once, before anything else.
    ///
    /// # Errors
    ///
    /// Any engine-side start-up failure.
    fn initialize(&self) -> EngineResult<()>;

    /// Tears the engine down. Called once, last.
    ///
    /// # Errors
    ///
    /// Any engine-side teardown failure.
    fn shutdown(&self) -> EngineResult<()>;

    /// Creates a session with two opaque team references.
    ///
    /// # Errors
    ///
    /// Engine-side rejection (for example an id the engine already holds).
    fn create_session(&self, session_id: u32, atk_team: u32, def_team: u32) -> EngineResult<()>;

    /// Destroys a session.
    ///
    /// # Errors
    ///
    /// Engine-side rejection (for example an unknown id).
    fn destroy_session(&self, session_id: u32) -> EngineResult<()>;

    /// Hands over one serialized input envelope.
    ///
    /// The engine reads `input` and must not retain it.
    ///
    /// # Errors
    ///
    /// Engine-side rejection of the envelope.
    fn submit(&self, input: BufferView<'_>) -> EngineResult<()>;

    /// Advances every live session by one step.
    ///
    /// Returns the number of sessions processed.
    ///
    /// # Errors
    ///
    /// Engine-side tick failure.
    fn tick(&self) -> EngineResult<usize>;

    /// Registers the sink for engine output envelopes. Replaces any
    /// previous registration.
    ///
    /// # Errors
    ///
    /// Engine-side registration failure.
    fn register_result_callback(&self, callback: ResultCallback) -> EngineResult<()>;

    /// Sessions the engine currently holds.
    fn session_count(&self) -> usize;
}
