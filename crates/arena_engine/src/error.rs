//! # Engine Error Types

use thiserror::Error;

/// The boundary call that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineOp {
    /// Engine start-up.
    Initialize,
    /// Engine teardown.
    Shutdown,
    /// Session creation.
    Create,
    /// Session destruction.
    Destroy,
    /// Input submission.
    Submit,
    /// Simulation tick.
    Tick,
    /// Result callback registration.
    RegisterCallback,
}

impl EngineOp {
    /// Name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Shutdown => "shutdown",
            Self::Create => "create",
            Self::Destroy => "destroy",
            Self::Submit => "submit",
            Self::Tick => "tick",
            Self::RegisterCallback => "register_callback",
        }
    }
}

impl std::fmt::Display for EngineOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported across the engine boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A call arrived before `initialize` or after `shutdown`.
    #[error("engine not initialized")]
    NotInitialized,

    /// `initialize` was called twice.
    #[error("engine already initialized")]
    AlreadyInitialized,

    /// The engine reported a failure code.
    #[error("engine {operation} failed with code {code}: {message}")]
    CallFailed {
        /// Which call failed.
        operation: EngineOp,
        /// Engine status code.
        code: i32,
        /// Engine message.
        message: String,
    },
}

impl EngineError {
    /// Shorthand for [`EngineError::CallFailed`].
    #[must_use]
    pub fn call_failed(operation: EngineOp, code: i32, message: impl Into<String>) -> Self {
        Self::CallFailed {
            operation,
            code,
            message: message.into(),
        }
    }

    /// Engine status code, if the engine reported one.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::CallFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type for engine calls.
pub type EngineResult<T> = Result<T, EngineError>;
