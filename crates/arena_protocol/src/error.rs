//! # Protocol Error Types
//!
//! Everything that can go wrong building or parsing an envelope.

use thiserror::Error;

/// Errors raised by the codec and the fixed buffers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The message carried no oneof variant the codec knows how to send.
    #[error("unsupported {0} variant")]
    UnsupportedVariant(&'static str),

    /// The serialized message is larger than the destination buffer.
    #[error("buffer capacity exceeded: need {required} bytes, capacity {capacity}")]
    CapacityExceeded {
        /// Bytes the message needs.
        required: usize,
        /// Bytes the buffer can hold.
        capacity: usize,
    },

    /// The destination buffer was declared with zero capacity.
    #[error("buffer has zero capacity")]
    ZeroCapacity,

    /// The engine handed back zero bytes.
    #[error("empty output")]
    EmptyOutput,

    /// The bytes are not a valid envelope.
    #[error("decode failure: {0}")]
    DecodeFailure(String),

    /// The encoder rejected the message.
    #[error("encode failure: {0}")]
    EncodeFailure(String),

    /// Decoded, but the body is neither a populated input nor output.
    #[error("unknown envelope shape (session {session_id}, frame {frame})")]
    UnknownEnvelopeShape {
        /// Session id carried by the envelope.
        session_id: u32,
        /// Frame carried by the envelope.
        frame: u64,
    },
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
