//! # Context Codec
//!
//! Builds and parses `Context` envelopes.
//!
//! ```text
//!   Input ──► build_input(session, frame) ──► FixedBuffer ──► engine
//!                                                               │
//!   Context ◄── parse_output(bytes) ◄──── callback bytes ◄──────┘
//! ```
//!
//! Outgoing input envelopes are stamped with the logical frame read from
//! the injected [`FrameSource`].

use std::sync::Arc;

use arena_core::FrameSource;
use prost::Message;

use crate::buffer::FixedBuffer;
use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::{Context, Input, Output};

/// Default capacity of a session's input buffer.
pub const INPUT_BUFFER_SIZE: usize = 512;

/// Default capacity of an output buffer.
pub const OUTPUT_BUFFER_SIZE: usize = 1024;

/// Envelope builder/parser bound to a frame source.
#[derive(Clone)]
pub struct ContextCodec {
    frames: Arc<dyn FrameSource>,
}

impl ContextCodec {
    /// Creates a codec stamping frames from `frames`.
    #[must_use]
    pub fn new(frames: Arc<dyn FrameSource>) -> Self {
        Self { frames }
    }

    /// Current frame of the underlying source.
    #[inline]
    #[must_use]
    pub fn current_frame(&self) -> u64 {
        self.frames.current_frame()
    }

    /// Builds an input envelope stamped with the current logical frame.
    ///
    /// # Errors
    ///
    /// See [`ContextCodec::build_input`].
    pub fn inject_input(
        &self,
        session_id: u32,
        input: &Input,
        buffer: &mut FixedBuffer,
    ) -> ProtocolResult<usize> {
        Self::build_input(session_id, self.current_frame(), input, buffer)
    }

    /// Serializes an input envelope into `buffer` at offset 0.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::UnsupportedVariant`] if `input` carries no command.
    /// - [`ProtocolError::ZeroCapacity`] / [`ProtocolError::CapacityExceeded`]
    ///   from the buffer; nothing is written in either case.
    pub fn build_input(
        session_id: u32,
        frame: u64,
        input: &Input,
        buffer: &mut FixedBuffer,
    ) -> ProtocolResult<usize> {
        if input.op.is_none() {
            buffer.clear();
            return Err(ProtocolError::UnsupportedVariant("input"));
        }
        buffer.write_message(&Context::with_input(session_id, frame, input.clone()))
    }

    /// Serializes an output envelope into `buffer` at offset 0.
    ///
    /// This is the engine-side mirror of [`ContextCodec::build_input`].
    ///
    /// # Errors
    ///
    /// Same as [`ContextCodec::build_input`].
    pub fn build_output(
        session_id: u32,
        frame: u64,
        output: &Output,
        buffer: &mut FixedBuffer,
    ) -> ProtocolResult<usize> {
        if output.event.is_none() {
            buffer.clear();
            return Err(ProtocolError::UnsupportedVariant("output"));
        }
        buffer.write_message(&Context::with_output(session_id, frame, output.clone()))
    }

    /// Encodes an output envelope into a fresh vector.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::UnsupportedVariant`] if `output` carries no event.
    pub fn encode_output(session_id: u32, frame: u64, output: Output) -> ProtocolResult<Vec<u8>> {
        if output.event.is_none() {
            return Err(ProtocolError::UnsupportedVariant("output"));
        }
        Ok(Context::with_output(session_id, frame, output).encode_to_vec())
    }

    /// Decodes one envelope handed back by the engine.
    ///
    /// The result is fully owned, so callers may return from the engine
    /// callback as soon as this does.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::EmptyOutput`] for zero bytes.
    /// - [`ProtocolError::DecodeFailure`] for malformed bytes.
    /// - [`ProtocolError::UnknownEnvelopeShape`] when neither an input nor
    ///   an output variant is populated.
    pub fn parse_output(bytes: &[u8]) -> ProtocolResult<Context> {
        if bytes.is_empty() {
            return Err(ProtocolError::EmptyOutput);
        }
        let envelope =
            Context::decode(bytes).map_err(|e| ProtocolError::DecodeFailure(e.to_string()))?;
        if envelope.kind().is_none() {
            return Err(ProtocolError::UnknownEnvelopeShape {
                session_id: envelope.session_id,
                frame: envelope.frame,
            });
        }
        Ok(envelope)
    }

    /// Decodes an envelope the engine received. Same rules as
    /// [`ContextCodec::parse_output`].
    ///
    /// # Errors
    ///
    /// Same as [`ContextCodec::parse_output`].
    pub fn parse_input(bytes: &[u8]) -> ProtocolResult<Context> {
        Self::parse_output(bytes)
    }
}

impl std::fmt::Debug for ContextCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextCodec")
            .field("frame", &self.current_frame())
            .finish()
    }
}
