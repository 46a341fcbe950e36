//! # Fixed Buffers
//!
//! Pre-allocated byte regions for the engine hand-off.
//!
//! ```text
//!   FixedBuffer (capacity C, allocated once)
//!   ┌────────────────────────┬──────────────────┐
//!   │ written bytes (n <= C) │  stale / unused  │
//!   └────────────────────────┴──────────────────┘
//!    └── BufferView { bytes: &[..n], capacity: C }
//! ```
//!
//! A write either fits entirely or fails. A failed write leaves the stored
//! bytes untouched and marks the buffer empty, so a stale payload can never
//! be handed to the engine by mistake.

use crate::error::{ProtocolError, ProtocolResult};
use prost::Message;

/// Caller-owned byte region with a declared maximum length.
///
/// Allocated once at construction; writes reuse the same storage.
#[derive(Debug)]
pub struct FixedBuffer {
    storage: Box<[u8]>,
    written: usize,
}

impl FixedBuffer {
    /// Allocates a buffer of `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            written: 0,
        }
    }

    /// Declared maximum length.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Length of the last successful write (0 after a failed write).
    #[inline]
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    /// True when no valid payload is held.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// The valid payload.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.storage[..self.written]
    }

    /// Borrowed view of the valid payload for the boundary call.
    #[inline]
    #[must_use]
    pub fn view(&self) -> BufferView<'_> {
        BufferView {
            bytes: self.as_bytes(),
            capacity: self.capacity(),
        }
    }

    /// Marks the buffer empty. Storage is kept.
    #[inline]
    pub fn clear(&mut self) {
        self.written = 0;
    }

    /// Serializes `message` at offset 0.
    ///
    /// Returns the exact number of bytes written.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::ZeroCapacity`] for a zero-length buffer.
    /// - [`ProtocolError::CapacityExceeded`] when the encoding is larger
    ///   than the buffer. Nothing is written.
    pub fn write_message<M: Message>(&mut self, message: &M) -> ProtocolResult<usize> {
        self.written = 0;

        let capacity = self.capacity();
        if capacity == 0 {
            return Err(ProtocolError::ZeroCapacity);
        }

        let required = message.encoded_len();
        if required > capacity {
            return Err(ProtocolError::CapacityExceeded { required, capacity });
        }

        let mut dst: &mut [u8] = &mut self.storage[..required];
        message
            .encode(&mut dst)
            .map_err(|e| ProtocolError::EncodeFailure(e.to_string()))?;

        self.written = required;
        Ok(required)
    }
}

/// Borrowed bytes with their declared capacity.
///
/// Only produced by [`FixedBuffer::view`]; the engine reads it and must not
/// keep it past the call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferView<'a> {
    bytes: &'a [u8],
    capacity: usize,
}

impl<'a> BufferView<'a> {
    /// The written bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Number of written bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when nothing was written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Declared capacity of the underlying buffer.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
