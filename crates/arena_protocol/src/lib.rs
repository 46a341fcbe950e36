//! # ARENA Protocol
//!
//! The only format that crosses the engine boundary: a `Context` envelope
//! carrying a session id, a logical frame and exactly one of an input
//! command or an output event.
//!
//! ## Wire Format
//!
//! ```text
//! Context
//! ├── session_id : uint32
//! ├── frame      : uint64
//! └── body (oneof)
//!     ├── Input  (oneof) UseItem | Pause | Resume | UserOp
//!     └── Output (oneof) BattleResult | Replay
//! ```
//!
//! Encoding is protobuf, so any implementation of the same schema reads
//! and writes the same bytes.
//!
//! ## Buffer Hand-off
//!
//! Writers serialize into a caller-owned [`FixedBuffer`]. A message that
//! does not fit fails with [`ProtocolError::CapacityExceeded`] before any
//! byte is written; nothing is ever truncated.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod buffer;
pub mod codec;
pub mod error;
pub mod messages;

pub use buffer::{BufferView, FixedBuffer};
pub use codec::{ContextCodec, INPUT_BUFFER_SIZE, OUTPUT_BUFFER_SIZE};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    context, input, output, BattleResult, Context, EnvelopeKind, Input, Output, Pause, Replay,
    ReplayEvent, Resume, SessionEnv, Team, UseItem, UserOp,
};
