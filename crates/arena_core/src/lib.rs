//! # ARENA Core
//!
//! Leaf building blocks shared by every other ARENA crate:
//! - [`LogicalClock`]: wall time to logical frame numbers at a fixed rate
//! - [`TimeSource`]: injectable monotonic time, so frames are testable
//! - [`SessionIdGenerator`]: strictly increasing session ids
//!
//! ## Example
//!
//! ```rust
//! use arena_core::LogicalClock;
//!
//! let clock = LogicalClock::new(30);
//! assert!(clock.current_frame() < 30);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod clock;
pub mod ids;

pub use clock::{
    ClockState, FrameSource, LogicalClock, ManualTimeSource, SystemTimeSource, TimeSource, DEFAULT_FPS,
};
pub use ids::{SessionIdGenerator, DEFAULT_FIRST_SESSION_ID};
