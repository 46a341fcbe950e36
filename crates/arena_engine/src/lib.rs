//! # ARENA Engine Boundary
//!
//! The orchestrator never looks inside the simulation engine. It drives it
//! through [`SimulationEngine`]:
//!
//! ```text
//! ┌──────────────┐  create / destroy / submit / tick   ┌──────────────┐
//! │ Orchestrator │ ──────────────────────────────────> │    Engine    │
//! │              │ <────────────────────────────────── │ (black box)  │
//! └──────────────┘     ResultCallback(&[u8] envelope)  └──────────────┘
//! ```
//!
//! [`ReferenceEngine`] is an in-process implementation with simple two-team
//! battle rules and fault injection, used by tests and the demo binary.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod boundary;
pub mod error;
pub mod reference;

pub use boundary::{ResultCallback, SimulationEngine};
pub use error::{EngineError, EngineOp, EngineResult};
pub use reference::{ReferenceConfig, ReferenceEngine, DEFAULT_SUBMISSION_LOG};
