//! # ARENA Orchestrator
//!
//! Runs battle sessions against a [`SimulationEngine`](arena_engine::SimulationEngine)
//! on one dedicated loop thread.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           ORCHESTRATOR                              │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  CreateSender ──► create channel ─┐                                 │
//! │                                   ▼                                 │
//! │  engine callback ──► EventBus ──► LOOP ◄── tick timer               │
//! │                                   │                                 │
//! │              ┌────────────────────┼────────────────┐                │
//! │              ▼                    ▼                ▼                │
//! │        SessionDispatcher    output channel    engine.tick()         │
//! │              │                                                      │
//! │        SessionController ──► FixedBuffer ──► engine.submit()        │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Producers never block on the bus; a full queue drops the newest event.
//! - After `stop` returns the registry is empty, both channels are closed
//!   and the engine is shut down.
//! - A panic inside the loop is contained and forces `Stopped`.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use arena_engine::ReferenceEngine;
//! use arena_orchestrator::Orchestrator;
//! use arena_protocol::SessionEnv;
//!
//! let orchestrator = Orchestrator::new(Arc::new(ReferenceEngine::new())).unwrap();
//! orchestrator.start().unwrap();
//!
//! let id = orchestrator
//!     .create_sender()
//!     .create(0, SessionEnv::new(0, 100, 101))
//!     .unwrap();
//! let first = orchestrator.outputs().recv().unwrap();
//! assert_eq!(u64::from(first.session_id), id);
//!
//! orchestrator.stop();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod session;

pub use bus::{BusStats, DropKind, EventBus, PublishOutcome};
pub use config::{
    OrchestratorConfig, DEFAULT_BUS_CAPACITY, DEFAULT_CREATE_CAPACITY, DEFAULT_OUTPUT_CAPACITY,
    DEFAULT_TICK_INTERVAL_MS,
};
pub use dispatcher::{Dispatcher, SessionDispatcher, ShutdownReport};
pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{
    CreateCommand, CreateReply, CreateSender, LifecycleState, Orchestrator, OrchestratorBuilder,
    OrchestratorStats, SharedOrchestrator, LOOP_THREAD_NAME,
};
pub use session::{Session, SessionController};
