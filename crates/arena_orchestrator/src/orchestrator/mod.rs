//! # Orchestrator
//!
//! Owns session lifecycle and the single loop thread.
//!
//! ## State Machine
//!
//! ```text
//!            start()                 stop() / contained panic
//!  Created ──────────► Running ─────────────────────────────► Stopped
//!     │                                                      (terminal)
//!     └── start() fails: stays Created
//! ```
//!
//! ## Data Flow
//!
//! ```text
//!  CreateSender ──► create channel ──┐
//!                                    │
//!  engine callback ──► EventBus ─────┼──► loop ──► Dispatcher ──► engine
//!                                    │      │
//!  tick timer ───────────────────────┘      └──► output channel ──► consumer
//! ```
//!
//! ## Shutdown Order
//!
//! 1. State flips to `Stopped`, so nothing new is accepted.
//! 2. Every session is destroyed.
//! 3. The create channel and the bus are closed.
//! 4. The loop is signalled and joined.
//! 5. The engine is shut down.

mod builder;
mod event_loop;
mod handle;

pub use builder::OrchestratorBuilder;
pub use handle::SharedOrchestrator;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use arena_core::{LogicalClock, SessionIdGenerator};
use arena_engine::{ResultCallback, SimulationEngine};
use arena_protocol::{Context, ContextCodec, Input, SessionEnv};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};

use crate::bus::{BusStats, EventBus, PublishOutcome};
use crate::config::OrchestratorConfig;
use crate::dispatcher::{Dispatcher, ShutdownReport};
use crate::error::{OrchestratorError, OrchestratorResult};

use event_loop::{EventLoop, LoopParts};

/// Name of the loop thread.
pub const LOOP_THREAD_NAME: &str = "arena-orchestrator";

// ============================================================================
// LIFECYCLE
// ============================================================================

/// Orchestrator lifecycle.
///
/// ```text
/// Created ──start──► Running ──stop / loop fault──► Stopped
/// ```
///
/// `stop` outside `Running` is a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Built, not started. Creates queue but nothing drains them.
    Created,
    /// Loop thread running; the engine is initialized.
    Running,
    /// Terminal. Registry empty, channels closed, engine shut down.
    Stopped,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
        })
    }
}

// ============================================================================
// CREATE COMMANDS
// ============================================================================

/// Reply to a [`CreateCommand`]: the assigned id or the failure.
pub type CreateReply = OrchestratorResult<u64>;

/// Request to create a session, consumed once by the loop.
#[derive(Debug)]
pub struct CreateCommand {
    /// Requested id; `0` asks the loop to assign one.
    pub session_id: u64,
    /// Session parameters.
    pub env: SessionEnv,
    /// Where the loop reports the outcome, if anyone is listening.
    pub reply: Option<Sender<CreateReply>>,
}

impl CreateCommand {
    /// Fire-and-forget command.
    #[must_use]
    pub fn new(session_id: u64, env: SessionEnv) -> Self {
        Self {
            session_id,
            env,
            reply: None,
        }
    }

    /// Command plus the receiver its outcome will arrive on.
    #[must_use]
    pub fn with_reply(session_id: u64, env: SessionEnv) -> (Self, Receiver<CreateReply>) {
        let (reply, outcome) = bounded(1);
        (
            Self {
                session_id,
                env,
                reply: Some(reply),
            },
            outcome,
        )
    }
}

/// Send-only handle to the create channel.
///
/// Produced by: [`Orchestrator::create_sender`]
/// Consumed by: the loop thread, which drains commands in arrival order and
/// assigns ids for `session_id == 0`.
///
/// Clones share one slot. When the orchestrator stops, the slot is emptied
/// for every clone at once, so later sends fail with
/// [`OrchestratorError::ChannelClosed`] instead of queueing into a channel
/// nobody reads.
///
/// ```
/// use std::sync::Arc;
/// use arena_engine::ReferenceEngine;
/// use arena_orchestrator::{Orchestrator, OrchestratorError};
/// use arena_protocol::SessionEnv;
///
/// let orchestrator = Orchestrator::new(Arc::new(ReferenceEngine::new())).unwrap();
/// orchestrator.start().unwrap();
/// let creates = orchestrator.create_sender();
///
/// let id = creates.clone().create(0, SessionEnv::new(0, 1, 2)).unwrap();
/// assert!(orchestrator.contains_session(id));
///
/// orchestrator.stop();
/// assert!(creates.is_closed());
/// assert_eq!(
///     creates.create(0, SessionEnv::new(0, 1, 2)),
///     Err(OrchestratorError::ChannelClosed)
/// );
/// ```
#[derive(Clone)]
pub struct CreateSender {
    sender: Arc<RwLock<Option<Sender<CreateCommand>>>>,
}

impl CreateSender {
    fn new(sender: Sender<CreateCommand>) -> Self {
        Self {
            sender: Arc::new(RwLock::new(Some(sender))),
        }
    }

    fn current(&self) -> OrchestratorResult<Sender<CreateCommand>> {
        self.sender
            .read()
            .clone()
            .ok_or(OrchestratorError::ChannelClosed)
    }

    /// Queues a command, blocking while the channel is full.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::ChannelClosed`] after `stop`.
    pub fn send(&self, command: CreateCommand) -> OrchestratorResult<()> {
        self.current()?
            .send(command)
            .map_err(|_| OrchestratorError::ChannelClosed)
    }

    /// Queues a command without blocking.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::ChannelFull`] or [`OrchestratorError::ChannelClosed`].
    pub fn try_send(&self, command: CreateCommand) -> OrchestratorResult<()> {
        self.current()?.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => OrchestratorError::ChannelFull,
            TrySendError::Disconnected(_) => OrchestratorError::ChannelClosed,
        })
    }

    /// Queues a create and waits for the loop's answer.
    ///
    /// Blocks until the loop handles the command, so call it only on a
    /// started orchestrator.
    ///
    /// # Errors
    ///
    /// The creation failure, or [`OrchestratorError::ChannelClosed`] if
    /// the orchestrator stopped first.
    pub fn create(&self, session_id: u64, env: SessionEnv) -> OrchestratorResult<u64> {
        let (command, outcome) = CreateCommand::with_reply(session_id, env);
        self.send(command)?;
        outcome
            .recv()
            .map_err(|_| OrchestratorError::ChannelClosed)?
    }

    /// True after `stop`.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    fn close(&self) {
        self.sender.write().take();
    }
}

impl std::fmt::Debug for CreateSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateSender")
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Point-in-time copy of the orchestrator's counters.
///
/// Produced by: [`Orchestrator::stats`]
/// Updated by: the loop thread (ticks, creates, bus routing, faults) and
/// the engine callback (bus counters).
///
/// Counters are read one by one with relaxed ordering, so a snapshot taken
/// while the loop runs may mix values from adjacent steps. Every counter is
/// monotonic for the lifetime of the orchestrator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OrchestratorStats {
    /// Engine ticks driven.
    pub ticks: u64,
    /// Sum of sessions advanced over all ticks.
    pub sessions_advanced: u64,
    /// Failed engine ticks.
    pub tick_errors: u64,
    /// Create commands that registered a session.
    pub creates_ok: u64,
    /// Create commands that failed.
    pub creates_failed: u64,
    /// Bus input envelopes routed to a session.
    pub inputs_routed: u64,
    /// Bus input envelopes the dispatcher rejected.
    pub inputs_failed: u64,
    /// Output envelopes accepted by the output channel. An envelope the
    /// loop is still blocked on is not counted.
    pub outputs_forwarded: u64,
    /// Bus envelopes with neither input nor output populated.
    pub malformed_envelopes: u64,
    /// Panics contained at the loop boundary.
    pub loop_faults: u64,
    /// Bus counters.
    pub bus: BusStats,
}

#[derive(Default)]
struct StatsCounters {
    ticks: AtomicU64,
    sessions_advanced: AtomicU64,
    tick_errors: AtomicU64,
    creates_ok: AtomicU64,
    creates_failed: AtomicU64,
    inputs_routed: AtomicU64,
    inputs_failed: AtomicU64,
    outputs_forwarded: AtomicU64,
    malformed_envelopes: AtomicU64,
    loop_faults: AtomicU64,
}

impl StatsCounters {
    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, bus: BusStats) -> OrchestratorStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        OrchestratorStats {
            ticks: load(&self.ticks),
            sessions_advanced: load(&self.sessions_advanced),
            tick_errors: load(&self.tick_errors),
            creates_ok: load(&self.creates_ok),
            creates_failed: load(&self.creates_failed),
            inputs_routed: load(&self.inputs_routed),
            inputs_failed: load(&self.inputs_failed),
            outputs_forwarded: load(&self.outputs_forwarded),
            malformed_envelopes: load(&self.malformed_envelopes),
            loop_faults: load(&self.loop_faults),
            bus,
        }
    }
}

// ============================================================================
// SHARED STATE (handle + loop thread)
// ============================================================================

struct Shared {
    state: Mutex<LifecycleState>,
    engine: Arc<dyn SimulationEngine>,
    dispatcher: Arc<dyn Dispatcher>,
    bus: EventBus,
    creates: CreateSender,
    ids: SessionIdGenerator,
    stats: StatsCounters,
    engine_down: AtomicBool,
    last_fault: Mutex<Option<String>>,
}

impl Shared {
    fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    fn close_channels(&self) {
        self.creates.close();
        self.bus.close();
    }

    fn shutdown_engine(&self) {
        if self.engine_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.engine.shutdown() {
            tracing::warn!(error = %e, "engine shutdown failed");
        }
    }

    /// Forces `Stopped` after a panic in the loop body.
    fn contain_fault(&self, message: String) {
        tracing::error!(panic = %message, "orchestrator loop panicked, forcing stop");
        StatsCounters::bump(&self.stats.loop_faults);
        *self.last_fault.lock() = Some(message);

        let was_running = {
            let mut state = self.state.lock();
            let previous = *state;
            *state = LifecycleState::Stopped;
            previous == LifecycleState::Running
        };
        self.close_channels();

        // A concurrent stop() owns teardown otherwise.
        if was_running {
            let report = self.dispatcher.shutdown_all();
            if !report.is_clean() {
                tracing::warn!(failures = report.failures.len(), "teardown after fault had engine failures");
            }
            self.shutdown_engine();
        }
    }
}

/// Engine callback body: decode, then hand to the bus.
fn route_engine_output(bus: &EventBus, bytes: &[u8]) {
    match ContextCodec::parse_output(bytes) {
        Ok(envelope) => {
            if bus.publish(envelope) == PublishOutcome::Closed {
                tracing::debug!("engine output after bus closed, ignored");
            }
        }
        Err(e) => tracing::warn!(error = %e, len = bytes.len(), "discarding undecodable engine output"),
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// The session orchestrator.
///
/// Construct with [`Orchestrator::builder`]. Dropping a running
/// orchestrator stops it.
pub struct Orchestrator {
    shared: Arc<Shared>,
    clock: Arc<LogicalClock>,
    config: OrchestratorConfig,
    outputs: Receiver<Context>,
    parts: Mutex<Option<LoopParts>>,
    stop_signal: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Returns a builder with default configuration and no engine.
    ///
    /// [`OrchestratorBuilder::with_engine`] must be called before
    /// [`OrchestratorBuilder::build`].
    #[must_use]
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Orchestrator with default configuration over `engine`.
    ///
    /// # Errors
    ///
    /// Never with the default configuration; see [`OrchestratorBuilder::build`].
    pub fn new(engine: Arc<dyn SimulationEngine>) -> OrchestratorResult<Self> {
        Self::builder().with_engine(engine).build()
    }

    fn assemble(
        config: OrchestratorConfig,
        engine: Arc<dyn SimulationEngine>,
        dispatcher: Arc<dyn Dispatcher>,
        clock: Arc<LogicalClock>,
        bus: EventBus,
    ) -> Self {
        let (create_tx, create_rx) = bounded(config.create_capacity);
        let (out_tx, outputs) = bounded(config.output_capacity);
        let (stop_tx, stop_rx) = bounded(1);

        let shared = Arc::new(Shared {
            state: Mutex::new(LifecycleState::Created),
            engine,
            dispatcher,
            bus,
            creates: CreateSender::new(create_tx),
            ids: SessionIdGenerator::new(config.first_session_id),
            stats: StatsCounters::default(),
            engine_down: AtomicBool::new(false),
            last_fault: Mutex::new(None),
        });

        Self {
            shared,
            clock,
            config,
            outputs,
            parts: Mutex::new(Some(LoopParts {
                create_rx,
                stop_rx,
                out_tx,
            })),
            stop_signal: Mutex::new(Some(stop_tx)),
            handle: Mutex::new(None),
        }
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// `Created → Running`: initializes the engine, registers the result
    /// callback, then launches the loop thread.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::InvalidStateTransition`] outside `Created`.
    /// - The engine's initialize or registration failure (state stays
    ///   `Created`).
    /// - [`OrchestratorError::LoopSpawn`] if the thread cannot start
    ///   (state becomes `Stopped`).
    pub fn start(&self) -> OrchestratorResult<()> {
        let mut state = self.shared.state.lock();
        if *state != LifecycleState::Created {
            return Err(OrchestratorError::InvalidStateTransition {
                from: *state,
                action: "start",
            });
        }

        self.shared.engine.initialize()?;

        let bus = self.shared.bus.clone();
        let callback: ResultCallback = Arc::new(move |bytes: &[u8]| route_engine_output(&bus, bytes));
        if let Err(e) = self.shared.engine.register_result_callback(callback) {
            if let Err(down) = self.shared.engine.shutdown() {
                tracing::warn!(error = %down, "engine shutdown after failed registration");
            }
            return Err(e.into());
        }

        let Some(parts) = self.parts.lock().take() else {
            return Err(OrchestratorError::InvalidStateTransition {
                from: *state,
                action: "start",
            });
        };
        let event_loop = EventLoop::new(self.shared.clone(), parts, self.config.tick_interval());

        *state = LifecycleState::Running;
        let spawned = thread::Builder::new()
            .name(LOOP_THREAD_NAME.to_owned())
            .spawn(move || event_loop.run());
        match spawned {
            Ok(handle) => *self.handle.lock() = Some(handle),
            Err(e) => {
                *state = LifecycleState::Stopped;
                drop(state);
                self.shared.close_channels();
                self.shared.shutdown_engine();
                return Err(OrchestratorError::LoopSpawn(e.to_string()));
            }
        }
        drop(state);

        tracing::info!(
            fps = self.clock.fps(),
            tick_interval_ms = self.config.tick_interval_ms,
            bus_capacity = self.shared.bus.capacity(),
            "orchestrator started"
        );
        Ok(())
    }

    /// `Running → Stopped`. A no-op in any other state.
    ///
    /// Returns once the loop has exited and the engine is shut down.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            if *state != LifecycleState::Running {
                return;
            }
            *state = LifecycleState::Stopped;
        }
        tracing::info!("orchestrator stopping");

        let report: ShutdownReport = self.shared.dispatcher.shutdown_all();
        self.shared.close_channels();
        drop(self.stop_signal.lock().take());
        self.join_loop();
        self.shared.shutdown_engine();

        tracing::info!(
            removed = report.removed,
            engine_failures = report.failures.len(),
            "orchestrator stopped"
        );
    }

    fn join_loop(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        // stop() from the loop thread itself: it exits on its next select.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!("orchestrator loop thread panicked outside containment");
        }
    }

    /// True while `Running`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.state() == LifecycleState::Running
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.shared.state()
    }

    /// Message of the last panic contained at the loop boundary.
    #[must_use]
    pub fn last_fault(&self) -> Option<String> {
        self.shared.last_fault.lock().clone()
    }

    // ========================================================================
    // API SURFACE
    // ========================================================================

    /// Send-only handle to the create channel. Stays valid after `stop`,
    /// reporting [`OrchestratorError::ChannelClosed`].
    #[must_use]
    pub fn create_sender(&self) -> CreateSender {
        self.shared.creates.clone()
    }

    /// Receive-only handle to finished output envelopes.
    ///
    /// The channel is bounded by `output_capacity`. A consumer that stops
    /// reading stalls the loop, but never `stop`. After `stop` the receiver
    /// yields what was already forwarded, then reports disconnection.
    #[must_use]
    pub fn outputs(&self) -> Receiver<Context> {
        self.outputs.clone()
    }

    /// Routes an input command to a session from the calling thread.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::SessionNotFound`], or the controller's error.
    pub fn input(&self, session_id: u64, input: &Input) -> OrchestratorResult<()> {
        self.shared.dispatcher.input(session_id, input)
    }

    /// Queues an input command on the bus for the loop to route.
    ///
    /// Never blocks; a full bus drops the command and says so.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::SessionIdOutOfRange`] for ids past `u32::MAX`.
    pub fn publish_input(&self, session_id: u64, input: Input) -> OrchestratorResult<PublishOutcome> {
        let wire_id = u32::try_from(session_id)
            .map_err(|_| OrchestratorError::SessionIdOutOfRange(session_id))?;
        let envelope = Context::with_input(wire_id, self.clock.current_frame(), input);
        Ok(self.shared.bus.publish(envelope))
    }

    /// Destroys a session from the calling thread.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::SessionNotFound`].
    pub fn destroy(&self, session_id: u64) -> OrchestratorResult<()> {
        self.shared.dispatcher.destroy(session_id)
    }

    /// Registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.shared.dispatcher.session_count()
    }

    /// True if `session_id` is registered.
    #[must_use]
    pub fn contains_session(&self, session_id: u64) -> bool {
        self.shared.dispatcher.contains(session_id)
    }

    /// The event bus the engine callback publishes to.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.shared.bus
    }

    /// The logical clock stamping input frames.
    #[must_use]
    pub fn clock(&self) -> &Arc<LogicalClock> {
        &self.clock
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Snapshot of the loop and bus counters. See [`OrchestratorStats`].
    #[must_use]
    pub fn stats(&self) -> OrchestratorStats {
        self.shared.stats.snapshot(self.shared.bus.stats())
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.stop();
        self.join_loop();
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state())
            .field("sessions", &self.session_count())
            .field("bus", &self.shared.bus)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_engine::{EngineOp, ReferenceEngine};
    use std::time::Duration;

    fn orchestrator(engine: &Arc<ReferenceEngine>) -> Orchestrator {
        Orchestrator::builder()
            .with_engine(engine.clone())
            .with_tick_interval(Duration::from_millis(10))
            .build()
            .unwrap()
    }

    #[test]
    fn test_double_start_is_invalid() {
        let engine = Arc::new(ReferenceEngine::new());
        let orchestrator = orchestrator(&engine);
        orchestrator.start().unwrap();
        assert_eq!(
            orchestrator.start(),
            Err(OrchestratorError::InvalidStateTransition {
                from: LifecycleState::Running,
                action: "start",
            })
        );
        orchestrator.stop();
        assert!(matches!(
            orchestrator.start(),
            Err(OrchestratorError::InvalidStateTransition {
                from: LifecycleState::Stopped,
                ..
            })
        ));
    }

    #[test]
    fn test_stop_outside_running_is_noop() {
        let engine = Arc::new(ReferenceEngine::new());
        let orchestrator = orchestrator(&engine);
        orchestrator.stop();
        assert_eq!(orchestrator.state(), LifecycleState::Created);
        assert!(!orchestrator.create_sender().is_closed());

        orchestrator.start().unwrap();
        orchestrator.stop();
        orchestrator.stop();
        assert_eq!(orchestrator.state(), LifecycleState::Stopped);
        assert!(!engine.is_initialized());
    }

    #[test]
    fn test_failed_engine_init_stays_created() {
        let engine = Arc::new(ReferenceEngine::new());
        engine.fail_next(EngineOp::Initialize);
        let orchestrator = orchestrator(&engine);
        assert!(matches!(
            orchestrator.start(),
            Err(OrchestratorError::Engine(_))
        ));
        assert_eq!(orchestrator.state(), LifecycleState::Created);

        orchestrator.start().unwrap();
        assert!(orchestrator.is_running());
    }

    #[test]
    fn test_create_sender_closed_after_stop() {
        let engine = Arc::new(ReferenceEngine::new());
        let orchestrator = orchestrator(&engine);
        let creates = orchestrator.create_sender();
        orchestrator.start().unwrap();
        orchestrator.stop();

        assert!(creates.is_closed());
        assert_eq!(
            creates.send(CreateCommand::new(1, SessionEnv::default())),
            Err(OrchestratorError::ChannelClosed)
        );
        assert!(orchestrator.bus().is_closed());
    }

    #[test]
    fn test_publish_input_rejects_wide_ids() {
        let engine = Arc::new(ReferenceEngine::new());
        let orchestrator = orchestrator(&engine);
        let too_big = u64::from(u32::MAX) + 1;
        assert_eq!(
            orchestrator.publish_input(too_big, Input::default()),
            Err(OrchestratorError::SessionIdOutOfRange(too_big))
        );
    }

    #[test]
    fn test_lifecycle_display() {
        assert_eq!(LifecycleState::Running.to_string(), "running");
        let err = OrchestratorError::InvalidStateTransition {
            from: LifecycleState::Stopped,
            action: "start",
        };
        assert_eq!(err.to_string(), "cannot start while stopped");
    }
}
