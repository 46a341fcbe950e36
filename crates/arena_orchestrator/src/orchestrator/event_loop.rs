//! The single orchestrator loop.
//!
//! Waits on four sources at once and handles exactly one event per step:
//!
//! | Source          | Action                                         |
//! |-----------------|------------------------------------------------|
//! | create channel  | register a session, reply if asked             |
//! | event bus       | route input to its session, forward output     |
//! | tick timer      | advance the engine                             |
//! | stop signal     | exit                                           |
//!
//! Each step runs inside `catch_unwind`. A panic forces the orchestrator
//! to `Stopped` and tears sessions down instead of unwinding the thread.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arena_protocol::{context, Context, SessionEnv};
use crossbeam_channel::{never, select, tick, Receiver, Sender};

use super::{CreateCommand, LifecycleState, Shared, StatsCounters};
use crate::error::OrchestratorResult;

/// Channel ends created with the orchestrator and moved into the loop on
/// start.
pub(super) struct LoopParts {
    pub(super) create_rx: Receiver<CreateCommand>,
    pub(super) stop_rx: Receiver<()>,
    pub(super) out_tx: Sender<Context>,
}

enum Event {
    Create(Option<CreateCommand>),
    Envelope(Option<Context>),
    Tick,
    Stop,
}

enum Flow {
    Continue,
    Exit,
}

pub(super) struct EventLoop {
    shared: Arc<Shared>,
    create_rx: Receiver<CreateCommand>,
    bus_rx: Receiver<Context>,
    stop_rx: Receiver<()>,
    out_tx: Sender<Context>,
    ticker: Receiver<Instant>,
}

impl EventLoop {
    pub(super) fn new(shared: Arc<Shared>, parts: LoopParts, tick_interval: Duration) -> Self {
        let bus_rx = shared.bus.subscribe();
        Self {
            shared,
            create_rx: parts.create_rx,
            bus_rx,
            stop_rx: parts.stop_rx,
            out_tx: parts.out_tx,
            ticker: tick(tick_interval),
        }
    }

    pub(super) fn run(mut self) {
        tracing::debug!("orchestrator loop entered");
        loop {
            match panic::catch_unwind(AssertUnwindSafe(|| self.step())) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    let shared = &self.shared;
                    if panic::catch_unwind(AssertUnwindSafe(|| shared.contain_fault(message))).is_err() {
                        tracing::error!("teardown after loop fault panicked");
                    }
                    break;
                }
            }
        }
        tracing::debug!("orchestrator loop exited");
    }

    fn step(&mut self) -> Flow {
        let event = select! {
            recv(self.create_rx) -> command => Event::Create(command.ok()),
            recv(self.bus_rx) -> envelope => Event::Envelope(envelope.ok()),
            recv(self.ticker) -> _ => Event::Tick,
            recv(self.stop_rx) -> _ => Event::Stop,
        };

        match event {
            Event::Create(Some(command)) => self.handle_create(command),
            // Closed and drained: stop selecting on it.
            Event::Create(None) => self.create_rx = never(),
            Event::Envelope(Some(envelope)) => return self.handle_envelope(envelope),
            Event::Envelope(None) => self.bus_rx = never(),
            Event::Tick => self.handle_tick(),
            Event::Stop => return Flow::Exit,
        }
        Flow::Continue
    }

    // ========================================================================
    // HANDLERS
    // ========================================================================

    fn handle_create(&self, command: CreateCommand) {
        let CreateCommand {
            session_id,
            env,
            reply,
        } = command;

        let result = self.create_session(session_id, env);
        match &result {
            Ok(_) => StatsCounters::bump(&self.shared.stats.creates_ok),
            Err(e) => {
                StatsCounters::bump(&self.shared.stats.creates_failed);
                tracing::warn!(requested = session_id, error = %e, "create command failed");
            }
        }
        if let Some(reply) = reply {
            // The requester may have stopped waiting.
            let _ = reply.send(result);
        }
    }

    fn create_session(&self, requested: u64, env: SessionEnv) -> OrchestratorResult<u64> {
        let session_id = if requested == 0 {
            self.shared.ids.next_id()
        } else {
            requested
        };
        self.shared.dispatcher.create(session_id, env)?;
        Ok(session_id)
    }

    fn handle_envelope(&self, envelope: Context) -> Flow {
        let Context {
            session_id,
            frame,
            body,
        } = envelope;

        match body {
            Some(context::Body::Input(input)) if input.op.is_some() => {
                match self.shared.dispatcher.input(u64::from(session_id), &input) {
                    Ok(()) => StatsCounters::bump(&self.shared.stats.inputs_routed),
                    Err(e) => {
                        StatsCounters::bump(&self.shared.stats.inputs_failed);
                        tracing::warn!(session_id, frame, error = %e, "bus input not routed");
                    }
                }
                Flow::Continue
            }
            Some(context::Body::Output(output)) if output.event.is_some() => {
                self.forward_output(Context::with_output(session_id, frame, output))
            }
            _ => {
                StatsCounters::bump(&self.shared.stats.malformed_envelopes);
                tracing::warn!(session_id, frame, "envelope has neither input nor output, skipped");
                Flow::Continue
            }
        }
    }

    /// Blocks on a full output channel until the consumer reads or stop
    /// is signalled.
    fn forward_output(&self, envelope: Context) -> Flow {
        select! {
            send(self.out_tx, envelope) -> sent => {
                if sent.is_ok() {
                    StatsCounters::bump(&self.shared.stats.outputs_forwarded);
                } else {
                    tracing::debug!("output consumer gone, envelope discarded");
                }
                Flow::Continue
            }
            recv(self.stop_rx) -> _ => Flow::Exit,
        }
    }

    fn handle_tick(&self) {
        if self.shared.state() != LifecycleState::Running {
            return;
        }
        match self.shared.engine.tick() {
            Ok(advanced) => {
                StatsCounters::bump(&self.shared.stats.ticks);
                self.shared
                    .stats
                    .sessions_advanced
                    .fetch_add(advanced as u64, Ordering::Relaxed);
                tracing::debug!(advanced, sessions = self.shared.dispatcher.session_count(), "engine tick");
            }
            Err(e) => {
                StatsCounters::bump(&self.shared.stats.tick_errors);
                tracing::warn!(error = %e, "engine tick failed");
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_payloads() {
        let from_str = panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(from_str.as_ref()), "boom");

        let from_string = panic::catch_unwind(|| panic!("{} {}", "tick", 7)).unwrap_err();
        assert_eq!(panic_message(from_string.as_ref()), "tick 7");

        let opaque = panic::catch_unwind(|| std::panic::panic_any(42_u8)).unwrap_err();
        assert_eq!(panic_message(opaque.as_ref()), "unknown panic payload");
    }
}
