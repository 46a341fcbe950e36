//! # Bounded Event Bus
//!
//! Carries envelopes from any number of producers (engine callback, API
//! callers) to the single orchestrator loop.
//!
//! ```text
//!   engine callback ──┐
//!   API caller ───────┼──► publish ──► [ bounded queue ] ──► loop (subscribe)
//!   API caller ───────┘       │
//!                             └── full? drop the NEW event, warn, count
//! ```
//!
//! ## Backpressure
//!
//! `publish` never blocks. When the queue is full the incoming event is
//! dropped (already-queued events keep their place), the drop is logged
//! tagged with the event kind, and a counter is bumped. After [`EventBus::close`]
//! every publish is a silent no-op.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arena_protocol::{Context, EnvelopeKind};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;

/// What kind of event a full queue dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DropKind {
    /// A player action was lost.
    Input,
    /// A simulation result or replay was lost.
    Output,
    /// An envelope with no recognizable body was lost.
    Unknown,
}

impl DropKind {
    fn of(envelope: &Context) -> Self {
        match envelope.kind() {
            Some(EnvelopeKind::Input) => Self::Input,
            Some(EnvelopeKind::Output) => Self::Output,
            None => Self::Unknown,
        }
    }

    /// Name used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Unknown => "unknown",
        }
    }
}

/// Result of a publish. Never an error: there is no caller to hand a
/// drop back to at drop time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub enum PublishOutcome {
    /// Queued.
    Delivered,
    /// Queue full; the event was discarded.
    Dropped(DropKind),
    /// Bus closed; the event was ignored.
    Closed,
}

/// Point-in-time copy of the bus counters.
///
/// Produced by: [`EventBus::stats`], and embedded in the orchestrator's
/// own stats snapshot.
/// Updated by: every publisher, from whichever thread publishes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Events queued.
    pub published: u64,
    /// Input envelopes dropped on a full queue.
    pub dropped_inputs: u64,
    /// Output envelopes dropped on a full queue.
    pub dropped_outputs: u64,
    /// Shapeless envelopes dropped on a full queue.
    pub dropped_unknown: u64,
}

impl BusStats {
    /// All drops.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped_inputs + self.dropped_outputs + self.dropped_unknown
    }
}

struct BusInner {
    /// `None` once closed. Guards the closed flag.
    sender: RwLock<Option<Sender<Context>>>,
    receiver: Receiver<Context>,
    capacity: usize,
    published: AtomicU64,
    dropped_inputs: AtomicU64,
    dropped_outputs: AtomicU64,
    dropped_unknown: AtomicU64,
}

/// Bounded multi-producer, single-consumer envelope queue.
///
/// Published to by: the engine result callback (outputs) and
/// `Orchestrator::publish_input` (inputs).
/// Drained by: the orchestrator loop thread only.
///
/// Publishing never blocks; a full queue drops the newest event and counts
/// it by kind. Clones share the same queue.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates a bus holding at most `capacity` events.
    ///
    /// A zero capacity is raised to 1: a rendezvous channel would make
    /// every `try_send` fail.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            inner: Arc::new(BusInner {
                sender: RwLock::new(Some(sender)),
                receiver,
                capacity,
                published: AtomicU64::new(0),
                dropped_inputs: AtomicU64::new(0),
                dropped_outputs: AtomicU64::new(0),
                dropped_unknown: AtomicU64::new(0),
            }),
        }
    }

    /// Queues `event` without blocking.
    pub fn publish(&self, event: Context) -> PublishOutcome {
        let guard = self.inner.sender.read();
        let Some(sender) = guard.as_ref() else {
            return PublishOutcome::Closed;
        };

        match sender.try_send(event) {
            Ok(()) => {
                self.inner.published.fetch_add(1, Ordering::Relaxed);
                PublishOutcome::Delivered
            }
            Err(TrySendError::Full(event)) => {
                let kind = DropKind::of(&event);
                self.count_drop(kind);
                tracing::warn!(
                    kind = kind.as_str(),
                    session_id = event.session_id,
                    frame = event.frame,
                    capacity = self.inner.capacity,
                    "event bus full, dropping newest event"
                );
                PublishOutcome::Dropped(kind)
            }
            // The bus owns its receiver, so this only happens mid-teardown.
            Err(TrySendError::Disconnected(_)) => PublishOutcome::Closed,
        }
    }

    /// Receive side for the single consumer.
    ///
    /// After [`close`](Self::close) the receiver drains what is left and
    /// then reports disconnection.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<Context> {
        self.inner.receiver.clone()
    }

    /// Stops accepting events. Idempotent.
    pub fn close(&self) {
        if self.inner.sender.write().take().is_some() {
            tracing::debug!("event bus closed");
        }
    }

    /// True after [`close`](Self::close).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.sender.read().is_none()
    }

    /// Events currently queued. Never exceeds [`capacity`](Self::capacity).
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.receiver.len()
    }

    /// True when nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.receiver.is_empty()
    }

    /// Declared capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.inner.published.load(Ordering::Relaxed),
            dropped_inputs: self.inner.dropped_inputs.load(Ordering::Relaxed),
            dropped_outputs: self.inner.dropped_outputs.load(Ordering::Relaxed),
            dropped_unknown: self.inner.dropped_unknown.load(Ordering::Relaxed),
        }
    }

    fn count_drop(&self, kind: DropKind) {
        let counter = match kind {
            DropKind::Input => &self.inner.dropped_inputs,
            DropKind::Output => &self.inner.dropped_outputs,
            DropKind::Unknown => &self.inner.dropped_unknown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_protocol::{BattleResult, Pause};
    use std::time::{Duration, Instant};

    fn input_event(session_id: u32) -> Context {
        Context::with_input(session_id, 0, Pause { team_id: 1 }.into())
    }

    fn output_event(session_id: u32) -> Context {
        Context::with_output(session_id, 0, BattleResult::default().into())
    }

    #[test]
    fn test_fifo_from_single_producer() {
        let bus = EventBus::new(8);
        let rx = bus.subscribe();
        for id in 1..=5 {
            assert_eq!(bus.publish(input_event(id)), PublishOutcome::Delivered);
        }
        let order: Vec<u32> = rx.try_iter().map(|e| e.session_id).collect();
        assert_eq!(order, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_full_queue_drops_newest_and_tags_kind() {
        let bus = EventBus::new(2);
        let rx = bus.subscribe();
        assert_eq!(bus.publish(input_event(1)), PublishOutcome::Delivered);
        assert_eq!(bus.publish(input_event(2)), PublishOutcome::Delivered);

        assert_eq!(
            bus.publish(input_event(3)),
            PublishOutcome::Dropped(DropKind::Input)
        );
        assert_eq!(
            bus.publish(output_event(4)),
            PublishOutcome::Dropped(DropKind::Output)
        );

        let stats = bus.stats();
        assert_eq!(stats.published, 2);
        assert_eq!(stats.dropped_inputs, 1);
        assert_eq!(stats.dropped_outputs, 1);

        let kept: Vec<u32> = rx.try_iter().map(|e| e.session_id).collect();
        assert_eq!(kept, vec![1, 2]);
    }

    #[test]
    fn test_close_is_idempotent_and_silences_publish() {
        let bus = EventBus::new(4);
        let rx = bus.subscribe();
        assert_eq!(bus.publish(output_event(1)), PublishOutcome::Delivered);

        bus.close();
        bus.close();
        assert!(bus.is_closed());
        assert_eq!(bus.publish(output_event(2)), PublishOutcome::Closed);
        assert_eq!(bus.stats().dropped(), 0);

        assert_eq!(rx.recv().map(|e| e.session_id), Ok(1));
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_overload_never_blocks_or_overfills() {
        let bus = EventBus::new(16);
        let started = Instant::now();
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let bus = bus.clone();
                std::thread::spawn(move || {
                    for i in 0..5_000 {
                        let _ = bus.publish(input_event(p * 10_000 + i));
                        assert!(bus.len() <= bus.capacity());
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(bus.len(), 16);
        let stats = bus.stats();
        assert_eq!(stats.published + stats.dropped(), 20_000);
    }
}
