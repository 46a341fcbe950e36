//! # Logical Frame Clock
//!
//! Converts elapsed monotonic time into a logical frame number.
//!
//! ```text
//!   epoch                                now
//!     │<──────────── elapsed ────────────>│
//!     ├──────┬──────┬──────┬──────┬───────┤
//!     │  f0  │  f1  │  f2  │  f3  │  f4 ..│
//!     └──────┴──────┴──────┴──────┴───────┘
//!       frame = floor(elapsed / frame_duration)
//! ```
//!
//! The clock never reads `Instant::now()` directly: time comes from an
//! injected [`TimeSource`], so tests can drive frames deterministically with
//! [`ManualTimeSource`].

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Frame rate used when a caller configures an invalid rate.
pub const DEFAULT_FPS: u32 = 30;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

// ============================================================================
// TIME SOURCES
// ============================================================================

/// Monotonic time, injected into the clock.
pub trait TimeSource: Send + Sync {
    /// Returns the current instant. Must never go backwards.
    fn now(&self) -> Instant;

    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Real monotonic time backed by [`Instant`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Hand-driven time for tests.
///
/// Starts at a fixed instant and only moves when [`advance`](Self::advance)
/// or [`TimeSource::sleep`] is called.
#[derive(Debug)]
pub struct ManualTimeSource {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualTimeSource {
    /// Creates a manual source frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves time forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock();
        *offset = offset.saturating_add(by);
    }

    /// Total time advanced since construction.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

// ============================================================================
// FRAME SOURCE CAPABILITY
// ============================================================================

/// Anything that can stamp an outgoing envelope with a logical frame.
pub trait FrameSource: Send + Sync {
    /// Current logical frame number.
    fn current_frame(&self) -> u64;
}

// ============================================================================
// LOGICAL CLOCK
// ============================================================================

/// Snapshot of the clock configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockState {
    /// Frames per second.
    pub fps: u32,
    /// Length of one frame (`1s / fps`).
    pub frame_duration: Duration,
    /// Instant frame 0 started.
    pub epoch: Instant,
}

impl ClockState {
    fn new(fps: u32, epoch: Instant) -> Self {
        let fps = normalize_fps(fps);
        Self {
            fps,
            frame_duration: Duration::from_nanos(NANOS_PER_SECOND / u64::from(fps)),
            epoch,
        }
    }

    fn frame_at(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.epoch);
        let frames = elapsed.as_nanos() / self.frame_duration.as_nanos();
        u64::try_from(frames).unwrap_or(u64::MAX)
    }
}

/// A zero rate would divide by zero; it falls back to [`DEFAULT_FPS`]
/// instead of failing, so a misconfigured caller cannot break a clock
/// other threads are reading.
fn normalize_fps(fps: u32) -> u32 {
    if fps == 0 {
        DEFAULT_FPS
    } else {
        fps.min(u32::try_from(NANOS_PER_SECOND).unwrap_or(u32::MAX))
    }
}

/// Logical frame clock.
///
/// Readers (`current_frame`) and reconfiguration (`set_rate`, `reset`) may
/// run concurrently; the state sits behind a read/write lock.
pub struct LogicalClock {
    time: Arc<dyn TimeSource>,
    state: RwLock<ClockState>,
}

impl LogicalClock {
    /// Creates a clock on real monotonic time, starting at frame 0 now.
    #[must_use]
    pub fn new(fps: u32) -> Self {
        Self::with_time_source(fps, Arc::new(SystemTimeSource))
    }

    /// Creates a clock on an injected time source.
    #[must_use]
    pub fn with_time_source(fps: u32, time: Arc<dyn TimeSource>) -> Self {
        let epoch = time.now();
        Self {
            state: RwLock::new(ClockState::new(fps, epoch)),
            time,
        }
    }

    /// Current frame: `floor((now - epoch) / frame_duration)`.
    #[must_use]
    pub fn current_frame(&self) -> u64 {
        let state = *self.state.read();
        state.frame_at(self.time.now())
    }

    /// Restarts counting from frame 0 at the current instant.
    pub fn reset(&self) {
        let now = self.time.now();
        self.state.write().epoch = now;
    }

    /// Changes the frame rate. `0` is normalized to [`DEFAULT_FPS`].
    ///
    /// The epoch is kept, so the frame number is re-derived from the
    /// same origin at the new rate.
    pub fn set_rate(&self, fps: u32) {
        let mut state = self.state.write();
        *state = ClockState::new(fps, state.epoch);
    }

    /// Configured frames per second.
    #[inline]
    #[must_use]
    pub fn fps(&self) -> u32 {
        self.state.read().fps
    }

    /// Length of one frame.
    #[inline]
    #[must_use]
    pub fn frame_duration(&self) -> Duration {
        self.state.read().frame_duration
    }

    /// Copy of the current configuration.
    #[must_use]
    pub fn state(&self) -> ClockState {
        *self.state.read()
    }

    /// Blocks until the next frame boundary.
    ///
    /// The lock is released before sleeping.
    pub fn sleep_until_next_frame(&self) {
        let state = *self.state.read();
        let elapsed = self.time.now().saturating_duration_since(state.epoch);
        let frame_nanos = state.frame_duration.as_nanos();
        let next_boundary = (elapsed.as_nanos() / frame_nanos + 1) * frame_nanos;
        let remaining = next_boundary - elapsed.as_nanos();
        let remaining = Duration::from_nanos(u64::try_from(remaining).unwrap_or(u64::MAX));
        if !remaining.is_zero() {
            self.time.sleep(remaining);
        }
    }
}

impl FrameSource for LogicalClock {
    #[inline]
    fn current_frame(&self) -> u64 {
        LogicalClock::current_frame(self)
    }
}

impl std::fmt::Debug for LogicalClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalClock")
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn manual_clock(fps: u32) -> (Arc<ManualTimeSource>, LogicalClock) {
        let time = Arc::new(ManualTimeSource::new());
        let clock = LogicalClock::with_time_source(fps, time.clone());
        (time, clock)
    }

    #[test]
    fn test_starts_at_frame_zero() {
        let (_time, clock) = manual_clock(30);
        assert_eq!(clock.current_frame(), 0);
    }

    #[test]
    fn test_frame_floors() {
        let (time, clock) = manual_clock(10);
        time.advance(Duration::from_millis(99));
        assert_eq!(clock.current_frame(), 0);
        time.advance(Duration::from_millis(1));
        assert_eq!(clock.current_frame(), 1);
        time.advance(Duration::from_millis(199));
        assert_eq!(clock.current_frame(), 2);
    }

    #[test]
    fn test_zero_fps_normalized() {
        let (_time, clock) = manual_clock(0);
        assert_eq!(clock.fps(), DEFAULT_FPS);

        clock.set_rate(60);
        assert_eq!(clock.fps(), 60);
        clock.set_rate(0);
        assert_eq!(clock.fps(), DEFAULT_FPS);
        assert_eq!(clock.frame_duration(), Duration::from_nanos(33_333_333));
    }

    #[test]
    fn test_reset_restarts_counting() {
        let (time, clock) = manual_clock(30);
        time.advance(Duration::from_secs(2));
        assert_eq!(clock.current_frame(), 60);
        clock.reset();
        assert_eq!(clock.current_frame(), 0);
        time.advance(Duration::from_secs(1));
        assert_eq!(clock.current_frame(), 30);
    }

    #[test]
    fn test_set_rate_keeps_epoch() {
        let (time, clock) = manual_clock(10);
        time.advance(Duration::from_secs(1));
        assert_eq!(clock.current_frame(), 10);
        clock.set_rate(20);
        assert_eq!(clock.current_frame(), 20);
    }

    #[test]
    fn test_sleep_until_next_frame() {
        let (time, clock) = manual_clock(10);
        time.advance(Duration::from_millis(130));
        clock.sleep_until_next_frame();
        assert_eq!(time.elapsed(), Duration::from_millis(200));
        assert_eq!(clock.current_frame(), 2);
    }

    #[test]
    fn test_concurrent_reads_during_set_rate() {
        let clock = Arc::new(LogicalClock::new(30));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let clock = clock.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        let _ = clock.current_frame();
                    }
                })
            })
            .collect();
        for fps in 1..200 {
            clock.set_rate(fps);
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(clock.fps(), 199);
    }

    proptest! {
        #[test]
        fn prop_frame_is_floor_of_elapsed(fps in 1u32..1_000, millis in 0u64..100_000) {
            let (time, clock) = manual_clock(fps);
            time.advance(Duration::from_millis(millis));
            let frame_nanos = u128::from(1_000_000_000 / u64::from(fps));
            let expected = u128::from(millis) * 1_000_000 / frame_nanos;
            prop_assert_eq!(u128::from(clock.current_frame()), expected);
        }

        #[test]
        fn prop_frames_never_decrease(fps in 1u32..240, steps in proptest::collection::vec(0u64..50, 1..64)) {
            let (time, clock) = manual_clock(fps);
            let mut last = clock.current_frame();
            for step in steps {
                time.advance(Duration::from_millis(step));
                let frame = clock.current_frame();
                prop_assert!(frame >= last);
                last = frame;
            }
        }
    }
}
