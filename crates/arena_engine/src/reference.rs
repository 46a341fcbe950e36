//! # Reference Engine
//!
//! Deterministic in-process [`SimulationEngine`] with two-team battles.
//!
//! ## Rules
//!
//! Each tick, every running battle plays one round:
//!
//! ```text
//!   ATK hits DEF for rand(min..=max) ──► DEF <= 0 ? ATK wins
//!                                       │
//!                                       ▼
//!   DEF hits ATK for rand(min..=max) ──► ATK <= 0 ? DEF wins
//! ```
//!
//! A finished battle emits a `BattleResult` envelope followed by a `Replay`
//! envelope through the registered callback, then stays registered (idle)
//! until destroyed.
//!
//! ## Input Codes
//!
//! | Code | Meaning                       |
//! |------|-------------------------------|
//! | -1   | session not found             |
//! | -2   | battle already finished       |
//! | -3   | invalid `UserOp` action (> 2) |
//! | -4   | duplicate create              |
//! | -5   | undecodable input envelope    |
//! | -99  | injected failure              |

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use arena_core::{SystemTimeSource, TimeSource};
use arena_protocol::{
    input, BattleResult, BufferView, Context, ContextCodec, Output, Replay, ReplayEvent, Team,
};
use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::boundary::{ResultCallback, SimulationEngine};
use crate::error::{EngineError, EngineOp, EngineResult};

/// Code for an unknown session.
pub const CODE_NOT_FOUND: i32 = -1;
/// Code for input to a finished battle.
pub const CODE_FINISHED: i32 = -2;
/// Code for an out-of-range `UserOp` action.
pub const CODE_INVALID_ACTION: i32 = -3;
/// Code for a create on an id the engine already holds.
pub const CODE_DUPLICATE: i32 = -4;
/// Code for an input envelope the engine could not decode.
pub const CODE_BAD_ENVELOPE: i32 = -5;
/// Code for failures armed through [`ReferenceEngine::fail_next`].
pub const CODE_INJECTED: i32 = -99;

const MAX_USER_ACTION: u32 = 2;

/// Default number of accepted submissions kept for inspection.
pub const DEFAULT_SUBMISSION_LOG: usize = 256;

/// Reference engine tuning.
///
/// Normalized on construction of the engine: damage is at least 1, the
/// damage range is never inverted and health is at least 1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceConfig {
    /// Starting health of both teams.
    pub initial_health: i32,
    /// Minimum damage per hit.
    pub min_damage: i32,
    /// Maximum damage per hit (inclusive).
    pub max_damage: i32,
    /// RNG seed.
    pub seed: u64,
    /// Replay format version.
    pub replay_version: String,
    /// Most recent accepted submissions kept for [`ReferenceEngine::submissions`].
    /// Older entries are discarded; `0` keeps none.
    pub submission_log: usize,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            initial_health: 300,
            min_damage: 20,
            max_damage: 50,
            seed: 0x0A2E_4A5E,
            replay_version: "1.0".to_owned(),
            submission_log: DEFAULT_SUBMISSION_LOG,
        }
    }
}

impl ReferenceConfig {
    /// Returns the config with values `tick` can always play with.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let requested = (self.initial_health, self.min_damage, self.max_damage);
        self.initial_health = self.initial_health.max(1);
        self.min_damage = self.min_damage.max(1);
        self.max_damage = self.max_damage.max(self.min_damage);
        if requested != (self.initial_health, self.min_damage, self.max_damage) {
            tracing::warn!(
                initial_health = self.initial_health,
                min_damage = self.min_damage,
                max_damage = self.max_damage,
                "reference engine config normalized"
            );
        }
        self
    }
}

/// One battle as the engine sees it.
#[derive(Debug)]
struct Battle {
    atk_team: u32,
    def_team: u32,
    atk_health: i32,
    def_health: i32,
    rounds: u32,
    paused: bool,
    winner: Option<u32>,
    started_ms: i64,
    events: Vec<ReplayEvent>,
}

impl Battle {
    fn is_finished(&self) -> bool {
        self.winner.is_some()
    }
}

struct EngineState {
    initialized: bool,
    battles: BTreeMap<u32, Battle>,
    rng: ChaCha8Rng,
    ticks: u64,
    submissions: VecDeque<Context>,
}

/// In-process reference engine.
pub struct ReferenceEngine {
    config: ReferenceConfig,
    time: Arc<dyn TimeSource>,
    origin: Instant,
    state: Mutex<EngineState>,
    callback: RwLock<Option<ResultCallback>>,
    armed_failures: Mutex<HashSet<EngineOp>>,
    panic_on_tick: Mutex<bool>,
}

impl ReferenceEngine {
    /// Creates an engine with default rules on real time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ReferenceConfig::default())
    }

    /// Creates an engine with custom rules on real time.
    #[must_use]
    pub fn with_config(config: ReferenceConfig) -> Self {
        Self::with_time_source(config, Arc::new(SystemTimeSource))
    }

    /// Creates an engine on an injected time source.
    #[must_use]
    pub fn with_time_source(config: ReferenceConfig, time: Arc<dyn TimeSource>) -> Self {
        let config = config.normalized();
        let origin = time.now();
        Self {
            state: Mutex::new(EngineState {
                initialized: false,
                battles: BTreeMap::new(),
                rng: ChaCha8Rng::seed_from_u64(config.seed),
                ticks: 0,
                submissions: VecDeque::new(),
            }),
            config,
            time,
            origin,
            callback: RwLock::new(None),
            armed_failures: Mutex::new(HashSet::new()),
            panic_on_tick: Mutex::new(false),
        }
    }

    // ========================================================================
    // FAULT INJECTION
    // ========================================================================

    /// Makes the next call of `op` fail with [`CODE_INJECTED`].
    pub fn fail_next(&self, op: EngineOp) {
        self.armed_failures.lock().insert(op);
    }

    /// Makes the next `tick` panic.
    pub fn panic_on_next_tick(&self) {
        *self.panic_on_tick.lock() = true;
    }

    // ========================================================================
    // INSPECTION
    // ========================================================================

    /// True between `initialize` and `shutdown`.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    /// The most recent input envelopes accepted by `submit`, oldest first.
    ///
    /// At most [`ReferenceConfig::submission_log`] are kept.
    #[must_use]
    pub fn submissions(&self) -> Vec<Context> {
        self.state.lock().submissions.iter().cloned().collect()
    }

    /// Active (normalized) configuration.
    #[must_use]
    pub fn config(&self) -> &ReferenceConfig {
        &self.config
    }

    /// Whether `session_id` is paused. `None` if unknown.
    #[must_use]
    pub fn is_paused(&self, session_id: u32) -> Option<bool> {
        self.state
            .lock()
            .battles
            .get(&session_id)
            .map(|battle| battle.paused)
    }

    /// Winner of `session_id`, once finished.
    #[must_use]
    pub fn winner(&self, session_id: u32) -> Option<u32> {
        self.state
            .lock()
            .battles
            .get(&session_id)
            .and_then(|battle| battle.winner)
    }

    /// Ticks run so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.state.lock().ticks
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn check_armed(&self, op: EngineOp) -> EngineResult<()> {
        if self.armed_failures.lock().remove(&op) {
            return Err(EngineError::call_failed(op, CODE_INJECTED, "injected failure"));
        }
        Ok(())
    }

    fn now_ms(&self) -> i64 {
        let elapsed = self.time.now().saturating_duration_since(self.origin);
        i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
    }

    fn apply_input(battle: &mut Battle, op: &input::Op) -> EngineResult<()> {
        match op {
            input::Op::Pause(_) => battle.paused = true,
            input::Op::Resume(_) => battle.paused = false,
            input::Op::UseItem(_) => {}
            input::Op::UserOp(user_op) => {
                if user_op.action > MAX_USER_ACTION {
                    return Err(EngineError::call_failed(
                        EngineOp::Submit,
                        CODE_INVALID_ACTION,
                        format!("invalid action {}", user_op.action),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Plays one round. Returns true if the battle finished.
    fn play_round(&self, battle: &mut Battle, rng: &mut ChaCha8Rng, now_ms: i64) -> bool {
        battle.rounds += 1;
        let range = self.config.min_damage..=self.config.max_damage;

        let hit = rng.gen_range(range.clone());
        battle.def_health -= hit;
        battle.events.push(ReplayEvent {
            timestamp_ms: now_ms,
            event_type: "attack".to_owned(),
            performer_id: battle.atk_team,
            target_id: battle.def_team,
            value: hit,
        });
        if battle.def_health <= 0 {
            battle.winner = Some(battle.atk_team);
            return true;
        }

        let counter = rng.gen_range(range);
        battle.atk_health -= counter;
        battle.events.push(ReplayEvent {
            timestamp_ms: now_ms,
            event_type: "attack".to_owned(),
            performer_id: battle.def_team,
            target_id: battle.atk_team,
            value: counter,
        });
        if battle.atk_health <= 0 {
            battle.winner = Some(battle.def_team);
            return true;
        }
        false
    }

    fn finish_outputs(
        &self,
        session_id: u32,
        frame: u64,
        battle: &mut Battle,
        now_ms: i64,
    ) -> Vec<Vec<u8>> {
        let winner = battle.winner.unwrap_or_default();
        let loser = if winner == battle.atk_team {
            battle.def_team
        } else {
            battle.atk_team
        };
        battle.events.push(ReplayEvent {
            timestamp_ms: now_ms,
            event_type: "end".to_owned(),
            performer_id: winner,
            target_id: loser,
            value: 1,
        });

        let initial = self.config.initial_health;
        let result = BattleResult {
            winner,
            loser,
            atk_damage: initial - battle.atk_health,
            def_damage: initial - battle.def_health,
            duration_ms: now_ms - battle.started_ms,
            score: (initial - battle.def_health) * 10,
        };
        let replay = Replay {
            session_id,
            start_time_ms: battle.started_ms,
            end_time_ms: now_ms,
            atk: Some(Team {
                team_id: battle.atk_team,
            }),
            def: Some(Team {
                team_id: battle.def_team,
            }),
            result: Some(result.clone()),
            events: battle.events.clone(),
            version: self.config.replay_version.clone(),
        };

        [Output::from(result), Output::from(replay)]
            .into_iter()
            .filter_map(|output| ContextCodec::encode_output(session_id, frame, output).ok())
            .collect()
    }
}

impl Default for ReferenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ReferenceEngine")
            .field("initialized", &state.initialized)
            .field("battles", &state.battles.len())
            .field("ticks", &state.ticks)
            .finish_non_exhaustive()
    }
}

impl SimulationEngine for ReferenceEngine {
    fn initialize(&self) -> EngineResult<()> {
        self.check_armed(EngineOp::Initialize)?;
        let mut state = self.state.lock();
        if state.initialized {
            return Err(EngineError::AlreadyInitialized);
        }
        state.initialized = true;
        tracing::debug!("reference engine initialized");
        Ok(())
    }

    fn shutdown(&self) -> EngineResult<()> {
        self.check_armed(EngineOp::Shutdown)?;
        let mut state = self.state.lock();
        if !state.initialized {
            return Err(EngineError::NotInitialized);
        }
        state.initialized = false;
        state.battles.clear();
        drop(state);
        *self.callback.write() = None;
        tracing::debug!("reference engine shut down");
        Ok(())
    }

    fn create_session(&self, session_id: u32, atk_team: u32, def_team: u32) -> EngineResult<()> {
        self.check_armed(EngineOp::Create)?;
        let now_ms = self.now_ms();
        let mut state = self.state.lock();
        if !state.initialized {
            return Err(EngineError::NotInitialized);
        }
        if state.battles.contains_key(&session_id) {
            return Err(EngineError::call_failed(
                EngineOp::Create,
                CODE_DUPLICATE,
                format!("battle {session_id} already exists"),
            ));
        }
        let health = self.config.initial_health;
        state.battles.insert(
            session_id,
            Battle {
                atk_team,
                def_team,
                atk_health: health,
                def_health: health,
                rounds: 0,
                paused: false,
                winner: None,
                started_ms: now_ms,
                events: Vec::new(),
            },
        );
        Ok(())
    }

    fn destroy_session(&self, session_id: u32) -> EngineResult<()> {
        self.check_armed(EngineOp::Destroy)?;
        let mut state = self.state.lock();
        if !state.initialized {
            return Err(EngineError::NotInitialized);
        }
        match state.battles.remove(&session_id) {
            Some(_) => Ok(()),
            None => Err(EngineError::call_failed(
                EngineOp::Destroy,
                CODE_NOT_FOUND,
                format!("battle {session_id} not found"),
            )),
        }
    }

    fn submit(&self, input: BufferView<'_>) -> EngineResult<()> {
        self.check_armed(EngineOp::Submit)?;
        let envelope = ContextCodec::parse_input(input.as_bytes()).map_err(|e| {
            EngineError::call_failed(EngineOp::Submit, CODE_BAD_ENVELOPE, e.to_string())
        })?;
        let Some(op) = envelope.as_input().and_then(|input| input.op.clone()) else {
            return Err(EngineError::call_failed(
                EngineOp::Submit,
                CODE_BAD_ENVELOPE,
                "not an input envelope",
            ));
        };

        let mut state = self.state.lock();
        if !state.initialized {
            return Err(EngineError::NotInitialized);
        }
        let session_id = envelope.session_id;
        let Some(battle) = state.battles.get_mut(&session_id) else {
            return Err(EngineError::call_failed(
                EngineOp::Submit,
                CODE_NOT_FOUND,
                format!("battle {session_id} not found"),
            ));
        };
        if battle.is_finished() {
            return Err(EngineError::call_failed(
                EngineOp::Submit,
                CODE_FINISHED,
                format!("battle {session_id} already finished"),
            ));
        }
        Self::apply_input(battle, &op)?;
        let limit = self.config.submission_log;
        if limit > 0 {
            if state.submissions.len() == limit {
                state.submissions.pop_front();
            }
            state.submissions.push_back(envelope);
        }
        Ok(())
    }

    fn tick(&self) -> EngineResult<usize> {
        if std::mem::take(&mut *self.panic_on_tick.lock()) {
            panic!("reference engine: injected tick fault");
        }
        self.check_armed(EngineOp::Tick)?;

        let now_ms = self.now_ms();
        let mut pending = Vec::new();
        let processed = {
            let mut guard = self.state.lock();
            if !guard.initialized {
                return Err(EngineError::NotInitialized);
            }
            let state = &mut *guard;
            state.ticks += 1;
            let frame = state.ticks;
            let mut processed = 0;
            for (&session_id, battle) in &mut state.battles {
                if battle.is_finished() || battle.paused {
                    continue;
                }
                processed += 1;
                if self.play_round(battle, &mut state.rng, now_ms) {
                    tracing::debug!(
                        session_id,
                        rounds = battle.rounds,
                        winner = battle.winner.unwrap_or_default(),
                        "battle finished"
                    );
                    pending.extend(self.finish_outputs(session_id, frame, battle, now_ms));
                }
            }
            processed
        };

        if !pending.is_empty() {
            let callback = self.callback.read().clone();
            if let Some(callback) = callback {
                for bytes in &pending {
                    callback(bytes);
                }
            }
        }
        Ok(processed)
    }

    fn register_result_callback(&self, callback: ResultCallback) -> EngineResult<()> {
        self.check_armed(EngineOp::RegisterCallback)?;
        *self.callback.write() = Some(callback);
        Ok(())
    }

    fn session_count(&self) -> usize {
        self.state.lock().battles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_protocol::{output, FixedBuffer, Input, Pause, Resume, UserOp, INPUT_BUFFER_SIZE};

    fn ready_engine() -> ReferenceEngine {
        let engine = ReferenceEngine::new();
        engine.initialize().unwrap();
        engine
    }

    fn submit(engine: &ReferenceEngine, session_id: u32, input: Input) -> EngineResult<()> {
        let mut buffer = FixedBuffer::new(INPUT_BUFFER_SIZE);
        ContextCodec::build_input(session_id, 1, &input, &mut buffer).unwrap();
        engine.submit(buffer.view())
    }

    #[test]
    fn test_calls_before_initialize_fail() {
        let engine = ReferenceEngine::new();
        assert_eq!(engine.create_session(1, 2, 3), Err(EngineError::NotInitialized));
        assert_eq!(engine.tick(), Err(EngineError::NotInitialized));
        engine.initialize().unwrap();
        assert_eq!(engine.initialize(), Err(EngineError::AlreadyInitialized));
    }

    #[test]
    fn test_create_and_destroy_codes() {
        let engine = ready_engine();
        engine.create_session(1000, 100, 101).unwrap();
        assert_eq!(
            engine.create_session(1000, 100, 101).unwrap_err().code(),
            Some(CODE_DUPLICATE)
        );
        assert_eq!(engine.session_count(), 1);

        engine.destroy_session(1000).unwrap();
        assert_eq!(
            engine.destroy_session(1000).unwrap_err().code(),
            Some(CODE_NOT_FOUND)
        );
        assert_eq!(engine.session_count(), 0);
    }

    #[test]
    fn test_submit_codes() {
        let engine = ready_engine();
        engine.create_session(7, 1, 2).unwrap();

        let bad_action = UserOp {
            team_id: 1,
            action: 3,
            value: 0,
        };
        assert_eq!(
            submit(&engine, 7, bad_action.into()).unwrap_err().code(),
            Some(CODE_INVALID_ACTION)
        );
        assert_eq!(
            submit(&engine, 8, Pause { team_id: 1 }.into()).unwrap_err().code(),
            Some(CODE_NOT_FOUND)
        );

        // A bare `Team` decodes as an envelope with no body.
        let mut buffer = FixedBuffer::new(8);
        buffer.write_message(&Team { team_id: 5 }).unwrap();
        assert_eq!(
            engine.submit(buffer.view()).unwrap_err().code(),
            Some(CODE_BAD_ENVELOPE)
        );
    }

    #[test]
    fn test_pause_stops_rounds() {
        let engine = ready_engine();
        engine.create_session(7, 1, 2).unwrap();

        submit(&engine, 7, Pause { team_id: 1 }.into()).unwrap();
        assert_eq!(engine.is_paused(7), Some(true));
        assert_eq!(engine.tick(), Ok(0));

        submit(&engine, 7, Resume { team_id: 1 }.into()).unwrap();
        assert_eq!(engine.tick(), Ok(1));
        assert_eq!(engine.submissions().len(), 2);
    }

    #[test]
    fn test_battle_finishes_and_emits_result_then_replay() {
        let engine = ready_engine();
        let seen: Arc<Mutex<Vec<Context>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        engine
            .register_result_callback(Arc::new(move |bytes: &[u8]| {
                sink.lock().push(ContextCodec::parse_output(bytes).unwrap());
            }))
            .unwrap();
        engine.create_session(1000, 100, 101).unwrap();

        // 300 health, at most 20 damage floor: finished within 15 rounds.
        for _ in 0..15 {
            engine.tick().unwrap();
        }
        let winner = engine.winner(1000).unwrap();
        assert!(winner == 100 || winner == 101);
        assert_eq!(engine.tick(), Ok(0));

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        let Some(output::Event::Result(result)) =
            seen[0].as_output().and_then(|o| o.event.clone())
        else {
            panic!("first output should be a result");
        };
        assert_eq!(result.winner, winner);
        let Some(output::Event::Replay(replay)) =
            seen[1].as_output().and_then(|o| o.event.clone())
        else {
            panic!("second output should be a replay");
        };
        assert_eq!(replay.session_id, 1000);
        assert_eq!(replay.version, "1.0");
        assert_eq!(replay.events.last().map(|e| e.event_type.as_str()), Some("end"));

        assert_eq!(
            submit(&engine, 1000, Pause { team_id: 100 }.into()).unwrap_err().code(),
            Some(CODE_FINISHED)
        );
    }

    #[test]
    fn test_submission_log_keeps_most_recent() {
        let engine = ReferenceEngine::with_config(ReferenceConfig {
            submission_log: 2,
            ..ReferenceConfig::default()
        });
        engine.initialize().unwrap();
        engine.create_session(7, 1, 2).unwrap();
        for team_id in [1, 2, 3] {
            submit(&engine, 7, Pause { team_id }.into()).unwrap();
        }

        let kept: Vec<Input> = engine
            .submissions()
            .into_iter()
            .filter_map(|envelope| envelope.as_input().cloned())
            .collect();
        assert_eq!(
            kept,
            vec![Pause { team_id: 2 }.into(), Pause { team_id: 3 }.into()]
        );
    }

    #[test]
    fn test_inverted_damage_range_is_normalized() {
        let engine = ReferenceEngine::with_config(ReferenceConfig {
            initial_health: 0,
            min_damage: 50,
            max_damage: 20,
            ..ReferenceConfig::default()
        });
        let config = engine.config();
        assert_eq!((config.initial_health, config.min_damage, config.max_damage), (1, 50, 50));

        engine.initialize().unwrap();
        engine.create_session(1, 10, 11).unwrap();
        assert_eq!(engine.tick(), Ok(1));
        assert_eq!(engine.winner(1), Some(10));
    }

    #[test]
    fn test_negative_damage_is_raised_to_one() {
        let config = ReferenceConfig {
            min_damage: -5,
            max_damage: -1,
            ..ReferenceConfig::default()
        }
        .normalized();
        assert_eq!((config.min_damage, config.max_damage), (1, 1));
    }

    #[test]
    fn test_injected_failure_fires_once() {
        let engine = ready_engine();
        engine.fail_next(EngineOp::Create);
        assert_eq!(
            engine.create_session(1, 2, 3).unwrap_err().code(),
            Some(CODE_INJECTED)
        );
        engine.create_session(1, 2, 3).unwrap();
    }

    #[test]
    fn test_injected_tick_panic() {
        let engine = ready_engine();
        engine.panic_on_next_tick();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| engine.tick()));
        assert!(outcome.is_err());
        assert_eq!(engine.tick(), Ok(0));
    }
}
