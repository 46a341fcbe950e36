//! Fluent construction for [`Orchestrator`].

use std::sync::Arc;
use std::time::Duration;

use arena_core::LogicalClock;
use arena_engine::SimulationEngine;
use arena_protocol::ContextCodec;

use super::Orchestrator;
use crate::bus::EventBus;
use crate::config::OrchestratorConfig;
use crate::dispatcher::{Dispatcher, SessionDispatcher};
use crate::error::{OrchestratorError, OrchestratorResult};

/// Builder for [`Orchestrator`].
///
/// Only the engine is required. Anything else not supplied is built from
/// the configuration.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use arena_engine::ReferenceEngine;
/// use arena_orchestrator::Orchestrator;
///
/// let orchestrator = Orchestrator::builder()
///     .with_engine(Arc::new(ReferenceEngine::new()))
///     .with_tick_interval(Duration::from_millis(50))
///     .with_bus_capacity(256)
///     .build()
///     .unwrap();
/// assert_eq!(orchestrator.bus().capacity(), 256);
/// ```
#[derive(Default)]
#[must_use]
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    engine: Option<Arc<dyn SimulationEngine>>,
    clock: Option<Arc<LogicalClock>>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    bus: Option<EventBus>,
}

impl OrchestratorBuilder {
    /// Builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Engine to drive. Required.
    pub fn with_engine(mut self, engine: Arc<dyn SimulationEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Shared clock; `frames_per_second` is ignored when set.
    pub fn with_clock(mut self, clock: Arc<LogicalClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Custom session registry; `input_buffer_capacity` is ignored when set.
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Pre-built bus; `bus_capacity` is ignored when set.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Frame rate of the default clock.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.config.frames_per_second = fps;
        self
    }

    /// Event bus capacity.
    pub fn with_bus_capacity(mut self, capacity: usize) -> Self {
        self.config.bus_capacity = capacity;
        self
    }

    /// Create channel capacity.
    pub fn with_create_capacity(mut self, capacity: usize) -> Self {
        self.config.create_capacity = capacity;
        self
    }

    /// Output channel capacity.
    pub fn with_output_capacity(mut self, capacity: usize) -> Self {
        self.config.output_capacity = capacity;
        self
    }

    /// Engine tick interval, at millisecond resolution.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Auto-assigned ids start above this value.
    pub fn with_first_session_id(mut self, first: u64) -> Self {
        self.config.first_session_id = first;
        self
    }

    /// Per-session input buffer size.
    pub fn with_input_buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.input_buffer_capacity = capacity;
        self
    }

    /// Assembles the orchestrator in `Created` state.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::InvalidConfig`] if no engine was supplied or
    /// the configuration does not validate.
    pub fn build(self) -> OrchestratorResult<Orchestrator> {
        self.config.validate()?;
        let engine = self
            .engine
            .ok_or_else(|| OrchestratorError::InvalidConfig("an engine is required".to_owned()))?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(LogicalClock::new(self.config.frames_per_second)));
        let dispatcher = self.dispatcher.unwrap_or_else(|| {
            Arc::new(SessionDispatcher::new(
                engine.clone(),
                ContextCodec::new(clock.clone()),
                self.config.input_buffer_capacity,
            ))
        });
        let bus = self
            .bus
            .unwrap_or_else(|| EventBus::new(self.config.bus_capacity));

        Ok(Orchestrator::assemble(self.config, engine, dispatcher, clock, bus))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_engine::ReferenceEngine;

    #[test]
    fn test_engine_is_required() {
        assert!(matches!(
            OrchestratorBuilder::new().build(),
            Err(OrchestratorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = OrchestratorBuilder::new()
            .with_engine(Arc::new(ReferenceEngine::new()))
            .with_tick_interval(Duration::from_micros(10))
            .build();
        assert!(matches!(result, Err(OrchestratorError::InvalidConfig(_))));
    }

    #[test]
    fn test_overrides_apply() {
        let clock = Arc::new(LogicalClock::new(60));
        let orchestrator = OrchestratorBuilder::new()
            .with_engine(Arc::new(ReferenceEngine::new()))
            .with_clock(clock.clone())
            .with_event_bus(EventBus::new(7))
            .with_first_session_id(5000)
            .build()
            .unwrap();
        assert!(Arc::ptr_eq(orchestrator.clock(), &clock));
        assert_eq!(orchestrator.bus().capacity(), 7);
        assert_eq!(orchestrator.config().first_session_id, 5000);
    }
}
