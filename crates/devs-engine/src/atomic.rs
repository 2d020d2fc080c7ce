//! The engine driving one atomic model.

use devs_core::{Duration, Event, Time};
use devs_model::{AtomicModel, ModelError};

use crate::{EngineClock, EngineError, EngineResult, ProtocolState, SimulationEngine};

/// Clock, protocol state and input buffer of one atomic model.
///
/// The engine does not own its model: every step borrows it, so the engine
/// can be driven on its own in tests and the model stays in the
/// [`ModelTree`](devs_compose::ModelTree).
#[derive(Debug)]
pub struct AtomicEngine {
    uri:    String,
    clock:  EngineClock,
    state:  ProtocolState,
    inputs: Vec<Event>,
}

impl AtomicEngine {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri:    uri.into(),
            clock:  EngineClock::unstarted(),
            state:  ProtocolState::Uninitialised,
            inputs: Vec::new(),
        }
    }

    fn model_error(&self, source: ModelError) -> EngineError {
        EngineError::Model { uri: self.uri.clone(), source }
    }

    /// Initialise the model at `start` and schedule its first internal event.
    pub fn initialise(&mut self, model: &mut dyn AtomicModel, start: Time) -> EngineResult<()> {
        self.state.require(&self.uri, "initialise", ProtocolState::Uninitialised)?;
        model.initialise_state(start).map_err(|e| self.model_error(e))?;
        self.clock.schedule(start, model.time_advance());
        self.state.finish();
        self.clock.check(&self.uri, "initialise")
    }

    /// Buffer an event for the next external step.
    pub fn store_input(&mut self, event: Event) {
        self.inputs.push(event);
    }

    pub fn pending_inputs(&self) -> &[Event] {
        &self.inputs
    }

    /// Output of the model at its next event time.
    pub fn produce_output(&mut self, model: &mut dyn AtomicModel, current: Time) -> EngineResult<Vec<Event>> {
        if current != self.clock.time_of_next_event {
            return Err(EngineError::TimeOutOfRange {
                uri:       self.uri.clone(),
                operation: "produce_output",
                time:      current,
                earliest:  self.clock.time_of_next_event,
                latest:    self.clock.time_of_next_event,
            });
        }
        self.state.begin(&self.uri, "produce_output", ProtocolState::ProduceOutput)?;
        let events = model.output(current).map_err(|e| self.model_error(e))?;
        self.state.finish();
        Ok(events)
    }

    /// Internal transition at the scheduled next-event time.
    pub fn internal_event_step(&mut self, model: &mut dyn AtomicModel) -> EngineResult<()> {
        self.state.begin(&self.uri, "internal_event_step", ProtocolState::InternalStep)?;
        let now = self.clock.time_of_next_event;
        if now.is_infinite() {
            return Err(EngineError::NoScheduledEvent { uri: self.uri.clone() });
        }
        model
            .internal_transition(self.clock.next_time_advance)
            .map_err(|e| self.model_error(e))?;
        self.clock.schedule(now, model.time_advance());
        self.state.finish();
        self.clock.check(&self.uri, "internal_event_step")
    }

    /// Consume every buffered input, then apply the external transition
    /// `elapsed` after the last event.
    pub fn external_event_step(&mut self, model: &mut dyn AtomicModel, elapsed: Duration) -> EngineResult<()> {
        let now = self.clock.time_of_last_event + elapsed;
        self.clock.check_within(&self.uri, "external_event_step", now)?;
        self.state.begin(&self.uri, "external_event_step", ProtocolState::ExternalStep)?;
        for event in std::mem::take(&mut self.inputs) {
            model.apply_event(&event).map_err(|e| self.model_error(e))?;
        }
        model.external_transition(elapsed).map_err(|e| self.model_error(e))?;
        self.clock.schedule(now, model.time_advance());
        self.state.finish();
        self.clock.check(&self.uri, "external_event_step")
    }

    /// Bring continuous state to `current` without consuming events.  The
    /// next-event time is kept.
    pub fn causal_event_step(&mut self, model: &mut dyn AtomicModel, current: Time) -> EngineResult<()> {
        self.clock.check_within(&self.uri, "causal_event_step", current)?;
        self.state.begin(&self.uri, "causal_event_step", ProtocolState::CausalStep)?;
        let elapsed = current - self.clock.time_of_last_event;
        model.causal_transition(elapsed).map_err(|e| self.model_error(e))?;
        self.clock.resync(current);
        self.state.finish();
        self.clock.check(&self.uri, "causal_event_step")
    }

    /// Simultaneous internal and external events are not resolved by a
    /// single transition.  Coordinators reach this only under
    /// [`CollisionPolicy::Reject`](crate::CollisionPolicy::Reject).
    pub fn confluent_event_step(&mut self, _model: &mut dyn AtomicModel, _elapsed: Duration) -> EngineResult<()> {
        Err(EngineError::Unimplemented { uri: self.uri.clone(), operation: "confluent_event_step" })
    }

    pub fn end_simulation(&mut self, model: &mut dyn AtomicModel, end: Time) -> EngineResult<()> {
        self.state.require(&self.uri, "end_simulation", ProtocolState::AwaitNextEvent)?;
        if end < self.clock.time_of_last_event {
            return Err(EngineError::TimeOutOfRange {
                uri:       self.uri.clone(),
                operation: "end_simulation",
                time:      end,
                earliest:  self.clock.time_of_last_event,
                latest:    Time::INFINITY,
            });
        }
        model.end_simulation(end).map_err(|e| self.model_error(e))?;
        self.state = ProtocolState::Ended;
        Ok(())
    }
}

impl SimulationEngine for AtomicEngine {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn clock(&self) -> &EngineClock {
        &self.clock
    }

    fn state(&self) -> ProtocolState {
        self.state
    }

    fn has_pending_external_events(&self) -> bool {
        !self.inputs.is_empty()
    }
}
