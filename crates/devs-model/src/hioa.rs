//! Continuous-state (HIOA) dynamics.
//!
//! A model's variables are either recomputed only by its transitions
//! ([`Dynamics::Discrete`]) or follow a derivative that is integrated with
//! explicit (forward) Euler between transitions ([`Dynamics::Continuous`]).
//! That choice is the only difference between a discrete and a continuous
//! model, so it is a strategy value rather than a separate model type.
//!
//! Integration always runs from the variable's last stamped time to the
//! target time, so a causal refresh followed by an internal step covers the
//! same span exactly once.

use std::fmt;
use std::sync::Arc;

use devs_core::{
    AnyValue, Duration, Event, EventType, RunParameters, SimulationReport, Time, Value,
    VariableDescriptor, VariableType, Visibility,
};

use crate::{AtomicModel, DeclaredModel, ModelContext, ModelDeclarations, ModelError, ModelResult, VariableTable};

/// `dx/dt = f(x, inputs)`, with `inputs` in declaration order and the rate
/// expressed per second of simulated time.
pub type DerivativeFn = Arc<dyn Fn(f64, &[f64]) -> f64 + Send + Sync>;

#[derive(Clone)]
pub enum Dynamics {
    /// Variables change only during transitions; the model is passive
    /// between events.
    Discrete,
    /// Variables follow `derivative`, recomputed every `integration_step`.
    Continuous {
        derivative:       DerivativeFn,
        integration_step: Duration,
    },
}

impl Dynamics {
    pub fn continuous<F>(derivative: F, integration_step: Duration) -> Self
    where
        F: Fn(f64, &[f64]) -> f64 + Send + Sync + 'static,
    {
        Dynamics::Continuous { derivative: Arc::new(derivative), integration_step }
    }

    /// Time advance implied by the strategy.
    pub fn time_advance(&self) -> Duration {
        match self {
            Dynamics::Discrete => Duration::INFINITY,
            Dynamics::Continuous { integration_step, .. } => *integration_step,
        }
    }

    pub fn is_continuous(&self) -> bool {
        matches!(self, Dynamics::Continuous { .. })
    }
}

impl fmt::Debug for Dynamics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dynamics::Discrete => f.write_str("Discrete"),
            Dynamics::Continuous { integration_step, .. } => f
                .debug_struct("Continuous")
                .field("integration_step", integration_step)
                .finish_non_exhaustive(),
        }
    }
}

// ── IntegratedVariable ────────────────────────────────────────────────────────

/// An exported `f64` value with a held derivative.
pub struct IntegratedVariable {
    value:      Value<f64>,
    derivative: f64,
}

impl IntegratedVariable {
    pub fn new(owner: impl Into<String>, initial: f64) -> Self {
        Self { value: Value::new(owner, Visibility::Exported, initial), derivative: 0.0 }
    }

    pub fn value(&self) -> &Value<f64> {
        &self.value
    }

    pub fn current(&self) -> f64 {
        self.value.get()
    }

    pub fn derivative(&self) -> f64 {
        self.derivative
    }

    pub fn set_derivative(&mut self, derivative: f64) {
        self.derivative = derivative;
    }

    /// Overwrite the value at `time`.
    pub fn reset(&mut self, x: f64, time: Time) {
        self.value.set(x, time);
    }

    /// Value at `at` under the held derivative, without writing it.
    pub fn projected(&self, at: Time) -> f64 {
        let x = self.value.get();
        match self.value.time().and_then(|from| at.checked_duration_since(from)) {
            Some(dt) => x + self.derivative * dt.as_secs_f64(),
            None     => x,
        }
    }

    /// Explicit Euler step from the last stamped time to `to`.
    pub fn advance_to(&mut self, to: Time) {
        let x = self.projected(to);
        self.value.set(x, to);
    }
}

// ── ContinuousModel ───────────────────────────────────────────────────────────

/// A single-state HIOA model exporting its state as `x`.
///
/// Optional features, enabled with the `with_*` builders:
/// - imported `f64` inputs fed to the derivative,
/// - an output event carrying the state at every internal step,
/// - a reset event whose `f64` payload overwrites the state.
///
/// The run parameter `initial` (an `f64`) overrides the initial state.
pub struct ContinuousModel {
    uri:            String,
    dynamics:       Dynamics,
    initial:        f64,
    x:              IntegratedVariable,
    variables:      VariableTable,
    inputs:         Vec<String>,
    output_event:   Option<EventType>,
    reset_event:    Option<EventType>,
    pending_reset:  Option<f64>,
    clock:          Time,
    internal_steps: u64,
    external_steps: u64,
    causal_steps:   u64,
}

/// Name of the exported state variable.
pub const STATE_VARIABLE: &str = "x";

/// Final report payload of a [`ContinuousModel`].
#[derive(Clone, Debug, PartialEq)]
pub struct ContinuousReport {
    pub final_value:    f64,
    pub final_time:     Option<Time>,
    pub internal_steps: u64,
    pub external_steps: u64,
    pub causal_steps:   u64,
}

impl ContinuousModel {
    pub fn new(ctx: &ModelContext, initial: f64, dynamics: Dynamics) -> Self {
        let x = IntegratedVariable::new(ctx.uri.clone(), initial);
        let mut variables = VariableTable::new(ctx.uri.clone());
        variables.register(STATE_VARIABLE, x.value());
        Self {
            uri: ctx.uri.clone(),
            dynamics,
            initial,
            x,
            variables,
            inputs: Vec::new(),
            output_event: None,
            reset_event: None,
            pending_reset: None,
            clock: Time::zero(ctx.time_unit),
            internal_steps: 0,
            external_steps: 0,
            causal_steps: 0,
        }
    }

    /// Import an `f64` variable `name` and pass it to the derivative.
    pub fn with_input(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.variables.declare_import(name.clone(), VariableType::of::<f64>());
        self.inputs.push(name);
        self
    }

    pub fn with_output_event(mut self, event_type: impl Into<EventType>) -> Self {
        self.output_event = Some(event_type.into());
        self
    }

    pub fn with_reset_event(mut self, event_type: impl Into<EventType>) -> Self {
        self.reset_event = Some(event_type.into());
        self
    }

    /// Declarations of this configured instance.
    pub fn declared(&self) -> ModelDeclarations {
        let mut decls = Self::declarations();
        for input in &self.inputs {
            decls = decls.with_variable(VariableDescriptor::imported::<f64>(input.clone()));
        }
        if let Some(et) = &self.output_event {
            decls = decls.with_export(et.clone());
        }
        if let Some(et) = &self.reset_event {
            decls = decls.with_import(et.clone());
        }
        decls
    }

    pub fn state(&self) -> &IntegratedVariable {
        &self.x
    }

    fn refresh_derivative(&mut self) -> ModelResult<()> {
        if let Dynamics::Continuous { derivative, .. } = &self.dynamics {
            let inputs = self
                .inputs
                .iter()
                .map(|name| Ok(self.variables.imported::<f64>(name)?.get()?))
                .collect::<ModelResult<Vec<f64>>>()?;
            let d = derivative(self.x.current(), &inputs);
            self.x.set_derivative(d);
        }
        Ok(())
    }

    fn advance(&mut self, elapsed: Duration) {
        self.clock = self.clock + elapsed;
        self.x.advance_to(self.clock);
    }
}

impl DeclaredModel for ContinuousModel {
    fn declarations() -> ModelDeclarations {
        ModelDeclarations::new().with_variable(VariableDescriptor::exported::<f64>(STATE_VARIABLE))
    }
}

impl AtomicModel for ContinuousModel {
    fn initialise_state(&mut self, start: Time) -> ModelResult<()> {
        self.clock = start;
        self.x.reset(self.initial, start);
        self.pending_reset = None;
        self.internal_steps = 0;
        self.external_steps = 0;
        self.causal_steps = 0;
        self.refresh_derivative()
    }

    fn time_advance(&self) -> Duration {
        self.dynamics.time_advance()
    }

    fn output(&mut self, current: Time) -> ModelResult<Vec<Event>> {
        Ok(match &self.output_event {
            Some(et) => vec![Event::new(et.clone(), current).with_payload(self.x.projected(current))],
            None     => Vec::new(),
        })
    }

    fn internal_transition(&mut self, elapsed: Duration) -> ModelResult<()> {
        self.advance(elapsed);
        self.internal_steps += 1;
        self.refresh_derivative()
    }

    fn apply_event(&mut self, event: &Event) -> ModelResult<()> {
        if self.reset_event.as_ref() == Some(event.event_type()) {
            let value = event.payload::<f64>().copied().ok_or_else(|| {
                ModelError::Failed(format!("{}: {} carries no f64 payload", self.uri, event.event_type()))
            })?;
            self.pending_reset = Some(value);
        }
        Ok(())
    }

    fn external_transition(&mut self, elapsed: Duration) -> ModelResult<()> {
        self.advance(elapsed);
        if let Some(x) = self.pending_reset.take() {
            self.x.reset(x, self.clock);
        }
        self.external_steps += 1;
        self.refresh_derivative()
    }

    /// Integrates with the held derivative; the derivative itself is only
    /// recomputed by internal and external transitions.
    fn causal_transition(&mut self, elapsed: Duration) -> ModelResult<()> {
        self.advance(elapsed);
        self.causal_steps += 1;
        Ok(())
    }

    fn set_simulation_run_parameters(&mut self, uri: &str, params: &RunParameters) -> ModelResult<()> {
        if params.contains(uri, "initial") {
            let initial = params.get::<f64>(uri, "initial").ok_or_else(|| ModelError::InvalidParameter {
                model:  uri.to_owned(),
                name:   "initial".into(),
                reason: "expected an f64".into(),
            })?;
            self.initial = *initial;
        }
        Ok(())
    }

    fn value_of(&self, name: &str) -> Option<AnyValue> {
        self.variables.value_of(name)
    }

    fn import_type(&self, name: &str) -> Option<VariableType> {
        self.variables.import_type(name)
    }

    fn bind_imported(&mut self, name: &str, value: &AnyValue) -> ModelResult<()> {
        self.variables.bind_imported(name, value)
    }

    fn final_report(&self, uri: &str) -> SimulationReport {
        SimulationReport::atomic(uri, ContinuousReport {
            final_value:    self.x.current(),
            final_time:     self.x.value().time(),
            internal_steps: self.internal_steps,
            external_steps: self.external_steps,
            causal_steps:   self.causal_steps,
        })
    }
}
