//! The `AtomicModel` trait: the main extension point for user code.

use devs_core::{
    AnyValue, Duration, Event, RunParameters, SimulationReport, Time, TimeUnit, VariableType,
};

use crate::{ModelDeclarations, ModelError, ModelResult};

/// What a model learns about its placement when it is instantiated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelContext {
    /// URI of the model in the tree; owner of every value it creates.
    pub uri:       String,
    /// Unit of the architecture's simulated clock.
    pub time_unit: TimeUnit,
}

impl ModelContext {
    pub fn new(uri: impl Into<String>, time_unit: TimeUnit) -> Self {
        Self { uri: uri.into(), time_unit }
    }
}

/// Static declaration capability, queryable without an instance.
pub trait DeclaredModel: AtomicModel {
    fn declarations() -> ModelDeclarations;
}

/// A DEVS atomic model, optionally carrying HIOA variables.
///
/// The engine drives the model through these hooks in protocol order:
/// `initialise_state` once, then any sequence of
/// `output`+`internal_transition`, `apply_event`*+`external_transition`, and
/// `causal_transition`, then `end_simulation` once.  Every `elapsed`
/// argument is the simulated time since the model's previous transition.
///
/// # Required methods
///
/// Only [`time_advance`][Self::time_advance] is required.  The transition
/// hooks default to no-ops, except [`confluent_transition`][Self::confluent_transition]
/// which reports [`ModelError::Unimplemented`]: the kernel never resolves
/// simultaneous internal and external events silently.
///
/// # Variables
///
/// Models with HIOA variables implement [`value_of`][Self::value_of] (for
/// exported and internal variables) and [`bind_imported`][Self::bind_imported]
/// (called during composition).  A [`VariableTable`](crate::VariableTable)
/// implements both and is the usual way to do so.
///
/// # Example
///
/// ```rust,ignore
/// struct Ticker { period: Duration, count: u64 }
///
/// impl AtomicModel for Ticker {
///     fn time_advance(&self) -> Duration { self.period }
///     fn output(&mut self, t: Time) -> ModelResult<Vec<Event>> {
///         Ok(vec![Event::new("Tick", t).with_payload(self.count)])
///     }
///     fn internal_transition(&mut self, _: Duration) -> ModelResult<()> {
///         self.count += 1;
///         Ok(())
///     }
/// }
/// ```
pub trait AtomicModel: 'static {
    /// Set the initial state at `start`.
    fn initialise_state(&mut self, _start: Time) -> ModelResult<()> {
        Ok(())
    }

    /// Duration until the next internal event; `Duration::INFINITY` when passive.
    fn time_advance(&self) -> Duration;

    /// Events emitted at `current`, just before the internal transition.
    fn output(&mut self, _current: Time) -> ModelResult<Vec<Event>> {
        Ok(Vec::new())
    }

    fn internal_transition(&mut self, _elapsed: Duration) -> ModelResult<()> {
        Ok(())
    }

    /// Apply one received event.  Called for every buffered event before
    /// [`external_transition`][Self::external_transition].
    fn apply_event(&mut self, _event: &Event) -> ModelResult<()> {
        Ok(())
    }

    fn external_transition(&mut self, _elapsed: Duration) -> ModelResult<()> {
        Ok(())
    }

    fn confluent_transition(&mut self, _elapsed: Duration) -> ModelResult<()> {
        Err(ModelError::Unimplemented { hook: "confluent_transition" })
    }

    /// Bring continuous state forward by `elapsed` without consuming an event.
    fn causal_transition(&mut self, _elapsed: Duration) -> ModelResult<()> {
        Ok(())
    }

    fn end_simulation(&mut self, _end: Time) -> ModelResult<()> {
        Ok(())
    }

    /// Receive run parameters; `uri` is this model's URI in the tree.
    fn set_simulation_run_parameters(
        &mut self,
        _uri:    &str,
        _params: &RunParameters,
    ) -> ModelResult<()> {
        Ok(())
    }

    /// The value cell of an exported or internal variable.
    fn value_of(&self, _name: &str) -> Option<AnyValue> {
        None
    }

    /// Type of the import slot `name`, if the model has one.  Composition
    /// checks every slot it is about to bind through this before binding any.
    fn import_type(&self, _name: &str) -> Option<VariableType> {
        None
    }

    /// Install a producer's value into the import slot `name`.
    fn bind_imported(&mut self, name: &str, _value: &AnyValue) -> ModelResult<()> {
        Err(ModelError::UnknownVariable {
            model: String::from("<model without variables>"),
            name:  name.to_owned(),
        })
    }

    fn final_report(&self, uri: &str) -> SimulationReport {
        SimulationReport::empty(uri)
    }
}
