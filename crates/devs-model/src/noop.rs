//! A passive model: never schedules an internal event.

use devs_core::{Duration, Event, SimulationReport};

use crate::{AtomicModel, DeclaredModel, ModelDeclarations, ModelResult};

/// An [`AtomicModel`] with an infinite time advance that counts what it
/// receives.
///
/// Useful as a sink in tests or as a placeholder for a model that has not
/// been written yet.  Give it the imports it should accept with
/// [`PassiveModel::declaring`].
#[derive(Debug, Default)]
pub struct PassiveModel {
    received:       u64,
    external_steps: u64,
    last_elapsed:   Option<Duration>,
}

/// Final report payload of a [`PassiveModel`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassiveReport {
    pub received:       u64,
    pub external_steps: u64,
    pub last_elapsed:   Option<Duration>,
}

impl PassiveModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declarations of a passive model importing `event_types`.
    pub fn declaring<I, E>(event_types: I) -> ModelDeclarations
    where
        I: IntoIterator<Item = E>,
        E: Into<devs_core::EventType>,
    {
        event_types
            .into_iter()
            .fold(ModelDeclarations::new(), |d, et| d.with_import(et))
    }
}

impl DeclaredModel for PassiveModel {
    fn declarations() -> ModelDeclarations {
        ModelDeclarations::new()
    }
}

impl AtomicModel for PassiveModel {
    fn time_advance(&self) -> Duration {
        Duration::INFINITY
    }

    fn apply_event(&mut self, _event: &Event) -> ModelResult<()> {
        self.received += 1;
        Ok(())
    }

    fn external_transition(&mut self, elapsed: Duration) -> ModelResult<()> {
        self.external_steps += 1;
        self.last_elapsed = Some(elapsed);
        Ok(())
    }

    fn final_report(&self, uri: &str) -> SimulationReport {
        SimulationReport::atomic(uri, PassiveReport {
            received:       self.received,
            external_steps: self.external_steps,
            last_elapsed:   self.last_elapsed,
        })
    }
}
