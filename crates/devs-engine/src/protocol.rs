//! The DEVS/HIOA step protocol state machine shared by all engines.

use crate::{EngineError, EngineResult};

/// Where an engine is in the step protocol.
///
/// ```text
/// Uninitialised ──initialise──▶ AwaitNextEvent ──end_simulation──▶ Ended
///                                │    ▲
///        internal / external /   │    │  step completed
///        causal / produce_output ▼    │
///                  InternalStep | ExternalStep | CausalStep | ProduceOutput
/// ```
///
/// An engine whose step failed stays in the step state, so any further call
/// is rejected.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ProtocolState {
    Uninitialised,
    AwaitNextEvent,
    InternalStep,
    ExternalStep,
    CausalStep,
    ProduceOutput,
    Ended,
}

impl ProtocolState {
    /// Move from `AwaitNextEvent` into the step state `during`.
    pub(crate) fn begin(&mut self, uri: &str, operation: &'static str, during: ProtocolState) -> EngineResult<()> {
        self.require(uri, operation, ProtocolState::AwaitNextEvent)?;
        *self = during;
        Ok(())
    }

    /// Return to `AwaitNextEvent` after a completed step.
    pub(crate) fn finish(&mut self) {
        *self = ProtocolState::AwaitNextEvent;
    }

    pub(crate) fn require(&self, uri: &str, operation: &'static str, expected: ProtocolState) -> EngineResult<()> {
        if *self != expected {
            return Err(EngineError::Protocol { uri: uri.to_owned(), operation, state: *self });
        }
        Ok(())
    }
}
