use devs_compose::CompositionError;
use devs_core::{Duration, EventType, Time};
use devs_model::ModelError;
use thiserror::Error;

use crate::ProtocolState;

/// Errors raised while driving a simulation.
///
/// Except for [`EngineError::Poisoned`], every variant means the clock state
/// of the tree can no longer be trusted: the [`Simulator`](crate::Simulator)
/// that raised it refuses further run-control calls.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An operation was invoked from a protocol state that does not allow it.
    #[error("{uri}: {operation} is not allowed in state {state:?}")]
    Protocol {
        uri:       String,
        operation: &'static str,
        state:     ProtocolState,
    },

    /// A step time lies outside `[earliest, latest]`.
    #[error("{uri}: {operation} at {time} outside [{earliest}, {latest}]")]
    TimeOutOfRange {
        uri:       String,
        operation: &'static str,
        time:      Time,
        earliest:  Time,
        latest:    Time,
    },

    /// `next_time_advance != time_of_next_event - time_of_last_event`.
    #[error("{uri}: next time advance {actual} does not match {expected} ({operation})")]
    ClockInconsistency {
        uri:       String,
        operation: &'static str,
        expected:  Duration,
        actual:    Duration,
    },

    /// `child.time_of_last_event + elapsed != coordinator.time_of_last_event`.
    #[error("{coordinator}: child {child} is at {child_time} + elapsed, expected {expected}")]
    VirtualSynchrony {
        coordinator: String,
        child:       String,
        child_time:  Time,
        expected:    Time,
    },

    #[error("{uri}: internal step requested with no scheduled event")]
    NoScheduledEvent { uri: String },

    #[error("{uri}: {operation} is not implemented")]
    Unimplemented { uri: String, operation: &'static str },

    #[error("unknown model {0:?}")]
    UnknownModel(String),

    #[error("{child:?} is not a submodel of {coordinator:?}")]
    NotAChild { coordinator: String, child: String },

    #[error("{0:?} is not an atomic model")]
    NotAtomic(String),

    #[error("{0:?} is not a coupled model")]
    NotCoupled(String),

    #[error("{uri:?} does not import events of type {event_type}")]
    NotImported { uri: String, event_type: EventType },

    #[error("{coordinator}: tie-break returned {index} for {candidates} candidates")]
    InvalidSelection {
        coordinator: String,
        index:       usize,
        candidates:  usize,
    },

    #[error("model tree has no root; seal it before building a simulator")]
    NotSealed,

    #[error("simulation has not been initialised")]
    NotInitialised,

    #[error("simulator is poisoned by an earlier error")]
    Poisoned,

    #[error("{uri}: model error: {source}")]
    Model {
        uri:    String,
        #[source]
        source: ModelError,
    },

    #[error(transparent)]
    Composition(#[from] CompositionError),
}

pub type EngineResult<T> = Result<T, EngineError>;
