use devs_compose::CompositionError;
use devs_core::EventType;
use devs_engine::EngineError;
use devs_model::ModelError;
use devs_rt::RtError;
use thiserror::Error;

use crate::EngineCreationMode;

#[derive(Debug, Error)]
pub enum ArchError {
    // ── Descriptor validation ─────────────────────────────────────────────

    #[error("more than one descriptor for {0:?}")]
    DuplicateUri(String),

    #[error("root model {0:?} has no descriptor")]
    UnknownRoot(String),

    #[error("{coupled:?} lists {model:?}, which has no descriptor")]
    UnknownSubmodel { coupled: String, model: String },

    #[error("{model:?} is a submodel of both {first:?} and {second:?}")]
    MultipleParents { model: String, first: String, second: String },

    #[error("root model {0:?} is listed as a submodel")]
    RootIsSubmodel(String),

    #[error("{0:?} is not reachable from the root model")]
    Unreachable(String),

    #[error("{coupled:?} refers to {model:?}, which it does not contain")]
    NotASubmodel { coupled: String, model: String },

    #[error("{coupled:?}: {model:?} does not import {event_type}")]
    MissingImport { coupled: String, model: String, event_type: EventType },

    #[error("{coupled:?}: {model:?} does not export {event_type}")]
    MissingExport { coupled: String, model: String, event_type: EventType },

    #[error("{coupled:?}: connection sinks {event_type} from {model:?} back into itself")]
    SelfLoop { coupled: String, model: String, event_type: EventType },

    #[error("{coupled:?} reexports {event_type} from more than one origin")]
    NonUniqueReexport { coupled: String, event_type: EventType },

    #[error("{uri:?} cannot be driven by a {mode:?} engine")]
    ModeMismatch { uri: String, mode: EngineCreationMode },

    #[error("{uri:?} is paced on its own thread but both imports and exports {event_type}")]
    AmbiguousBoundary { uri: String, event_type: EventType },

    #[error("{coupled:?} binds variables of {uri:?}, which is paced on its own thread")]
    VariablesAcrossThreads { coupled: String, uri: String },

    #[error("invalid acceleration factor {0}")]
    InvalidAcceleration(f64),

    #[error("architecture rooted at {0:?} is not real-time")]
    NotRealTime(String),

    // ── Blueprints ────────────────────────────────────────────────────────

    #[error("no model factory registered as {0:?}")]
    UnknownFactory(String),

    #[error("no converter registered as {0:?}")]
    UnknownConverter(String),

    #[error("no variable type registered as {0:?}")]
    UnknownVariableType(String),

    #[error("blueprint parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Building and running ──────────────────────────────────────────────

    #[error("creating {uri:?} failed: {source}")]
    Model {
        uri:    String,
        #[source]
        source: ModelError,
    },

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    RealTime(#[from] RtError),
}

pub type ArchResult<T> = Result<T, ArchError>;
