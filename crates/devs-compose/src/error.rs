use devs_core::{EventType, Visibility};
use devs_model::ModelError;
use thiserror::Error;

/// Fatal conditions detected while building a model tree.
///
/// Every variant is raised before any simulated time advances.
#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("a model named {0:?} already exists")]
    DuplicateUri(String),

    #[error("unknown model {0:?}")]
    UnknownModel(String),

    #[error("model {model:?} already belongs to {parent:?}")]
    AlreadyParented { model: String, parent: String },

    #[error("{coupled:?} lists submodel {model:?} twice")]
    DuplicateSubmodel { coupled: String, model: String },

    #[error("{model:?} is not a submodel of {coupled:?}")]
    NotASubmodel { coupled: String, model: String },

    #[error("{model:?} does not import events of type {event_type}")]
    MissingImport { model: String, event_type: EventType },

    #[error("{model:?} does not export events of type {event_type}")]
    MissingExport { model: String, event_type: EventType },

    #[error("edge into {model:?} changes {from} into {to} without a converter")]
    UnconvertedTypeChange {
        model: String,
        from:  EventType,
        to:    EventType,
    },

    #[error("{coupled:?} reexports {event_type} from more than one origin")]
    NonUniqueReexport { coupled: String, event_type: EventType },

    #[error("connection sinks {event_type} from {model:?} back into itself")]
    SelfLoop { model: String, event_type: EventType },

    #[error("{model:?} declares no {visibility} variable {name:?} of type {ty}")]
    MissingVariable {
        model:      String,
        name:       String,
        visibility: Visibility,
        ty:         &'static str,
    },

    #[error("{coupled:?} reexports variable {name:?} from more than one origin")]
    NonUniqueVariableReexport { coupled: String, name: String },

    #[error("{coupled:?} imports variable {name:?} with conflicting types")]
    ConflictingVariableType { coupled: String, name: String },

    #[error("variable {name:?} of {model:?} is bound to itself")]
    SelfBinding { model: String, name: String },

    #[error("imported variable {name:?} of {model:?} is bound more than once")]
    DuplicateBinding { model: String, name: String },

    #[error("{model:?} has no value for declared variable {name:?}")]
    MissingValue { model: String, name: String },

    #[error("imported variable {name:?} of {model:?} is never bound")]
    UnboundImport { model: String, name: String },

    #[error("variable bindings in {coupled:?} form a cycle through {models:?}")]
    HioaCycle { coupled: String, models: Vec<String> },

    #[error("{0:?} is not an atomic model")]
    NotAtomic(String),

    #[error("{0:?} is not a coupled model")]
    NotCoupled(String),

    #[error("{model:?} is not reachable from root {root:?}")]
    Unreachable { root: String, model: String },

    #[error("model {model:?} failed during composition: {source}")]
    Model {
        model:  String,
        #[source]
        source: ModelError,
    },
}

pub type CompositionResult<T> = Result<T, CompositionError>;
