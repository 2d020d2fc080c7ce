use devs_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    /// A hook the model does not support was invoked.
    #[error("{hook} is not implemented by this model")]
    Unimplemented { hook: &'static str },

    #[error("model {model} has no variable {name:?}")]
    UnknownVariable { model: String, name: String },

    #[error("parameter {name:?} of model {model} is invalid: {reason}")]
    InvalidParameter {
        model:  String,
        name:   String,
        reason: String,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    /// Failure raised by user model code.
    #[error("model failure: {0}")]
    Failed(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
