//! Error type for core value handling.
//!
//! Sub-crates define their own error enums and wrap `CoreError` as one
//! variant via `#[from]`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("value type mismatch: expected {expected}, found {found}")]
    ValueTypeMismatch {
        expected: &'static str,
        found:    &'static str,
    },

    #[error("imported value was dropped by its owner")]
    ValueDropped,

    #[error("imported variable {0:?} is not bound")]
    UnboundImport(String),
}

/// Shorthand result type for `devs-core`.
pub type CoreResult<T> = Result<T, CoreError>;
