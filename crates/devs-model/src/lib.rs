//! `devs-model`: the contract every simulation model implements.
//!
//! # Crate layout
//!
//! | Module             | Contents                                                   |
//! |--------------------|------------------------------------------------------------|
//! | [`model`]          | `AtomicModel` hooks, `DeclaredModel`, `ModelContext`       |
//! | [`declarations`]   | `ModelDeclarations`: static event/variable declarations  |
//! | [`variables`]      | `VariableTable`: per-model store of owned and imported values |
//! | [`hioa`]           | `Dynamics`, `IntegratedVariable`, `ContinuousModel`        |
//! | [`noop`]           | `PassiveModel`: never schedules an event                 |
//! | [`error`]          | `ModelError`, `ModelResult<T>`                             |
//!
//! # Design notes
//!
//! Models declare what they import and export *statically*
//! ([`DeclaredModel::declarations`]), so composition can be validated before
//! a single model is instantiated.  The kernel drives a model only through
//! the [`AtomicModel`] hooks; the hooks never see the engine or the tree.
//!
//! Models are not required to be `Send`: a tree is built and stepped on one
//! thread, which lets models share continuous state through `Rc`-backed
//! [`Value`](devs_core::Value) cells.

pub mod declarations;
pub mod error;
pub mod hioa;
pub mod model;
pub mod noop;
pub mod variables;


pub use declarations::ModelDeclarations;
pub use error::{ModelError, ModelResult};
pub use hioa::{ContinuousModel, ContinuousReport, DerivativeFn, Dynamics, IntegratedVariable};
pub use model::{AtomicModel, DeclaredModel, ModelContext};
pub use noop::{PassiveModel, PassiveReport};
pub use variables::VariableTable;
