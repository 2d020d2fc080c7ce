//! Architecture descriptors for `rust_devs`.
//!
//! An [`Architecture`] names every model of a simulation once: atomic
//! models by a factory plus their static declarations, coupled models by
//! their [`Coupling`](devs_compose::Coupling).  It is validated when built and
//! can then produce any number of fresh model trees, simulators or real-time
//! runs.
//!
//! In a real-time run, a real-time model below the root that has its own
//! acceleration factor, or whose parent is not real-time, is paced by its
//! own driver on its own thread.  Such a subtree exchanges events with its
//! parent only; see [`Architecture::spawn_real_time`].
//!
//! | Module           | Contents                                             |
//! |------------------|------------------------------------------------------|
//! | [`descriptor`]   | [`AtomicDescriptor`], [`CoupledDescriptor`], [`EngineCreationMode`] |
//! | [`architecture`] | [`Architecture`] and its builder                     |
//! | [`blueprint`]    | JSON [`Blueprint`]s resolved by a [`ModelRegistry`]  |

pub mod architecture;
pub mod blueprint;
pub mod descriptor;
pub mod error;


pub use architecture::{Architecture, ArchitectureBuilder};
pub use blueprint::{Blueprint, ModelRegistry};
pub use descriptor::{AtomicDescriptor, CoupledDescriptor, EngineCreationMode, ModelFactory};
pub use error::{ArchError, ArchResult};
