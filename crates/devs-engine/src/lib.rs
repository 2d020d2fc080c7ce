//! `devs-engine`: engines, step protocol and run control.
//!
//! # Crate layout
//!
//! | Module          | Contents                                                    |
//! |-----------------|-------------------------------------------------------------|
//! | [`clock`]       | `EngineClock`, `SimulationEngine`                           |
//! | [`protocol`]    | `ProtocolState`: the step protocol state machine           |
//! | [`atomic`]      | `AtomicEngine`: drives one atomic model                    |
//! | [`coordinator`] | `CoordinationEngine`: drives one coupled model             |
//! | [`select`]      | `TieBreakPolicy` and the built-in policies                  |
//! | [`simulator`]   | `Simulator`: run control over a sealed tree                |
//! | [`builder`]     | `SimulatorBuilder`: fluent construction                    |
//! | [`observer`]    | `SimObserver`, `StepKind`, `NoopObserver`                   |
//! | [`config`]      | `SimulationConfig`, `CollisionPolicy`                       |
//! | [`error`]       | `EngineError`, `EngineResult<T>`                            |
//!
//! # Stepping
//!
//! One call to [`Simulator::step`] performs the root's next internal event:
//!
//! 1. **Output**: the leaf holding the next event emits its output.  Each
//!    event is delivered through the root's flattened routes straight into
//!    consumer leaves' input buffers, and every ancestor of a consumer marks
//!    the path as active.  Events reexported by the root go to an outbox
//!    (see [`Simulator::take_exported_events`]).
//! 2. **Internal**: every coordinator on the path to that leaf advances its
//!    clock and steps the child holding the event.  If the child is HIOA, its
//!    HIOA siblings are brought to the same instant by causal steps, in
//!    producer-to-consumer order.
//! 3. **External**: each coordinator then gives its active children an
//!    external step with the time elapsed since their last event, bringing
//!    their HIOA producers up to date first.  A child whose own next event
//!    falls on the same instant is resolved by
//!    [`SimulationConfig::collisions`].
//!
//! Outside a step, every coordinator satisfies virtual synchrony: each
//! child's last-event time plus its elapsed time equals the coordinator's
//! last-event time.  With [`SimulationConfig::check_invariants`] set, this
//! and clock consistency are verified after every step.

pub mod atomic;
pub mod builder;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
mod kernel;
pub mod observer;
pub mod protocol;
pub mod select;
pub mod simulator;

#[cfg(test)]
mod tests;

pub use atomic::AtomicEngine;
pub use builder::SimulatorBuilder;
pub use clock::{EngineClock, SimulationEngine};
pub use config::{CollisionPolicy, SimulationConfig};
pub use coordinator::CoordinationEngine;
pub use error::{EngineError, EngineResult};
pub use observer::{NoopObserver, SimObserver, StepKind};
pub use protocol::ProtocolState;
pub use select::{FirstCandidate, LexicographicSelect, SeededRandomSelect, TieBreakPolicy};
pub use simulator::Simulator;
