//! `devs-core`: foundational types for the `rust_devs` simulation kernel.
//!
//! This crate is a dependency of every other `devs-*` crate.  It intentionally
//! has no `devs-*` dependencies and minimal external ones (only `rand` and
//! `thiserror`, plus optional `serde`).
//!
//! # What lives here
//!
//! | Module          | Contents                                              |
//! |-----------------|-------------------------------------------------------|
//! | [`ids`]         | `NodeId` (arena index of a model/engine)              |
//! | [`time`]        | `TimeUnit`, `Time`, `Duration` (with `INFINITY`)      |
//! | [`event`]       | `EventType`, `Event`, `EventSource`, `EventSink`      |
//! | [`converter`]   | `Converter`: composable `Event → Event` mapping      |
//! | [`value`]       | `Value`, `ImportedValue`, `AnyValue`, variable descriptors |
//! | [`params`]      | `RunParameters` handed to models before a run         |
//! | [`report`]      | `SimulationReport`, `ReportPayload`                   |
//! | [`rng`]         | `SimRng` (seeded, used for tie-breaking)              |
//! | [`error`]       | `CoreError`, `CoreResult`                             |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                     |
//! |---------|------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to time and id types.       |

pub mod converter;
pub mod error;
pub mod event;
pub mod ids;
pub mod params;
pub mod report;
pub mod rng;
pub mod time;
pub mod value;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use converter::Converter;
pub use error::{CoreError, CoreResult};
pub use event::{Event, EventSink, EventSource, EventType};
pub use ids::NodeId;
pub use params::RunParameters;
pub use report::{ReportPayload, SimulationReport};
pub use rng::SimRng;
pub use time::{Duration, Time, TimeUnit};
pub use value::{
    AnyValue, ImportSlot, ImportedValue, Value, VariableDescriptor, VariableKey, VariableSink,
    VariableSource, VariableType, Visibility,
};
