//! Real-time execution for `rust_devs` simulations.
//!
//! | Module           | Contents                                                   |
//! |------------------|------------------------------------------------------------|
//! | [`acceleration`] | [`AccelerationFactor`]: simulated per wall time            |
//! | [`clock`]        | [`WallClock`] trait and the tokio implementation           |
//! | [`driver`]       | [`RealTimeDriver`], the pacing loop                        |
//! | [`handle`]       | [`RtHandle`], the commands it sends, [`ExportTarget`]      |
//! | [`remote`]       | [`RemoteSubtree`], a leaf standing in for another thread   |
//! | [`spawn`]        | [`RtSpawner`] and [`spawn_rt_simulation`] on a new thread  |
//!
//! The driver runs on a single-threaded tokio runtime.  It sleeps until the
//! wall instant of the next internal event, steps the simulator, and in
//! between delivers events injected through an [`RtHandle`] at the
//! simulated time matching the wall clock.
//!
//! A subtree can be paced by its own driver on its own thread.  Its parent
//! holds a [`RemoteSubtree`] in its place: events routed to the stand-in
//! are injected into the subtree's run, and the subtree's exports are
//! injected back into the stand-in.  Ending a run ends its subtrees first.

pub mod acceleration;
pub mod clock;
pub mod driver;
pub mod error;
pub mod handle;
pub mod remote;
pub mod spawn;

#[cfg(test)]
mod tests;

pub use acceleration::AccelerationFactor;
pub use clock::{TokioClock, WallClock};
pub use driver::{RealTimeDriver, RtOutcome};
pub use error::{RtError, RtResult};
pub use handle::{ExportTarget, RtCommand, RtCommands, RtHandle};
pub use remote::{RemoteSubtree, RemoteSubtreeReport};
pub use spawn::{RtSimulation, RtSpawner, end_subtrees, spawn_rt_simulation};
