//! Hooks for watching a run without touching the models.

use devs_core::{Event, Time};

/// Which transition an engine performed.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum StepKind {
    Internal,
    External,
    Causal,
}

/// Callbacks invoked by the [`Simulator`](crate::Simulator) as it steps.
///
/// All methods have no-op defaults.  Implement only the ones you need.
///
/// # Example
///
/// ```rust,ignore
/// struct CountExternal(u64);
///
/// impl SimObserver for CountExternal {
///     fn on_step(&mut self, _uri: &str, kind: StepKind, _time: Time) {
///         if kind == StepKind::External { self.0 += 1; }
///     }
/// }
/// ```
pub trait SimObserver {
    /// Called once after every engine has been initialised.
    fn on_initialise(&mut self, _start: Time, _end: Time) {}

    /// Called after every completed step of every engine, atomic or
    /// coordinating, deepest first.
    fn on_step(&mut self, _uri: &str, _kind: StepKind, _time: Time) {}

    /// Called for every event a leaf emits, before it is routed.
    fn on_output(&mut self, _producer: &str, _event: &Event) {}

    /// Called once after every engine has ended.
    fn on_end(&mut self, _end: Time) {}
}

/// A [`SimObserver`] that does nothing.
pub struct NoopObserver;

impl SimObserver for NoopObserver {}
