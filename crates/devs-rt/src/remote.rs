//! Stand-in leaf for a subtree paced on another thread.

use std::collections::BTreeSet;

use devs_core::{Duration, Event, EventType, SimulationReport, Time, TimeUnit};
use devs_model::{AtomicModel, ModelDeclarations, ModelResult};

use crate::RtHandle;

/// What a [`RemoteSubtree`] did, until the subtree's own report replaces it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoteSubtreeReport {
    /// Events passed on to the subtree.
    pub forwarded: u64,
    /// Subtree exports emitted into the parent.
    pub emitted:   u64,
    /// Events that arrived after the subtree had finished.
    pub dropped:   u64,
}

/// Takes the place of a separately paced subtree in its parent's tree.
///
/// Events routed to it whose type the subtree imports go to the subtree's
/// driver.  The subtree's exports come back injected into this leaf, and
/// are emitted at the instant they arrive.  A subtree may not import and
/// export the same event type.
pub struct RemoteSubtree {
    handle:   RtHandle,
    exports:  BTreeSet<EventType>,
    outgoing: Vec<Event>,
    unit:     TimeUnit,
    report:   RemoteSubtreeReport,
}

impl RemoteSubtree {
    /// A stand-in for the subtree with `declarations`, driven through `handle`.
    pub fn new(handle: RtHandle, declarations: &ModelDeclarations, unit: TimeUnit) -> Self {
        Self {
            handle,
            exports: declarations.exported_events().cloned().collect(),
            outgoing: Vec::new(),
            unit,
            report: RemoteSubtreeReport::default(),
        }
    }

    /// Declarations of the stand-in: the subtree's events, with its exports
    /// imported too so they can be injected back.
    pub fn declarations(subtree: &ModelDeclarations) -> ModelDeclarations {
        let mut declarations = ModelDeclarations::new();
        for event_type in subtree.imported_events() {
            declarations = declarations.with_import(event_type.clone());
        }
        for event_type in subtree.exported_events() {
            declarations = declarations.with_import(event_type.clone()).with_export(event_type.clone());
        }
        declarations
    }
}

impl AtomicModel for RemoteSubtree {
    fn time_advance(&self) -> Duration {
        if self.outgoing.is_empty() { Duration::INFINITY } else { Duration::zero(self.unit) }
    }

    fn apply_event(&mut self, event: &Event) -> ModelResult<()> {
        if self.exports.contains(event.event_type()) {
            self.outgoing.push(event.clone());
        } else if self.handle.inject_imported(event.clone()).is_ok() {
            self.report.forwarded += 1;
        } else {
            self.report.dropped += 1;
            tracing::warn!(event_type = event.event_type().as_str(), "subtree has finished; event dropped");
        }
        Ok(())
    }

    fn output(&mut self, current: Time) -> ModelResult<Vec<Event>> {
        Ok(self.outgoing.iter().map(|e| e.clone().restamped(current)).collect())
    }

    fn internal_transition(&mut self, _elapsed: Duration) -> ModelResult<()> {
        self.report.emitted += self.outgoing.len() as u64;
        self.outgoing.clear();
        Ok(())
    }

    fn final_report(&self, uri: &str) -> SimulationReport {
        SimulationReport::atomic(uri, self.report.clone())
    }
}
