//! Final simulation reports.
//!
//! A report mirrors the model tree: one node per model, with an optional
//! payload whose type is owned by the model that produced it.  The kernel
//! never inspects payloads; callers recover them with
//! [`SimulationReport::payload_as`].

use std::any::Any;
use std::fmt;

/// Anything a model may return as its report payload.
pub trait ReportPayload: fmt::Debug + Send + 'static {
    fn as_any(&self) -> &dyn Any;
}

impl<T: fmt::Debug + Send + 'static> ReportPayload for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct SimulationReport {
    pub model_uri: String,
    pub payload:   Option<Box<dyn ReportPayload>>,
    pub children:  Vec<SimulationReport>,
}

impl SimulationReport {
    /// A leaf report without payload.
    pub fn empty(model_uri: impl Into<String>) -> Self {
        Self { model_uri: model_uri.into(), payload: None, children: Vec::new() }
    }

    /// A leaf report carrying `payload`.
    pub fn atomic(model_uri: impl Into<String>, payload: impl ReportPayload) -> Self {
        Self {
            model_uri: model_uri.into(),
            payload:   Some(Box::new(payload)),
            children:  Vec::new(),
        }
    }

    /// A coupled model's report composed from its children's.
    pub fn coupled(model_uri: impl Into<String>, children: Vec<SimulationReport>) -> Self {
        Self { model_uri: model_uri.into(), payload: None, children }
    }

    /// The payload downcast to `T`.
    pub fn payload_as<T: 'static>(&self) -> Option<&T> {
        self.payload.as_deref()?.as_any().downcast_ref::<T>()
    }

    /// Depth-first search for the report of `model_uri`.
    pub fn find(&self, model_uri: &str) -> Option<&SimulationReport> {
        if self.model_uri == model_uri {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(model_uri))
    }

    pub fn find_mut(&mut self, model_uri: &str) -> Option<&mut SimulationReport> {
        if self.model_uri == model_uri {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(model_uri))
    }

    /// Replace the node with `report`'s uri by `report`.  `false` if there
    /// is no such node.
    pub fn graft(&mut self, report: SimulationReport) -> bool {
        match self.find_mut(&report.model_uri) {
            Some(node) => {
                *node = report;
                true
            }
            None => false,
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.model_uri, indent = depth * 2)?;
        match &self.payload {
            Some(p) => writeln!(f, ": {p:?}")?,
            None    => writeln!(f)?,
        }
        for child in &self.children {
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
