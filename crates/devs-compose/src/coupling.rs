//! Coupled-model definitions: submodels plus event and variable wiring.

use devs_core::{Converter, EventSink, EventSource, EventType, VariableSink, VariableSource, VariableType};

/// A reexported event: the coupled model exports `source` under its own
/// event type, after applying `converter`.
#[derive(Clone, Debug)]
pub struct Reexport {
    pub event_type: EventType,
    pub source:     EventSource,
    pub converter:  Option<Converter>,
}

impl Reexport {
    pub fn converter(&self) -> Converter {
        self.converter.clone().unwrap_or_default()
    }
}

/// An event type the coupled model imports, forwarded to one submodel sink.
#[derive(Clone, Debug)]
pub struct ImportEdge {
    pub event_type: EventType,
    pub sink:       EventSink,
}

/// One submodel export feeding one submodel import.
#[derive(Clone, Debug)]
pub struct Connection {
    pub source: EventSource,
    pub sink:   EventSink,
}

/// A variable the coupled model imports, forwarded to a submodel import.
#[derive(Clone, Debug)]
pub struct ImportedVariable {
    pub name: String,
    pub sink: VariableSink,
}

/// A submodel variable exported under the coupled model's own name.
#[derive(Clone, Debug)]
pub struct ReexportedVariable {
    pub name:   String,
    pub source: VariableSource,
}

/// A submodel export bound to a sibling's import.
#[derive(Clone, Debug)]
pub struct Binding {
    pub source: VariableSource,
    pub sink:   VariableSink,
}

/// Definition of one coupled model.
///
/// Entries are kept in insertion order and duplicates are preserved so that
/// the composer can report them rather than silently keep the last one.
///
/// # Example
///
/// ```rust,ignore
/// let coupling = Coupling::new("house")
///     .with_submodels(["heater", "thermostat"])
///     .with_connection(
///         EventSource::new("thermostat", "SwitchOn"),
///         EventSink::new("heater", "SwitchOn"),
///     )
///     .with_binding(
///         VariableSource::of::<f64>("heater", "temperature"),
///         VariableSink::of::<f64>("thermostat", "temperature"),
///     );
/// ```
#[derive(Clone, Debug, Default)]
pub struct Coupling {
    pub uri:             String,
    pub submodels:       Vec<String>,
    pub imported:        Vec<ImportEdge>,
    pub reexported:      Vec<Reexport>,
    pub connections:     Vec<Connection>,
    pub imported_vars:   Vec<ImportedVariable>,
    pub reexported_vars: Vec<ReexportedVariable>,
    pub bindings:        Vec<Binding>,
}

impl Coupling {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into(), ..Self::default() }
    }

    pub fn with_submodel(mut self, uri: impl Into<String>) -> Self {
        self.submodels.push(uri.into());
        self
    }

    pub fn with_submodels<I, S>(mut self, uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.submodels.extend(uris.into_iter().map(Into::into));
        self
    }

    /// Forward this model's imported `event_type` to `sink`.
    pub fn with_import(mut self, event_type: impl Into<EventType>, sink: EventSink) -> Self {
        self.imported.push(ImportEdge { event_type: event_type.into(), sink });
        self
    }

    /// Export `source` as this model's `event_type`.
    pub fn with_reexport(
        mut self,
        event_type: impl Into<EventType>,
        source: EventSource,
        converter: Option<Converter>,
    ) -> Self {
        self.reexported.push(Reexport { event_type: event_type.into(), source, converter });
        self
    }

    pub fn with_connection(mut self, source: EventSource, sink: EventSink) -> Self {
        self.connections.push(Connection { source, sink });
        self
    }

    pub fn with_imported_var(mut self, name: impl Into<String>, sink: VariableSink) -> Self {
        self.imported_vars.push(ImportedVariable { name: name.into(), sink });
        self
    }

    pub fn with_reexported_var(mut self, name: impl Into<String>, source: VariableSource) -> Self {
        self.reexported_vars.push(ReexportedVariable { name: name.into(), source });
        self
    }

    pub fn with_binding(mut self, source: VariableSource, sink: VariableSink) -> Self {
        self.bindings.push(Binding { source, sink });
        self
    }

    // ── Lookups used during resolution ────────────────────────────────────

    /// The (first) reexport entry for `event_type`.
    pub fn reexport_of(&self, event_type: &EventType) -> Option<&Reexport> {
        self.reexported.iter().find(|r| &r.event_type == event_type)
    }

    pub fn import_edges_of<'a>(&'a self, event_type: &'a EventType) -> impl Iterator<Item = &'a ImportEdge> + 'a {
        self.imported.iter().filter(move |e| &e.event_type == event_type)
    }

    pub fn reexported_var(&self, name: &str, ty: VariableType) -> Option<&ReexportedVariable> {
        self.reexported_vars
            .iter()
            .find(|r| r.name == name && r.source.ty == ty)
    }

    pub fn imported_var_sinks<'a>(
        &'a self,
        name: &'a str,
        ty: VariableType,
    ) -> impl Iterator<Item = &'a VariableSink> + 'a {
        self.imported_vars
            .iter()
            .filter(move |v| v.name == name && v.sink.ty == ty)
            .map(|v| &v.sink)
    }
}
