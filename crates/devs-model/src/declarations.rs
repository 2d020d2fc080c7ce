//! Static declarations of what a model imports and exports.

use std::collections::BTreeSet;

use devs_core::{EventType, VariableDescriptor, VariableType, Visibility};

/// The event types and variables a model type declares.
///
/// Built with the `with_*` methods and queried by the composer when it checks
/// couplings.  A model that declares at least one variable takes part in the
/// HIOA causal-step protocol.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelDeclarations {
    imported_events: BTreeSet<EventType>,
    exported_events: BTreeSet<EventType>,
    variables:       Vec<VariableDescriptor>,
}

impl ModelDeclarations {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Builder ───────────────────────────────────────────────────────────

    pub fn with_import(mut self, event_type: impl Into<EventType>) -> Self {
        self.imported_events.insert(event_type.into());
        self
    }

    pub fn with_export(mut self, event_type: impl Into<EventType>) -> Self {
        self.exported_events.insert(event_type.into());
        self
    }

    /// Declare a variable.  A later declaration of the same name replaces the
    /// earlier one.
    pub fn with_variable(mut self, descriptor: VariableDescriptor) -> Self {
        self.variables.retain(|v| v.name != descriptor.name);
        self.variables.push(descriptor);
        self
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn imports_event(&self, event_type: &EventType) -> bool {
        self.imported_events.contains(event_type)
    }

    pub fn exports_event(&self, event_type: &EventType) -> bool {
        self.exported_events.contains(event_type)
    }

    pub fn imported_events(&self) -> impl Iterator<Item = &EventType> {
        self.imported_events.iter()
    }

    pub fn exported_events(&self) -> impl Iterator<Item = &EventType> {
        self.exported_events.iter()
    }

    pub fn variables(&self) -> &[VariableDescriptor] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDescriptor> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Whether `name` is declared with the given visibility and type.
    pub fn declares_variable(&self, name: &str, ty: VariableType, visibility: Visibility) -> bool {
        self.variable(name)
            .is_some_and(|v| v.ty == ty && v.visibility == visibility)
    }

    pub fn variables_with(&self, visibility: Visibility) -> impl Iterator<Item = &VariableDescriptor> {
        self.variables.iter().filter(move |v| v.visibility == visibility)
    }

    /// Whether the model carries continuous (HIOA) variables.
    pub fn is_hioa(&self) -> bool {
        !self.variables.is_empty()
    }
}
