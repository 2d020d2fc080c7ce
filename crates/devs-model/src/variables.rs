//! Per-model store of owned values and bound imports.

use std::collections::BTreeMap;

use devs_core::{AnyValue, ImportedValue, Value, VariableType, Visibility};

use crate::{ModelDeclarations, ModelError, ModelResult};

struct Entry {
    ty:         VariableType,
    visibility: Visibility,
    value:      Option<AnyValue>,
}

/// The variables of one model instance, keyed by name.
///
/// Exported and internal variables are registered with the model's own
/// [`Value`] handles; imported variables start unbound and are filled in by
/// the composer through [`bind_imported`][Self::bind_imported].  A model
/// forwards its `value_of`/`bind_imported` hooks here.
pub struct VariableTable {
    owner:   String,
    entries: BTreeMap<String, Entry>,
}

impl VariableTable {
    pub fn new(owner: impl Into<String>) -> Self {
        Self { owner: owner.into(), entries: BTreeMap::new() }
    }

    /// A table with an unbound slot for every declared import.
    pub fn for_declarations(owner: impl Into<String>, declarations: &ModelDeclarations) -> Self {
        let mut table = Self::new(owner);
        for var in declarations.variables_with(Visibility::Imported) {
            table.declare_import(var.name.clone(), var.ty);
        }
        table
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn declare_import(&mut self, name: impl Into<String>, ty: VariableType) {
        self.entries.insert(name.into(), Entry { ty, visibility: Visibility::Imported, value: None });
    }

    /// Register an owned (exported or internal) value under `name`.
    pub fn register<T: Clone + 'static>(&mut self, name: impl Into<String>, value: &Value<T>) {
        self.entries.insert(name.into(), Entry {
            ty:         VariableType::of::<T>(),
            visibility: value.visibility(),
            value:      Some(value.erase()),
        });
    }

    /// Owned value cell of an exported or internal variable.
    pub fn value_of(&self, name: &str) -> Option<AnyValue> {
        self.entries
            .get(name)
            .filter(|e| e.visibility != Visibility::Imported)
            .and_then(|e| e.value.clone())
    }

    pub fn import_type(&self, name: &str) -> Option<VariableType> {
        self.entries
            .get(name)
            .filter(|e| e.visibility == Visibility::Imported)
            .map(|e| e.ty)
    }

    pub fn bind_imported(&mut self, name: &str, value: &AnyValue) -> ModelResult<()> {
        let entry = self
            .entries
            .get_mut(name)
            .filter(|e| e.visibility == Visibility::Imported)
            .ok_or_else(|| ModelError::UnknownVariable {
                model: self.owner.clone(),
                name:  name.to_owned(),
            })?;
        if entry.ty != value.ty() {
            return Err(devs_core::CoreError::ValueTypeMismatch {
                expected: entry.ty.name(),
                found:    value.ty().name(),
            }
            .into());
        }
        entry.value = Some(value.clone());
        Ok(())
    }

    /// Typed read-only view of the import `name`.
    pub fn imported<T: Clone + 'static>(&self, name: &str) -> ModelResult<ImportedValue<T>> {
        let entry = self
            .entries
            .get(name)
            .filter(|e| e.visibility == Visibility::Imported)
            .ok_or_else(|| ModelError::UnknownVariable {
                model: self.owner.clone(),
                name:  name.to_owned(),
            })?;
        let value = entry
            .value
            .as_ref()
            .ok_or_else(|| devs_core::CoreError::UnboundImport(name.to_owned()))?;
        Ok(value.downcast_import::<T>()?)
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|e| e.value.is_some())
    }

    /// Names of imports still waiting for a producer.
    pub fn unbound_imports(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, e)| e.value.is_none())
            .map(|(n, _)| n.as_str())
    }
}
