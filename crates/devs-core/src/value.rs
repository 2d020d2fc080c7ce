//! Shared continuous-state cells (HIOA variables).
//!
//! # Ownership
//!
//! A [`Value<T>`] is created by the model that owns the variable and is the
//! only handle that can write it.  Importing models receive an
//! [`ImportedValue<T>`]: a read-only, *non-owning* (`Weak`) view of the same
//! cell.  Reads are zero-copy with respect to the cell and always observe the
//! latest write together with its timestamp; no polling or propagation is
//! involved.
//!
//! Values are `!Send`: a model tree and all its values live on a single
//! thread, and the kernel's step ordering guarantees the owner writes before
//! any importer reads within one simulated instant.
//!
//! During composition values travel type-erased as [`AnyValue`]; the typed
//! view is recovered with [`AnyValue::downcast_import`].

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use crate::{CoreError, CoreResult, Time};

// ── Descriptors ───────────────────────────────────────────────────────────────

/// Who may see a variable.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Visibility {
    /// Read from another model's export.
    Imported,
    /// Written by this model, readable by importers.
    Exported,
    /// Private to the owning model.
    Internal,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Visibility::Imported => "imported",
            Visibility::Exported => "exported",
            Visibility::Internal => "internal",
        })
    }
}

/// Runtime tag of a variable's Rust type.
#[derive(Copy, Clone, Debug)]
pub struct VariableType {
    id:   TypeId,
    name: &'static str,
}

impl VariableType {
    pub fn of<T: 'static>() -> Self {
        Self { id: TypeId::of::<T>(), name: std::any::type_name::<T>() }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for VariableType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for VariableType {}

impl Hash for VariableType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for VariableType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VariableType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(other.name).then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Static declaration of one variable of a model.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct VariableDescriptor {
    pub name:       String,
    pub ty:         VariableType,
    pub visibility: Visibility,
}

impl VariableDescriptor {
    pub fn new(name: impl Into<String>, ty: VariableType, visibility: Visibility) -> Self {
        Self { name: name.into(), ty, visibility }
    }

    pub fn imported<T: 'static>(name: impl Into<String>) -> Self {
        Self::new(name, VariableType::of::<T>(), Visibility::Imported)
    }

    pub fn exported<T: 'static>(name: impl Into<String>) -> Self {
        Self::new(name, VariableType::of::<T>(), Visibility::Exported)
    }

    pub fn internal<T: 'static>(name: impl Into<String>) -> Self {
        Self::new(name, VariableType::of::<T>(), Visibility::Internal)
    }

    pub fn key(&self) -> VariableKey {
        VariableKey { name: self.name.clone(), ty: self.ty }
    }
}

/// A `(name, type)` pair naming a variable of the model at hand.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct VariableKey {
    pub name: String,
    pub ty:   VariableType,
}

impl VariableKey {
    pub fn new(name: impl Into<String>, ty: VariableType) -> Self {
        Self { name: name.into(), ty }
    }

    pub fn of<T: 'static>(name: impl Into<String>) -> Self {
        Self::new(name, VariableType::of::<T>())
    }
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

/// A variable exported by a named model.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct VariableSource {
    pub model_uri: String,
    pub name:      String,
    pub ty:        VariableType,
}

impl VariableSource {
    pub fn new(model_uri: impl Into<String>, name: impl Into<String>, ty: VariableType) -> Self {
        Self { model_uri: model_uri.into(), name: name.into(), ty }
    }

    pub fn of<T: 'static>(model_uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(model_uri, name, VariableType::of::<T>())
    }

    pub fn key(&self) -> VariableKey {
        VariableKey::new(self.name.clone(), self.ty)
    }
}

impl fmt::Display for VariableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.model_uri, self.name)
    }
}

/// A variable imported by a named model.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct VariableSink {
    pub model_uri: String,
    pub name:      String,
    pub ty:        VariableType,
}

impl VariableSink {
    pub fn new(model_uri: impl Into<String>, name: impl Into<String>, ty: VariableType) -> Self {
        Self { model_uri: model_uri.into(), name: name.into(), ty }
    }

    pub fn of<T: 'static>(model_uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(model_uri, name, VariableType::of::<T>())
    }

    pub fn key(&self) -> VariableKey {
        VariableKey::new(self.name.clone(), self.ty)
    }
}

impl fmt::Display for VariableSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.model_uri, self.name)
    }
}

// ── Value cells ───────────────────────────────────────────────────────────────

struct ValueCell<T> {
    owner:       String,
    visibility:  Visibility,
    data:        T,
    last_update: Option<Time>,
}

/// The owning, writable handle on a variable.
pub struct Value<T> {
    cell: Rc<RefCell<ValueCell<T>>>,
}

impl<T: Clone + 'static> Value<T> {
    /// A new cell holding `initial`, not yet stamped with a time.
    pub fn new(owner: impl Into<String>, visibility: Visibility, initial: T) -> Self {
        Self {
            cell: Rc::new(RefCell::new(ValueCell {
                owner: owner.into(),
                visibility,
                data: initial,
                last_update: None,
            })),
        }
    }

    pub fn get(&self) -> T {
        self.cell.borrow().data.clone()
    }

    /// Time of the last write, `None` before the first one.
    pub fn time(&self) -> Option<Time> {
        self.cell.borrow().last_update
    }

    pub fn is_initialised(&self) -> bool {
        self.time().is_some()
    }

    /// Write `data` as the value at simulated time `time`.
    pub fn set(&self, data: T, time: Time) {
        let mut cell = self.cell.borrow_mut();
        cell.data = data;
        cell.last_update = Some(time);
    }

    pub fn owner(&self) -> String {
        self.cell.borrow().owner.clone()
    }

    pub fn visibility(&self) -> Visibility {
        self.cell.borrow().visibility
    }

    /// A read-only, non-owning view of this cell.
    pub fn reader(&self) -> ImportedValue<T> {
        ImportedValue { cell: Rc::downgrade(&self.cell) }
    }

    /// Type-erased handle used to hand the cell to importers.
    pub fn erase(&self) -> AnyValue {
        let cell: Rc<dyn Any> = self.cell.clone();
        AnyValue {
            ty:    VariableType::of::<T>(),
            owner: self.owner(),
            cell,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.cell.borrow();
        f.debug_struct("Value")
            .field("owner", &cell.owner)
            .field("visibility", &cell.visibility)
            .field("data", &cell.data)
            .field("last_update", &cell.last_update)
            .finish()
    }
}

/// A read-only reference to a value owned by another model.
pub struct ImportedValue<T> {
    cell: Weak<RefCell<ValueCell<T>>>,
}

impl<T> Clone for ImportedValue<T> {
    fn clone(&self) -> Self {
        Self { cell: Weak::clone(&self.cell) }
    }
}

impl<T: Clone + 'static> ImportedValue<T> {
    fn upgrade(&self) -> CoreResult<Rc<RefCell<ValueCell<T>>>> {
        self.cell.upgrade().ok_or(CoreError::ValueDropped)
    }

    pub fn get(&self) -> CoreResult<T> {
        Ok(self.upgrade()?.borrow().data.clone())
    }

    pub fn time(&self) -> CoreResult<Option<Time>> {
        Ok(self.upgrade()?.borrow().last_update)
    }

    /// Data and timestamp read under one borrow.
    pub fn read(&self) -> CoreResult<(T, Option<Time>)> {
        let cell = self.upgrade()?;
        let cell = cell.borrow();
        Ok((cell.data.clone(), cell.last_update))
    }

    pub fn owner(&self) -> CoreResult<String> {
        Ok(self.upgrade()?.borrow().owner.clone())
    }
}

/// A type-erased value handle, produced by [`Value::erase`].
#[derive(Clone)]
pub struct AnyValue {
    ty:    VariableType,
    owner: String,
    cell:  Rc<dyn Any>,
}

impl AnyValue {
    pub fn ty(&self) -> VariableType {
        self.ty
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Recover a typed, read-only view.
    pub fn downcast_import<T: Clone + 'static>(&self) -> CoreResult<ImportedValue<T>> {
        let cell = Rc::clone(&self.cell)
            .downcast::<RefCell<ValueCell<T>>>()
            .map_err(|_| CoreError::ValueTypeMismatch {
                expected: std::any::type_name::<T>(),
                found:    self.ty.name(),
            })?;
        Ok(ImportedValue { cell: Rc::downgrade(&cell) })
    }

    /// Whether both handles refer to the same cell.
    pub fn same_cell(&self, other: &AnyValue) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl fmt::Debug for AnyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyValue")
            .field("ty", &self.ty)
            .field("owner", &self.owner)
            .finish()
    }
}

// ── ImportSlot ────────────────────────────────────────────────────────────────

/// A model-side slot for an imported variable, filled during composition.
pub struct ImportSlot<T> {
    name:    String,
    binding: Option<ImportedValue<T>>,
}

impl<T: Clone + 'static> ImportSlot<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), binding: None }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Install the producer's value.  Rebinding replaces the previous one.
    pub fn bind(&mut self, value: &AnyValue) -> CoreResult<()> {
        self.binding = Some(value.downcast_import::<T>()?);
        Ok(())
    }

    fn bound(&self) -> CoreResult<&ImportedValue<T>> {
        self.binding
            .as_ref()
            .ok_or_else(|| CoreError::UnboundImport(self.name.clone()))
    }

    pub fn get(&self) -> CoreResult<T> {
        self.bound()?.get()
    }

    pub fn read(&self) -> CoreResult<(T, Option<Time>)> {
        self.bound()?.read()
    }
}
