//! Descriptors of the models in an architecture.

use std::fmt;
use std::sync::Arc;

use devs_compose::Coupling;
use devs_core::TimeUnit;
use devs_model::{AtomicModel, DeclaredModel, ModelContext, ModelDeclarations, ModelResult};
use devs_rt::AccelerationFactor;
use serde::{Deserialize, Serialize};

use crate::{ArchError, ArchResult};

/// Which engine drives a model.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineCreationMode {
    #[default]
    Atomic,
    AtomicRealTime,
    Coordination,
    CoordinationRealTime,
}

impl EngineCreationMode {
    pub fn is_atomic(self) -> bool {
        matches!(self, Self::Atomic | Self::AtomicRealTime)
    }

    pub fn is_real_time(self) -> bool {
        matches!(self, Self::AtomicRealTime | Self::CoordinationRealTime)
    }
}

/// Creates a fresh model instance for each run.
///
/// `Send + Sync` so an architecture can build its tree on a real-time
/// thread; the models themselves need not be.
pub type ModelFactory = Arc<dyn Fn(&ModelContext) -> ModelResult<Box<dyn AtomicModel>> + Send + Sync>;

// ── AtomicDescriptor ──────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AtomicDescriptor {
    pub uri:                  String,
    pub declarations:         ModelDeclarations,
    pub factory:              ModelFactory,
    pub engine_creation_mode: EngineCreationMode,
    /// Own pace; see [`CoupledDescriptor::acceleration`].
    pub acceleration:         Option<AccelerationFactor>,
}

impl AtomicDescriptor {
    pub fn new<F>(uri: impl Into<String>, declarations: ModelDeclarations, factory: F) -> Self
    where
        F: Fn(&ModelContext) -> ModelResult<Box<dyn AtomicModel>> + Send + Sync + 'static,
    {
        Self {
            uri: uri.into(),
            declarations,
            factory: Arc::new(factory),
            engine_creation_mode: EngineCreationMode::Atomic,
            acceleration: None,
        }
    }

    /// Descriptor for a model type that declares itself.
    pub fn of<M, F>(uri: impl Into<String>, factory: F) -> Self
    where
        M: DeclaredModel,
        F: Fn(&ModelContext) -> ModelResult<M> + Send + Sync + 'static,
    {
        Self::new(uri, M::declarations(), move |ctx| {
            factory(ctx).map(|m| Box::new(m) as Box<dyn AtomicModel>)
        })
    }

    pub fn real_time(mut self) -> Self {
        self.engine_creation_mode = EngineCreationMode::AtomicRealTime;
        self
    }

    /// Real time, paced on its own thread at `acceleration`.
    pub fn paced(mut self, acceleration: AccelerationFactor) -> Self {
        self.acceleration = Some(acceleration);
        self.real_time()
    }

    pub fn with_mode(mut self, mode: EngineCreationMode) -> Self {
        self.engine_creation_mode = mode;
        self
    }

    /// A new instance of the model, placed at this descriptor's URI.
    pub fn instantiate(&self, time_unit: TimeUnit) -> ArchResult<Box<dyn AtomicModel>> {
        (self.factory)(&ModelContext::new(self.uri.clone(), time_unit))
            .map_err(|source| ArchError::Model { uri: self.uri.clone(), source })
    }
}

impl fmt::Debug for AtomicDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicDescriptor")
            .field("uri", &self.uri)
            .field("declarations", &self.declarations)
            .field("engine_creation_mode", &self.engine_creation_mode)
            .field("acceleration", &self.acceleration)
            .finish_non_exhaustive()
    }
}

// ── CoupledDescriptor ─────────────────────────────────────────────────────────

/// A coupled model: its [`Coupling`] plus the engine that drives it.
#[derive(Clone, Debug)]
pub struct CoupledDescriptor {
    pub coupling:             Coupling,
    pub engine_creation_mode: EngineCreationMode,
    /// A real-time model below the root with its own factor is paced on its
    /// own thread, as is one whose parent is not real-time.  Others share
    /// their parent's thread and pace.
    pub acceleration:         Option<AccelerationFactor>,
}

impl CoupledDescriptor {
    pub fn new(coupling: Coupling) -> Self {
        Self { coupling, engine_creation_mode: EngineCreationMode::Coordination, acceleration: None }
    }

    pub fn real_time(mut self) -> Self {
        self.engine_creation_mode = EngineCreationMode::CoordinationRealTime;
        self
    }

    /// Real time, paced on its own thread at `acceleration`.
    pub fn paced(mut self, acceleration: AccelerationFactor) -> Self {
        self.acceleration = Some(acceleration);
        self.real_time()
    }

    pub fn with_mode(mut self, mode: EngineCreationMode) -> Self {
        self.engine_creation_mode = mode;
        self
    }

    pub fn uri(&self) -> &str {
        &self.coupling.uri
    }
}
