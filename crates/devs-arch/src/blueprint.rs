//! JSON blueprints.
//!
//! A blueprint is an [`Architecture`] written as data.  Models, converters
//! and variable types are referred to by name and resolved against a
//! [`ModelRegistry`].
//!
//! ```json
//! {
//!   "root": "house",
//!   "time_unit": "Seconds",
//!   "acceleration_factor": 2.0,
//!   "atomic": [
//!     { "uri": "heater",     "model": "heater",     "real_time": true },
//!     { "uri": "thermostat", "model": "thermostat", "real_time": true }
//!   ],
//!   "coupled": [{
//!     "uri": "house",
//!     "submodels": ["heater", "thermostat"],
//!     "real_time": true,
//!     "connections": [{
//!       "from": { "model": "thermostat", "event_type": "SwitchOn" },
//!       "to":   { "model": "heater",     "event_type": "SwitchOn" }
//!     }],
//!     "bindings": [{
//!       "from": { "model": "heater",     "name": "temperature", "type": "f64" },
//!       "to":   { "model": "thermostat", "name": "temperature", "type": "f64" }
//!     }]
//!   }]
//! }
//! ```
//!
//! Omitted lists are empty; `time_unit` defaults to seconds.  An
//! `acceleration_factor` on an atomic or coupled entry paces that subtree
//! on its own thread.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use devs_compose::Coupling;
use devs_core::{Converter, EventSink, EventSource, EventType, TimeUnit, VariableSink, VariableSource, VariableType};
use devs_model::{AtomicModel, DeclaredModel, ModelContext, ModelDeclarations, ModelResult};
use devs_rt::AccelerationFactor;
use serde::Deserialize;

use crate::{
    ArchError, ArchResult, Architecture, AtomicDescriptor, CoupledDescriptor, EngineCreationMode, ModelFactory,
};

// ── Document ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Blueprint {
    pub root:                String,
    #[serde(default)]
    pub time_unit:           TimeUnit,
    #[serde(default)]
    pub acceleration_factor: Option<f64>,
    #[serde(default)]
    pub atomic:              Vec<AtomicBlueprint>,
    #[serde(default)]
    pub coupled:             Vec<CoupledBlueprint>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AtomicBlueprint {
    pub uri:                 String,
    /// Registry name of the model factory.
    pub model:               String,
    #[serde(default)]
    pub real_time:           bool,
    /// Pace this model on its own thread; implies `real_time`.
    #[serde(default)]
    pub acceleration_factor: Option<f64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoupledBlueprint {
    pub uri:                 String,
    pub submodels:           Vec<String>,
    pub imported:            Vec<ImportBlueprint>,
    pub reexported:          Vec<ReexportBlueprint>,
    pub connections:         Vec<ConnectionBlueprint>,
    pub imported_vars:       Vec<ImportedVarBlueprint>,
    pub reexported_vars:     Vec<ReexportedVarBlueprint>,
    pub bindings:            Vec<BindingBlueprint>,
    pub real_time:           bool,
    /// Pace this subtree on its own thread; implies `real_time`.
    pub acceleration_factor: Option<f64>,
}

/// `model::event_type`.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventEndpoint {
    pub model:      String,
    pub event_type: String,
}

/// `model::name` of a registered type.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableEndpoint {
    pub model: String,
    pub name:  String,
    #[serde(rename = "type")]
    pub ty:    String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportBlueprint {
    pub event_type: String,
    pub to:         EventEndpoint,
    #[serde(default)]
    pub converter:  Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReexportBlueprint {
    pub event_type: String,
    pub from:       EventEndpoint,
    #[serde(default)]
    pub converter:  Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionBlueprint {
    pub from:      EventEndpoint,
    pub to:        EventEndpoint,
    #[serde(default)]
    pub converter: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportedVarBlueprint {
    pub name: String,
    pub to:   VariableEndpoint,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReexportedVarBlueprint {
    pub name: String,
    pub from: VariableEndpoint,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingBlueprint {
    pub from: VariableEndpoint,
    pub to:   VariableEndpoint,
}

impl Blueprint {
    pub fn from_json(json: &str) -> ArchResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Like [`from_json`](Self::from_json) but reads any `Read` source.
    pub fn from_reader<R: Read>(reader: R) -> ArchResult<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_path(path: &Path) -> ArchResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Resolve every name against `registry` and validate the result.
    pub fn resolve(&self, registry: &ModelRegistry) -> ArchResult<Architecture> {
        let mut builder = Architecture::builder(self.root.clone()).time_unit(self.time_unit);
        if let Some(factor) = self.acceleration_factor {
            builder = builder.acceleration_factor(factor);
        }
        for atomic in &self.atomic {
            let (declarations, factory) = registry
                .models
                .get(&atomic.model)
                .ok_or_else(|| ArchError::UnknownFactory(atomic.model.clone()))?;
            let mode = if atomic.real_time { EngineCreationMode::AtomicRealTime } else { EngineCreationMode::Atomic };
            let mut descriptor = AtomicDescriptor {
                uri:                  atomic.uri.clone(),
                declarations:         declarations.clone(),
                factory:              factory.clone(),
                engine_creation_mode: mode,
                acceleration:         None,
            };
            if let Some(factor) = atomic.acceleration_factor {
                descriptor = descriptor.paced(acceleration(factor)?);
            }
            builder = builder.atomic(descriptor);
        }
        for coupled in &self.coupled {
            let mode = if coupled.real_time {
                EngineCreationMode::CoordinationRealTime
            } else {
                EngineCreationMode::Coordination
            };
            let mut descriptor = CoupledDescriptor::new(registry.coupling(coupled)?).with_mode(mode);
            if let Some(factor) = coupled.acceleration_factor {
                descriptor = descriptor.paced(acceleration(factor)?);
            }
            builder = builder.coupled(descriptor);
        }
        builder.build()
    }
}

fn acceleration(factor: f64) -> ArchResult<AccelerationFactor> {
    AccelerationFactor::new(factor).map_err(|_| ArchError::InvalidAcceleration(factor))
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Named model factories, converters and variable types.
///
/// `f64`, `f32`, `i64`, `i32`, `u64`, `u32`, `bool` and `String` are
/// registered as variable types from the start.
#[derive(Clone)]
pub struct ModelRegistry {
    models:     HashMap<String, (ModelDeclarations, ModelFactory)>,
    converters: HashMap<String, Converter>,
    types:      HashMap<String, VariableType>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        let registry = Self { models: HashMap::new(), converters: HashMap::new(), types: HashMap::new() };
        registry
            .with_type::<f64>("f64")
            .with_type::<f32>("f32")
            .with_type::<i64>("i64")
            .with_type::<i32>("i32")
            .with_type::<u64>("u64")
            .with_type::<u32>("u32")
            .with_type::<bool>("bool")
            .with_type::<String>("String")
    }

    pub fn with_factory<F>(mut self, name: impl Into<String>, declarations: ModelDeclarations, factory: F) -> Self
    where
        F: Fn(&ModelContext) -> ModelResult<Box<dyn AtomicModel>> + Send + Sync + 'static,
    {
        let factory: ModelFactory = std::sync::Arc::new(factory);
        self.models.insert(name.into(), (declarations, factory));
        self
    }

    /// Register a model type that declares itself.
    pub fn with_model<M, F>(self, name: impl Into<String>, factory: F) -> Self
    where
        M: DeclaredModel,
        F: Fn(&ModelContext) -> ModelResult<M> + Send + Sync + 'static,
    {
        self.with_factory(name, M::declarations(), move |ctx| {
            factory(ctx).map(|m| Box::new(m) as Box<dyn AtomicModel>)
        })
    }

    pub fn with_converter(mut self, name: impl Into<String>, converter: Converter) -> Self {
        self.converters.insert(name.into(), converter);
        self
    }

    pub fn with_type<T: 'static>(mut self, name: impl Into<String>) -> Self {
        self.types.insert(name.into(), VariableType::of::<T>());
        self
    }

    fn converter(&self, name: Option<&String>) -> ArchResult<Option<Converter>> {
        name.map(|n| {
            self.converters
                .get(n)
                .cloned()
                .ok_or_else(|| ArchError::UnknownConverter(n.clone()))
        })
        .transpose()
    }

    fn variable_type(&self, name: &str) -> ArchResult<VariableType> {
        self.types
            .get(name)
            .copied()
            .ok_or_else(|| ArchError::UnknownVariableType(name.to_owned()))
    }

    fn sink(&self, to: &EventEndpoint, converter: Option<&String>) -> ArchResult<EventSink> {
        let sink = EventSink::new(to.model.clone(), EventType::new(to.event_type.clone()));
        Ok(match self.converter(converter)? {
            Some(c) => sink.with_converter(c),
            None => sink,
        })
    }

    fn var_source(&self, from: &VariableEndpoint) -> ArchResult<VariableSource> {
        Ok(VariableSource::new(from.model.clone(), from.name.clone(), self.variable_type(&from.ty)?))
    }

    fn var_sink(&self, to: &VariableEndpoint) -> ArchResult<VariableSink> {
        Ok(VariableSink::new(to.model.clone(), to.name.clone(), self.variable_type(&to.ty)?))
    }

    fn coupling(&self, bp: &CoupledBlueprint) -> ArchResult<Coupling> {
        let mut coupling = Coupling::new(bp.uri.clone()).with_submodels(bp.submodels.iter().cloned());
        for edge in &bp.imported {
            coupling = coupling.with_import(
                EventType::new(edge.event_type.clone()),
                self.sink(&edge.to, edge.converter.as_ref())?,
            );
        }
        for reexport in &bp.reexported {
            coupling = coupling.with_reexport(
                EventType::new(reexport.event_type.clone()),
                EventSource::new(reexport.from.model.clone(), EventType::new(reexport.from.event_type.clone())),
                self.converter(reexport.converter.as_ref())?,
            );
        }
        for connection in &bp.connections {
            coupling = coupling.with_connection(
                EventSource::new(connection.from.model.clone(), EventType::new(connection.from.event_type.clone())),
                self.sink(&connection.to, connection.converter.as_ref())?,
            );
        }
        for var in &bp.imported_vars {
            coupling = coupling.with_imported_var(var.name.clone(), self.var_sink(&var.to)?);
        }
        for var in &bp.reexported_vars {
            coupling = coupling.with_reexported_var(var.name.clone(), self.var_source(&var.from)?);
        }
        for binding in &bp.bindings {
            coupling = coupling.with_binding(self.var_source(&binding.from)?, self.var_sink(&binding.to)?);
        }
        Ok(coupling)
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut models: Vec<_> = self.models.keys().collect();
        let mut converters: Vec<_> = self.converters.keys().collect();
        models.sort();
        converters.sort();
        f.debug_struct("ModelRegistry")
            .field("models", &models)
            .field("converters", &converters)
            .finish_non_exhaustive()
    }
}
