//! Validated architectures and what can be built from them.

use std::collections::{BTreeMap, BTreeSet};

use devs_compose::{ModelComposer, ModelTree};
use devs_core::{EventType, Time, TimeUnit};
use devs_engine::{SimulationConfig, Simulator, SimulatorBuilder};
use devs_model::ModelDeclarations;
use devs_rt::{AccelerationFactor, ExportTarget, RemoteSubtree, RtHandle, RtSimulation, RtSpawner, end_subtrees};

use crate::{ArchError, ArchResult, AtomicDescriptor, CoupledDescriptor, EngineCreationMode};

/// Every model of a simulation, described once and validated at
/// construction.  Each call to [`build_tree`](Self::build_tree) creates
/// fresh model instances, so one architecture serves any number of runs.
#[derive(Clone, Debug)]
pub struct Architecture {
    root_model_uri: String,
    atomic:         BTreeMap<String, AtomicDescriptor>,
    coupled:        BTreeMap<String, CoupledDescriptor>,
    time_unit:      TimeUnit,
    acceleration:   Option<AccelerationFactor>,
}

impl Architecture {
    pub fn builder(root_model_uri: impl Into<String>) -> ArchitectureBuilder {
        ArchitectureBuilder::new(root_model_uri)
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn root_model_uri(&self) -> &str {
        &self.root_model_uri
    }

    pub fn time_unit(&self) -> TimeUnit {
        self.time_unit
    }

    /// `ticks` in the architecture's time unit.
    pub fn time(&self, ticks: u64) -> Time {
        Time::new(ticks, self.time_unit)
    }

    pub fn acceleration(&self) -> Option<AccelerationFactor> {
        self.acceleration
    }

    pub fn atomic(&self, uri: &str) -> Option<&AtomicDescriptor> {
        self.atomic.get(uri)
    }

    pub fn coupled(&self, uri: &str) -> Option<&CoupledDescriptor> {
        self.coupled.get(uri)
    }

    fn mode_of(&self, uri: &str) -> Option<EngineCreationMode> {
        self.atomic
            .get(uri)
            .map(|a| a.engine_creation_mode)
            .or_else(|| self.coupled.get(uri).map(|c| c.engine_creation_mode))
    }

    fn acceleration_of(&self, uri: &str) -> Option<AccelerationFactor> {
        self.atomic
            .get(uri)
            .and_then(|a| a.acceleration)
            .or_else(|| self.coupled.get(uri).and_then(|c| c.acceleration))
    }

    fn parent_of(&self, uri: &str) -> Option<&str> {
        self.coupled
            .iter()
            .find(|(_, c)| c.coupling.submodels.iter().any(|s| s == uri))
            .map(|(parent, _)| parent.as_str())
    }

    /// Whether any model is real-time.  A real-time run paces the root's
    /// thread whatever the root's own mode.
    pub fn is_real_time(&self) -> bool {
        self.atomic
            .values()
            .map(|a| a.engine_creation_mode)
            .chain(self.coupled.values().map(|c| c.engine_creation_mode))
            .any(EngineCreationMode::is_real_time)
    }

    /// Whether a real-time run paces `uri` on a thread of its own: it is a
    /// real-time model below the root, with its own acceleration factor or
    /// under a parent that is not real-time.
    pub fn is_separately_paced(&self, uri: &str) -> bool {
        let Some(parent) = self.parent_of(uri) else {
            return false;
        };
        self.mode_of(uri).is_some_and(EngineCreationMode::is_real_time)
            && (self.acceleration_of(uri).is_some()
                || !self.mode_of(parent).is_some_and(EngineCreationMode::is_real_time))
    }

    /// The nearest separately paced models below `uri`.
    fn paced_below(&self, uri: &str) -> Vec<&str> {
        let mut found = Vec::new();
        let mut pending = self.submodels_of(uri);
        while let Some(submodel) = pending.pop() {
            if self.is_separately_paced(submodel) {
                found.push(submodel);
            } else {
                pending.extend(self.submodels_of(submodel));
            }
        }
        found
    }

    fn submodels_of(&self, uri: &str) -> Vec<&str> {
        self.coupled
            .get(uri)
            .map(|c| c.coupling.submodels.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Event interface of `uri` as its parent sees it.
    fn boundary_of(&self, uri: &str) -> ModelDeclarations {
        match (self.atomic.get(uri), self.coupled.get(uri)) {
            (Some(a), _) => a.declarations.clone(),
            (_, Some(c)) => {
                let imports = c.coupling.imported.iter().map(|e| &e.event_type);
                let declarations = imports.fold(ModelDeclarations::new(), |d, et| d.with_import(et.clone()));
                c.coupling.reexported.iter().fold(declarations, |d, r| d.with_export(r.event_type.clone()))
            }
            _ => ModelDeclarations::new(),
        }
    }

    // ── Building ──────────────────────────────────────────────────────────

    /// Instantiate every model and compose the tree bottom-up, sealed at the root.
    pub fn build_tree(&self) -> ArchResult<ModelTree> {
        self.build_partition(&self.root_model_uri, &BTreeMap::new())
    }

    /// The tree rooted at `uri`, with each subtree in `remotes` replaced by
    /// a [`RemoteSubtree`] driving it through its handle.
    fn build_partition(&self, uri: &str, remotes: &BTreeMap<String, RtHandle>) -> ArchResult<ModelTree> {
        let mut tree = ModelTree::new();
        self.compose_into(&mut tree, uri, remotes)?;
        tree.seal(uri)?;
        tracing::debug!(root = uri, models = tree.len(), remotes = remotes.len(), "architecture built");
        Ok(tree)
    }

    fn compose_into(&self, tree: &mut ModelTree, uri: &str, remotes: &BTreeMap<String, RtHandle>) -> ArchResult<()> {
        if let Some(handle) = remotes.get(uri) {
            let boundary = self.boundary_of(uri);
            let stand_in = RemoteSubtree::new(handle.clone(), &boundary, self.time_unit);
            tree.add_atomic(uri, RemoteSubtree::declarations(&boundary), Box::new(stand_in))?;
        } else if let Some(atomic) = self.atomic.get(uri) {
            tree.add_atomic(uri, atomic.declarations.clone(), atomic.instantiate(self.time_unit)?)?;
        } else if let Some(coupled) = self.coupled.get(uri) {
            for submodel in &coupled.coupling.submodels {
                self.compose_into(tree, submodel, remotes)?;
            }
            ModelComposer::compose(tree, coupled.coupling.clone())?;
        }
        Ok(())
    }

    /// A builder over a fresh tree, for callers adding observers or
    /// tie-break policies.
    pub fn simulator_builder(&self) -> ArchResult<SimulatorBuilder> {
        Ok(SimulatorBuilder::new(self.build_tree()?))
    }

    /// One simulator over the whole tree, separately paced subtrees included.
    pub fn build_simulator(&self, config: SimulationConfig) -> ArchResult<Simulator> {
        Ok(self.simulator_builder()?.config(config).build()?)
    }

    /// Build and pace a fresh simulation.
    ///
    /// The root's partition runs on one thread, at the architecture's
    /// acceleration factor (real time by default).  Each separately paced
    /// subtree runs on a thread of its own, at its own factor or the one
    /// above it, and is replaced in its parent's tree by a [`RemoteSubtree`].
    /// All runs share the same wall-clock anchor.  Stopping the returned run
    /// stops the subtrees depth-first and merges their reports into its
    /// [`RtOutcome::into_report`](devs_rt::RtOutcome::into_report).
    pub fn spawn_real_time(
        &self,
        config: SimulationConfig,
        sim_start: Time,
        sim_end: Time,
    ) -> ArchResult<RtSimulation> {
        if !self.is_real_time() {
            return Err(ArchError::NotRealTime(self.root_model_uri.clone()));
        }
        let window = RunWindow { sim_start, sim_end, real_start: std::time::Instant::now() };
        let acceleration = self.acceleration.unwrap_or_default();
        self.spawn_partition(&self.root_model_uri, acceleration, config, window, None)
    }

    /// Spawn the partition rooted at `uri`, after the subtrees it waits for.
    fn spawn_partition(
        &self,
        uri: &str,
        inherited: AccelerationFactor,
        config: SimulationConfig,
        window: RunWindow,
        exports: Option<ExportTarget>,
    ) -> ArchResult<RtSimulation> {
        let acceleration = self.acceleration_of(uri).unwrap_or(inherited);
        let (handle, commands) = RtHandle::channel();
        let mut subtrees = Vec::new();
        let mut remotes = BTreeMap::new();
        for submodel in self.paced_below(uri) {
            let target = ExportTarget::new(handle.clone(), submodel);
            match self.spawn_partition(submodel, acceleration, config, window, Some(target)) {
                Ok(subtree) => {
                    remotes.insert(submodel.to_owned(), subtree.handle().clone());
                    subtrees.push(subtree);
                }
                Err(e) => {
                    if let Err(ending) = end_subtrees(subtrees) {
                        tracing::warn!(error = %ending, "ending subtrees failed");
                    }
                    return Err(e);
                }
            }
        }

        let mut spawner = RtSpawner::new(acceleration, window.sim_start, window.sim_end)
            .name(format!("devs-rt:{uri}"))
            .anchored_at(window.real_start)
            .channel((handle, commands));
        for subtree in subtrees {
            spawner = spawner.subtree(subtree);
        }
        if let Some(target) = exports {
            spawner = spawner.forward_exports(target);
        }
        tracing::debug!(root = uri, acceleration = acceleration.get(), subtrees = remotes.len(), "spawning partition");
        let architecture = self.clone();
        let root = uri.to_owned();
        Ok(spawner.spawn(move || architecture.partition_simulator(&root, &remotes, config))?)
    }

    fn partition_simulator(
        &self,
        uri: &str,
        remotes: &BTreeMap<String, RtHandle>,
        config: SimulationConfig,
    ) -> ArchResult<Simulator> {
        Ok(SimulatorBuilder::new(self.build_partition(uri, remotes)?).config(config).build()?)
    }

    // ── Validation ────────────────────────────────────────────────────────

    fn validate(&self) -> ArchResult<()> {
        let root = self.root_model_uri.as_str();
        if self.mode_of(root).is_none() {
            return Err(ArchError::UnknownRoot(root.to_owned()));
        }

        let mut parents: BTreeMap<&str, &str> = BTreeMap::new();
        for (uri, coupled) in &self.coupled {
            for submodel in &coupled.coupling.submodels {
                if self.mode_of(submodel).is_none() {
                    return Err(ArchError::UnknownSubmodel { coupled: uri.clone(), model: submodel.clone() });
                }
                if submodel.as_str() == root {
                    return Err(ArchError::RootIsSubmodel(root.to_owned()));
                }
                if let Some(first) = parents.insert(submodel.as_str(), uri.as_str()) {
                    return Err(ArchError::MultipleParents {
                        model:  submodel.clone(),
                        first:  first.to_owned(),
                        second: uri.clone(),
                    });
                }
            }
        }

        // With one parent each and a parentless root, whatever the root
        // reaches is a tree.
        let mut reached = BTreeSet::from([root]);
        let mut pending = vec![root];
        while let Some(uri) = pending.pop() {
            if let Some(coupled) = self.coupled.get(uri) {
                for submodel in &coupled.coupling.submodels {
                    if reached.insert(submodel.as_str()) {
                        pending.push(submodel.as_str());
                    }
                }
            }
        }
        if let Some(stray) = self.atomic.keys().chain(self.coupled.keys()).find(|u| !reached.contains(u.as_str())) {
            return Err(ArchError::Unreachable(stray.clone()));
        }

        for (uri, atomic) in &self.atomic {
            check_mode(uri, atomic.engine_creation_mode, true)?;
        }
        for (uri, coupled) in &self.coupled {
            check_mode(uri, coupled.engine_creation_mode, false)?;
            self.validate_coupling(coupled)?;
        }
        for uri in self.atomic.keys().chain(self.coupled.keys()) {
            if self.is_separately_paced(uri) {
                self.validate_boundary(uri)?;
            }
        }
        Ok(())
    }

    /// A separately paced subtree talks to its parent through events only,
    /// and each event type crosses in one direction.
    fn validate_boundary(&self, uri: &str) -> ArchResult<()> {
        let boundary = self.boundary_of(uri);
        if let Some(event_type) = boundary.imported_events().find(|et| boundary.exports_event(et)) {
            return Err(ArchError::AmbiguousBoundary { uri: uri.to_owned(), event_type: event_type.clone() });
        }
        let Some(parent) = self.parent_of(uri).and_then(|p| self.coupled.get(p)) else {
            return Ok(());
        };
        let coupling = &parent.coupling;
        let bound = coupling.bindings.iter().any(|b| b.source.model_uri == uri || b.sink.model_uri == uri)
            || coupling.imported_vars.iter().any(|v| v.sink.model_uri == uri)
            || coupling.reexported_vars.iter().any(|v| v.source.model_uri == uri);
        if bound {
            return Err(ArchError::VariablesAcrossThreads { coupled: coupling.uri.clone(), uri: uri.to_owned() });
        }
        Ok(())
    }

    fn imports(&self, uri: &str, event_type: &EventType) -> bool {
        match (self.atomic.get(uri), self.coupled.get(uri)) {
            (Some(a), _) => a.declarations.imports_event(event_type),
            (_, Some(c)) => c.coupling.imported.iter().any(|e| &e.event_type == event_type),
            _ => false,
        }
    }

    fn exports(&self, uri: &str, event_type: &EventType) -> bool {
        match (self.atomic.get(uri), self.coupled.get(uri)) {
            (Some(a), _) => a.declarations.exports_event(event_type),
            (_, Some(c)) => c.coupling.reexported.iter().any(|r| &r.event_type == event_type),
            _ => false,
        }
    }

    /// Event wiring of one coupled model against its submodels' declarations.
    fn validate_coupling(&self, descriptor: &CoupledDescriptor) -> ArchResult<()> {
        let coupling = &descriptor.coupling;
        let contains = |model: &str| -> ArchResult<()> {
            if coupling.submodels.iter().any(|s| s == model) {
                Ok(())
            } else {
                Err(ArchError::NotASubmodel { coupled: coupling.uri.clone(), model: model.to_owned() })
            }
        };
        let must_import = |model: &str, event_type: &EventType| -> ArchResult<()> {
            contains(model)?;
            if self.imports(model, event_type) {
                return Ok(());
            }
            Err(ArchError::MissingImport {
                coupled:    coupling.uri.clone(),
                model:      model.to_owned(),
                event_type: event_type.clone(),
            })
        };
        let must_export = |model: &str, event_type: &EventType| -> ArchResult<()> {
            contains(model)?;
            if self.exports(model, event_type) {
                return Ok(());
            }
            Err(ArchError::MissingExport {
                coupled:    coupling.uri.clone(),
                model:      model.to_owned(),
                event_type: event_type.clone(),
            })
        };

        for edge in &coupling.imported {
            must_import(&edge.sink.model_uri, &edge.sink.event_type)?;
        }

        let mut origins = BTreeSet::new();
        for reexport in &coupling.reexported {
            must_export(&reexport.source.model_uri, &reexport.source.event_type)?;
            if !origins.insert(&reexport.event_type) {
                return Err(ArchError::NonUniqueReexport {
                    coupled:    coupling.uri.clone(),
                    event_type: reexport.event_type.clone(),
                });
            }
        }

        for connection in &coupling.connections {
            must_export(&connection.source.model_uri, &connection.source.event_type)?;
            must_import(&connection.sink.model_uri, &connection.sink.event_type)?;
            if connection.source.model_uri == connection.sink.model_uri {
                return Err(ArchError::SelfLoop {
                    coupled:    coupling.uri.clone(),
                    model:      connection.source.model_uri.clone(),
                    event_type: connection.sink.event_type.clone(),
                });
            }
        }
        Ok(())
    }
}

fn check_mode(uri: &str, mode: EngineCreationMode, atomic: bool) -> ArchResult<()> {
    if mode.is_atomic() != atomic {
        return Err(ArchError::ModeMismatch { uri: uri.to_owned(), mode });
    }
    Ok(())
}

/// Simulated window of a real-time run and the wall instant it starts at.
#[derive(Copy, Clone, Debug)]
struct RunWindow {
    sim_start:  Time,
    sim_end:    Time,
    real_start: std::time::Instant,
}

// ── ArchitectureBuilder ───────────────────────────────────────────────────────

/// Fluent builder for [`Architecture`].
///
/// ```rust,ignore
/// let arch = Architecture::builder("house")
///     .atomic(AtomicDescriptor::of::<Heater, _>("heater", |ctx| Ok(Heater::new(ctx))))
///     .atomic(AtomicDescriptor::of::<Thermostat, _>("thermostat", |ctx| Ok(Thermostat::new(ctx))))
///     .coupled(CoupledDescriptor::new(coupling))
///     .time_unit(TimeUnit::Seconds)
///     .build()?;
/// ```
#[derive(Debug)]
pub struct ArchitectureBuilder {
    root_model_uri: String,
    atomic:         Vec<AtomicDescriptor>,
    coupled:        Vec<CoupledDescriptor>,
    time_unit:      TimeUnit,
    acceleration:   Option<f64>,
}

impl ArchitectureBuilder {
    pub fn new(root_model_uri: impl Into<String>) -> Self {
        Self {
            root_model_uri: root_model_uri.into(),
            atomic:         Vec::new(),
            coupled:        Vec::new(),
            time_unit:      TimeUnit::Seconds,
            acceleration:   None,
        }
    }

    pub fn atomic(mut self, descriptor: AtomicDescriptor) -> Self {
        self.atomic.push(descriptor);
        self
    }

    pub fn coupled(mut self, descriptor: CoupledDescriptor) -> Self {
        self.coupled.push(descriptor);
        self
    }

    pub fn time_unit(mut self, unit: TimeUnit) -> Self {
        self.time_unit = unit;
        self
    }

    pub fn acceleration_factor(mut self, factor: f64) -> Self {
        self.acceleration = Some(factor);
        self
    }

    /// Validate and freeze.
    pub fn build(self) -> ArchResult<Architecture> {
        let acceleration = self
            .acceleration
            .map(|f| AccelerationFactor::new(f).map_err(|_| ArchError::InvalidAcceleration(f)))
            .transpose()?;

        let mut atomic = BTreeMap::new();
        for descriptor in self.atomic {
            let uri = descriptor.uri.clone();
            if atomic.insert(uri.clone(), descriptor).is_some() {
                return Err(ArchError::DuplicateUri(uri));
            }
        }
        let mut coupled = BTreeMap::new();
        for descriptor in self.coupled {
            let uri = descriptor.uri().to_owned();
            if atomic.contains_key(&uri) || coupled.insert(uri.clone(), descriptor).is_some() {
                return Err(ArchError::DuplicateUri(uri));
            }
        }

        let architecture = Architecture {
            root_model_uri: self.root_model_uri,
            atomic,
            coupled,
            time_unit: self.time_unit,
            acceleration,
        };
        architecture.validate()?;
        Ok(architecture)
    }
}
