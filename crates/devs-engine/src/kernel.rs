//! Engine arena and step dispatch.

use devs_compose::ModelTree;
use devs_core::{Duration, Event, NodeId, SimulationReport, Time};
use devs_model::AtomicModel;

use crate::{
    AtomicEngine, CoordinationEngine, EngineError, EngineResult, SimObserver, SimulationConfig,
    SimulationEngine, StepKind,
};

pub(crate) enum EngineSlot {
    Atomic(AtomicEngine),
    Coordinator(CoordinationEngine),
}

impl EngineSlot {
    pub(crate) fn as_engine(&self) -> &dyn SimulationEngine {
        match self {
            EngineSlot::Atomic(a)      => a,
            EngineSlot::Coordinator(c) => c,
        }
    }
}

/// The model tree together with one engine per node, indexed like the tree.
pub(crate) struct Kernel {
    pub(crate) tree:     ModelTree,
    pub(crate) engines:  Vec<EngineSlot>,
    pub(crate) root:     NodeId,
    pub(crate) config:   SimulationConfig,
    pub(crate) observer: Box<dyn SimObserver>,
    /// Events leaving the root, oldest first.
    pub(crate) outbox:   Vec<Event>,
}

impl Kernel {
    // ── Access ────────────────────────────────────────────────────────────

    pub(crate) fn engine(&self, id: NodeId) -> &dyn SimulationEngine {
        self.engines[id.index()].as_engine()
    }

    pub(crate) fn coordinator(&self, id: NodeId) -> EngineResult<&CoordinationEngine> {
        match &self.engines[id.index()] {
            EngineSlot::Coordinator(c) => Ok(c),
            EngineSlot::Atomic(_)      => Err(EngineError::NotCoupled(self.tree.uri(id).to_owned())),
        }
    }

    pub(crate) fn coordinator_mut(&mut self, id: NodeId) -> EngineResult<&mut CoordinationEngine> {
        match &mut self.engines[id.index()] {
            EngineSlot::Coordinator(c) => Ok(c),
            EngineSlot::Atomic(_)      => Err(EngineError::NotCoupled(self.tree.uri(id).to_owned())),
        }
    }

    /// The engine and the model of leaf `id`, borrowed together.
    fn atomic_parts(&mut self, id: NodeId) -> EngineResult<(&mut AtomicEngine, &mut dyn AtomicModel)> {
        let uri = self.tree.uri(id).to_owned();
        match (&mut self.engines[id.index()], self.tree.atomic_mut(id)) {
            (EngineSlot::Atomic(engine), Some(model)) => Ok((engine, model)),
            _ => Err(EngineError::NotAtomic(uri)),
        }
    }

    pub(crate) fn record(&mut self, id: NodeId, kind: StepKind, time: Time) {
        let uri = self.tree.uri(id);
        if self.config.trace_steps {
            tracing::debug!(model = uri, ?kind, %time, "step");
        }
        self.observer.on_step(uri, kind, time);
    }

    // ── Dispatch ──────────────────────────────────────────────────────────

    pub(crate) fn initialise(&mut self, id: NodeId, start: Time) -> EngineResult<()> {
        if !self.tree.is_atomic(id) {
            return self.coordinator_initialise(id, start);
        }
        let (engine, model) = self.atomic_parts(id)?;
        engine.initialise(model, start)
    }

    /// Collect the output of the leaf holding `id`'s next event and route it.
    pub(crate) fn produce_output(&mut self, id: NodeId, current: Time) -> EngineResult<()> {
        if !self.tree.is_atomic(id) {
            return self.coordinator_produce_output(id, current);
        }
        let (engine, model) = self.atomic_parts(id)?;
        let events = engine.produce_output(model, current)?;
        for event in events {
            self.route(id, event)?;
        }
        Ok(())
    }

    pub(crate) fn internal_step(&mut self, id: NodeId) -> EngineResult<()> {
        if !self.tree.is_atomic(id) {
            return self.coordinator_internal_step(id);
        }
        let (engine, model) = self.atomic_parts(id)?;
        engine.internal_event_step(model)?;
        let now = engine.time_of_last_event();
        self.record(id, StepKind::Internal, now);
        Ok(())
    }

    pub(crate) fn external_step(&mut self, id: NodeId, elapsed: Duration) -> EngineResult<()> {
        if !self.tree.is_atomic(id) {
            return self.coordinator_external_step(id, elapsed);
        }
        let (engine, model) = self.atomic_parts(id)?;
        engine.external_event_step(model, elapsed)?;
        let now = engine.time_of_last_event();
        self.record(id, StepKind::External, now);
        Ok(())
    }

    pub(crate) fn causal_step(&mut self, id: NodeId, current: Time) -> EngineResult<()> {
        if !self.tree.is_atomic(id) {
            return self.coordinator_causal_step(id, current);
        }
        let (engine, model) = self.atomic_parts(id)?;
        engine.causal_event_step(model, current)?;
        self.record(id, StepKind::Causal, current);
        Ok(())
    }

    /// Simultaneous internal and external events of `id`, with `elapsed`
    /// since its last event.
    pub(crate) fn confluent_step(&mut self, id: NodeId, elapsed: Duration) -> EngineResult<()> {
        if !self.tree.is_atomic(id) {
            return Err(EngineError::Unimplemented {
                uri:       self.tree.uri(id).to_owned(),
                operation: "confluent_event_step",
            });
        }
        let (engine, model) = self.atomic_parts(id)?;
        engine.confluent_event_step(model, elapsed)
    }

    /// End `id` and, depth-first, everything below it.
    pub(crate) fn end_simulation(&mut self, id: NodeId, end: Time) -> EngineResult<()> {
        if !self.tree.is_atomic(id) {
            return self.coordinator_end_simulation(id, end);
        }
        let (engine, model) = self.atomic_parts(id)?;
        engine.end_simulation(model, end)
    }

    pub(crate) fn final_report(&self, id: NodeId) -> SimulationReport {
        let uri = self.tree.uri(id);
        match self.tree.atomic(id) {
            Some(model) => model.final_report(uri),
            None => SimulationReport::coupled(
                uri,
                self.tree.children(id).iter().map(|&c| self.final_report(c)).collect(),
            ),
        }
    }

    // ── Event flow ────────────────────────────────────────────────────────

    /// Deliver an output of leaf `producer` along its flattened routes and
    /// through the root's reexports.
    fn route(&mut self, producer: NodeId, event: Event) -> EngineResult<()> {
        self.observer.on_output(self.tree.uri(producer), &event);
        if producer == self.root {
            self.outbox.push(event);
            return Ok(());
        }
        for export in self.tree.root_exports(producer, event.event_type()) {
            let leaving = export.converter.convert(event.clone());
            self.outbox.push(leaving.retyped(export.event_type.clone()));
        }
        let deliveries: Vec<(NodeId, Event)> = self
            .tree
            .routes_from(producer, event.event_type())
            .iter()
            .map(|sink| (sink.consumer, sink.deliver(event.clone()).retyped(sink.sink_type.clone())))
            .collect();
        for (consumer, delivered) in deliveries {
            self.store_input(consumer, delivered)?;
        }
        Ok(())
    }

    /// Buffer `event` in leaf `leaf` and mark the path to the root active.
    pub(crate) fn store_input(&mut self, leaf: NodeId, event: Event) -> EngineResult<()> {
        match &mut self.engines[leaf.index()] {
            EngineSlot::Atomic(engine) => engine.store_input(event),
            EngineSlot::Coordinator(_) => return Err(EngineError::NotAtomic(self.tree.uri(leaf).to_owned())),
        }
        self.notify_received(leaf)
    }
}
