//! Run control over a sealed model tree.

use devs_compose::ModelTree;
use devs_core::{AnyValue, Duration, Event, NodeId, RunParameters, SimulationReport, Time, VariableType};

use crate::kernel::{EngineSlot, Kernel};
use crate::{CoordinationEngine, EngineError, EngineResult, ProtocolState, SimulationEngine};

/// A runnable simulation: the model tree, its engines and the run window.
///
/// Built by [`SimulatorBuilder`](crate::SimulatorBuilder).  Typical use:
///
/// ```rust,ignore
/// let mut sim = SimulatorBuilder::new(tree).seed(7).build()?;
/// sim.initialise_simulation(Time::zero(TimeUnit::Seconds), Duration::seconds(100))?;
/// sim.run()?;
/// sim.end_simulation(sim.end_time().unwrap())?;
/// println!("{}", sim.final_report());
/// ```
///
/// Any error raised while stepping poisons the simulator: every later
/// run-control call returns [`EngineError::Poisoned`].
pub struct Simulator {
    kernel:   Kernel,
    /// `(start, end)` once initialised.
    window:   Option<(Time, Time)>,
    poisoned: bool,
}

impl Simulator {
    pub(crate) fn new(kernel: Kernel) -> Self {
        Self { kernel, window: None, poisoned: false }
    }

    /// Run `op` on the kernel, poisoning the simulator if it fails.
    fn guarded<T>(&mut self, op: impl FnOnce(&mut Kernel) -> EngineResult<T>) -> EngineResult<T> {
        if self.poisoned {
            return Err(EngineError::Poisoned);
        }
        let result = op(&mut self.kernel);
        if let Err(e) = &result {
            self.poisoned = true;
            tracing::error!(error = %e, "simulation poisoned");
        }
        result
    }

    fn end(&self) -> EngineResult<Time> {
        self.window.map(|(_, end)| end).ok_or(EngineError::NotInitialised)
    }

    // ── Setup ─────────────────────────────────────────────────────────────

    /// Hand `params` to every leaf.  Only before initialisation.
    pub fn set_simulation_run_parameters(&mut self, params: &RunParameters) -> EngineResult<()> {
        let root = self.kernel.root;
        self.guarded(|k| {
            let engine = k.engine(root);
            engine.state().require(engine.uri(), "set_simulation_run_parameters", ProtocolState::Uninitialised)?;
            for leaf in k.tree.leaves(root) {
                let uri = k.tree.uri(leaf).to_owned();
                if let Some(model) = k.tree.atomic_mut(leaf) {
                    model
                        .set_simulation_run_parameters(&uri, params)
                        .map_err(|source| EngineError::Model { uri, source })?;
                }
            }
            Ok(())
        })
    }

    /// Initialise every engine at `start`; the run ends at `start + duration`.
    pub fn initialise_simulation(&mut self, start: Time, duration: Duration) -> EngineResult<()> {
        let end = start + duration;
        self.guarded(|k| {
            k.initialise(k.root, start)?;
            k.observer.on_initialise(start, end);
            Ok(())
        })?;
        self.window = Some((start, end));
        tracing::info!(
            root = self.kernel.tree.uri(self.kernel.root),
            %start,
            %end,
            models = self.kernel.tree.len(),
            "simulation initialised"
        );
        Ok(())
    }

    // ── Clock ─────────────────────────────────────────────────────────────

    pub fn start_time(&self) -> Option<Time> {
        self.window.map(|(start, _)| start)
    }

    pub fn end_time(&self) -> Option<Time> {
        self.window.map(|(_, end)| end)
    }

    pub fn time_of_last_event(&self) -> Time {
        self.kernel.engine(self.kernel.root).time_of_last_event()
    }

    pub fn time_of_next_event(&self) -> Time {
        self.kernel.engine(self.kernel.root).time_of_next_event()
    }

    pub fn next_time_advance(&self) -> Duration {
        self.kernel.engine(self.kernel.root).next_time_advance()
    }

    // ── Stepping ──────────────────────────────────────────────────────────

    /// Perform the next internal event if it falls within the run window.
    /// Returns its time, or `None` when nothing is left to do.
    pub fn step(&mut self) -> EngineResult<Option<Time>> {
        if self.poisoned {
            return Err(EngineError::Poisoned);
        }
        let end = self.end()?;
        let now = self.time_of_next_event();
        if now.is_infinite() || now > end {
            return Ok(None);
        }
        self.guarded(|k| {
            k.produce_output(k.root, now)?;
            k.internal_step(k.root)
        })?;
        Ok(Some(now))
    }

    /// Step until the next event is past the end of the run window.
    /// Returns the number of steps taken.
    pub fn run(&mut self) -> EngineResult<u64> {
        let end = self.end()?;
        self.run_until(end)
    }

    /// Step while the next event is at or before `limit`.
    pub fn run_until(&mut self, limit: Time) -> EngineResult<u64> {
        let mut steps = 0;
        while self.time_of_next_event() <= limit {
            match self.step()? {
                Some(_) => steps += 1,
                None => break,
            }
        }
        Ok(steps)
    }

    /// Bring every HIOA model to `current` without consuming events.
    pub fn causal_event_step_at(&mut self, current: Time) -> EngineResult<()> {
        self.end()?;
        self.guarded(|k| k.causal_step(k.root, current))
    }

    /// Deliver every pending external event at `current`.  Does nothing
    /// when no event is waiting.
    pub fn external_event_step_at(&mut self, current: Time) -> EngineResult<()> {
        self.end()?;
        self.guarded(|k| {
            let root = k.engine(k.root);
            if !root.has_pending_external_events() {
                return Ok(());
            }
            let last = root.time_of_last_event();
            let elapsed = current
                .checked_duration_since(last)
                .ok_or_else(|| EngineError::TimeOutOfRange {
                    uri:       root.uri().to_owned(),
                    operation: "external_event_step",
                    time:      current,
                    earliest:  last,
                    latest:    root.time_of_next_event(),
                })?;
            k.external_step(k.root, elapsed)
        })
    }

    /// End every engine at `end`, leaves first.
    pub fn end_simulation(&mut self, end: Time) -> EngineResult<()> {
        self.end()?;
        self.guarded(|k| {
            k.end_simulation(k.root, end)?;
            k.observer.on_end(end);
            Ok(())
        })?;
        tracing::info!(%end, "simulation ended");
        Ok(())
    }

    // ── External events ───────────────────────────────────────────────────

    /// Buffer `event` as imported by `model_uri`.  It is consumed by the
    /// next external or internal step of the tree.
    ///
    /// An unknown model or an event type it does not import is rejected
    /// without poisoning the simulator.
    pub fn inject_event(&mut self, model_uri: &str, event: Event) -> EngineResult<()> {
        let id = self
            .kernel
            .tree
            .id_of(model_uri)
            .ok_or_else(|| EngineError::UnknownModel(model_uri.to_owned()))?;
        let deliveries = imported_deliveries(&self.kernel, id, event)?;
        self.guarded(|k| {
            for (leaf, delivered) in deliveries {
                k.store_input(leaf, delivered)?;
            }
            Ok(())
        })
    }

    /// Buffer `event` as imported by the root.
    pub fn inject_imported_event(&mut self, event: Event) -> EngineResult<()> {
        let root = self.kernel.root;
        let deliveries = imported_deliveries(&self.kernel, root, event)?;
        self.guarded(|k| {
            for (leaf, delivered) in deliveries {
                k.store_input(leaf, delivered)?;
            }
            Ok(())
        })
    }

    pub fn has_pending_external_events(&self) -> bool {
        self.kernel.engine(self.kernel.root).has_pending_external_events()
    }

    /// Drain the events exported by the root so far.
    pub fn take_exported_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.kernel.outbox)
    }

    // ── Inspection ────────────────────────────────────────────────────────

    pub fn final_report(&self) -> SimulationReport {
        self.kernel.final_report(self.kernel.root)
    }

    /// The live value of variable `name` exported by `model_uri`.
    pub fn exported_value(&self, model_uri: &str, name: &str, ty: VariableType) -> EngineResult<AnyValue> {
        Ok(self.kernel.tree.exported_value(model_uri, name, ty)?)
    }

    pub fn engine(&self, uri: &str) -> Option<&dyn SimulationEngine> {
        self.kernel.tree.id_of(uri).map(|id| self.kernel.engine(id))
    }

    pub fn coordinator(&self, uri: &str) -> Option<&CoordinationEngine> {
        let id = self.kernel.tree.id_of(uri)?;
        match &self.kernel.engines[id.index()] {
            EngineSlot::Coordinator(c) => Some(c),
            EngineSlot::Atomic(_)      => None,
        }
    }

    pub fn tree(&self) -> &ModelTree {
        &self.kernel.tree
    }

    pub fn root(&self) -> NodeId {
        self.kernel.root
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("root", &self.kernel.tree.uri(self.kernel.root))
            .field("window", &self.window)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

/// `event`, imported by node `id`, as each leaf sink receives it.
fn imported_deliveries(k: &Kernel, id: NodeId, event: Event) -> EngineResult<Vec<(NodeId, Event)>> {
    let et = event.event_type().clone();
    if !k.tree.node(id).declarations.imports_event(&et) {
        return Err(EngineError::NotImported { uri: k.tree.uri(id).to_owned(), event_type: et });
    }
    let sinks = if id == k.root && !k.tree.is_atomic(id) {
        k.tree.root_import_sinks(&et).to_vec()
    } else {
        devs_compose::event_atomic_sinks(&k.tree, id, &et)?
    };
    Ok(sinks
        .into_iter()
        .map(|sink| (sink.leaf, sink.converter.convert(event.clone()).retyped(sink.event_type)))
        .collect())
}
