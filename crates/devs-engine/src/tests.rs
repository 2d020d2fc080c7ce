//! Unit tests for the engines and run control.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use devs_compose::{Coupling, ModelComposer, ModelTree};
use devs_core::{Duration, Event, EventSink, EventSource, SimulationReport, Time, TimeUnit};
use devs_model::{AtomicModel, ModelDeclarations, ModelResult, PassiveModel};

use crate::{SimObserver, StepKind};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn secs(n: u64) -> Time {
    Time::new(n, TimeUnit::Seconds)
}

/// Emits `E` (payload: emission count as `u32`) every `period`, `count` times.
struct Emitter {
    period:    Duration,
    remaining: u32,
    emitted:   u32,
}

impl Emitter {
    fn new(period: u64, count: u32) -> Self {
        Self { period: Duration::seconds(period), remaining: count, emitted: 0 }
    }

    fn declarations() -> ModelDeclarations {
        ModelDeclarations::new().with_export("E")
    }
}

impl AtomicModel for Emitter {
    fn time_advance(&self) -> Duration {
        if self.remaining > 0 { self.period } else { Duration::INFINITY }
    }

    fn output(&mut self, current: Time) -> ModelResult<Vec<Event>> {
        Ok(vec![Event::new("E", current).with_payload(self.emitted + 1)])
    }

    fn internal_transition(&mut self, _elapsed: Duration) -> ModelResult<()> {
        self.remaining -= 1;
        self.emitted += 1;
        Ok(())
    }

    fn final_report(&self, uri: &str) -> SimulationReport {
        SimulationReport::atomic(uri, self.emitted)
    }
}

/// Passive model keeping every received event in a list shared with the test.
struct Collector {
    seen: Rc<RefCell<Vec<Event>>>,
}

impl Collector {
    fn new() -> (Self, Rc<RefCell<Vec<Event>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        (Self { seen: Rc::clone(&seen) }, seen)
    }
}

impl AtomicModel for Collector {
    fn time_advance(&self) -> Duration {
        Duration::INFINITY
    }

    fn apply_event(&mut self, event: &Event) -> ModelResult<()> {
        self.seen.borrow_mut().push(event.clone());
        Ok(())
    }
}

/// Fires every `period`, emitting `P`; its time advance ignores external
/// transitions, so an input never postpones its next firing.
struct Pulse {
    period: Duration,
}

impl Pulse {
    fn declarations() -> ModelDeclarations {
        ModelDeclarations::new().with_import("E").with_export("P")
    }
}

impl AtomicModel for Pulse {
    fn time_advance(&self) -> Duration {
        self.period
    }

    fn output(&mut self, current: Time) -> ModelResult<Vec<Event>> {
        Ok(vec![Event::new("P", current)])
    }
}

type StepLog = Arc<Mutex<Vec<(String, StepKind, Time)>>>;

/// Observer recording every step and every produced event.
#[derive(Clone, Default)]
struct Recorder {
    steps:   StepLog,
    outputs: Arc<Mutex<Vec<String>>>,
}

impl SimObserver for Recorder {
    fn on_step(&mut self, uri: &str, kind: StepKind, time: Time) {
        self.steps.lock().unwrap().push((uri.to_owned(), kind, time));
    }

    fn on_output(&mut self, producer: &str, _event: &Event) {
        self.outputs.lock().unwrap().push(producer.to_owned());
    }
}

impl Recorder {
    fn steps_of(&self, uri: &str) -> Vec<(StepKind, Time)> {
        self.steps
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _, _)| u == uri)
            .map(|&(_, k, t)| (k, t))
            .collect()
    }
}

/// `root { a: Emitter(5s, once) --E--> b: Passive }`, reexporting `a.E` as `Out`.
fn emitter_to_passive() -> ModelTree {
    let mut tree = ModelTree::new();
    tree.add_atomic("a", Emitter::declarations(), Box::new(Emitter::new(5, 1))).unwrap();
    tree.add_atomic("b", PassiveModel::declaring(["E"]), Box::new(PassiveModel::new())).unwrap();
    ModelComposer::compose(
        &mut tree,
        Coupling::new("root")
            .with_submodels(["a", "b"])
            .with_connection(EventSource::new("a", "E"), EventSink::new("b", "E"))
            .with_reexport("Out", EventSource::new("a", "E"), Some(devs_core::Converter::retype("Out"))),
    )
    .unwrap();
    tree.seal("root").unwrap();
    tree
}

/// `root { a: Emitter(5s, twice) --E--> b: Pulse(5s) --P--> c: Collector }`.
/// `a` is defined first, so `FirstCandidate` picks it whenever `b` is due too.
fn emitter_into_pulse() -> (ModelTree, Rc<RefCell<Vec<Event>>>) {
    let mut tree = ModelTree::new();
    tree.add_atomic("a", Emitter::declarations(), Box::new(Emitter::new(5, 2))).unwrap();
    tree.add_atomic("b", Pulse::declarations(), Box::new(Pulse { period: Duration::seconds(5) })).unwrap();
    let (collector, seen) = Collector::new();
    tree.add_atomic("c", PassiveModel::declaring(["P"]), Box::new(collector)).unwrap();
    ModelComposer::compose(
        &mut tree,
        Coupling::new("root")
            .with_submodels(["a", "b", "c"])
            .with_connection(EventSource::new("a", "E"), EventSink::new("b", "E"))
            .with_connection(EventSource::new("b", "P"), EventSink::new("c", "P")),
    )
    .unwrap();
    tree.seal("root").unwrap();
    (tree, seen)
}

/// Two emitters tied at t=1 feeding one collector, under `root`.
fn tied_pair(first: &str, second: &str) -> ModelTree {
    let mut tree = ModelTree::new();
    tree.add_atomic(first, Emitter::declarations(), Box::new(Emitter::new(1, 1))).unwrap();
    tree.add_atomic(second, Emitter::declarations(), Box::new(Emitter::new(1, 1))).unwrap();
    let (collector, _) = Collector::new();
    tree.add_atomic("sink", PassiveModel::declaring(["E"]), Box::new(collector)).unwrap();
    ModelComposer::compose(
        &mut tree,
        Coupling::new("root")
            .with_submodels([first, second, "sink"])
            .with_connection(EventSource::new(first, "E"), EventSink::new("sink", "E"))
            .with_connection(EventSource::new(second, "E"), EventSink::new("sink", "E")),
    )
    .unwrap();
    tree.seal("root").unwrap();
    tree
}

// ── AtomicEngine ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod atomic_tests {
    use super::*;
    use crate::{AtomicEngine, EngineError, ProtocolState, SimulationEngine};

    #[test]
    fn initialise_schedules_first_event() {
        let mut model = Emitter::new(5, 2);
        let mut engine = AtomicEngine::new("a");
        assert_eq!(engine.state(), ProtocolState::Uninitialised);
        engine.initialise(&mut model, secs(0)).unwrap();
        assert_eq!(engine.state(), ProtocolState::AwaitNextEvent);
        assert_eq!(engine.time_of_last_event(), secs(0));
        assert_eq!(engine.time_of_next_event(), secs(5));
        assert_eq!(engine.next_time_advance(), Duration::seconds(5));
        assert!(engine.clock().is_consistent());
    }

    #[test]
    fn output_then_internal_step_advances_clock() {
        let mut model = Emitter::new(5, 2);
        let mut engine = AtomicEngine::new("a");
        engine.initialise(&mut model, secs(0)).unwrap();

        let out = engine.produce_output(&mut model, secs(5)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload::<u32>(), Some(&1));

        engine.internal_event_step(&mut model).unwrap();
        assert_eq!(engine.time_of_last_event(), secs(5));
        assert_eq!(engine.time_of_next_event(), secs(10));

        engine.produce_output(&mut model, secs(10)).unwrap();
        engine.internal_event_step(&mut model).unwrap();
        assert!(engine.time_of_next_event().is_infinite());
        assert!(engine.next_time_advance().is_infinite());
        assert!(engine.clock().is_consistent());
    }

    #[test]
    fn output_only_at_next_event_time() {
        let mut model = Emitter::new(5, 1);
        let mut engine = AtomicEngine::new("a");
        engine.initialise(&mut model, secs(0)).unwrap();
        let err = engine.produce_output(&mut model, secs(4)).unwrap_err();
        assert!(matches!(err, EngineError::TimeOutOfRange { operation: "produce_output", .. }));
    }

    #[test]
    fn external_step_consumes_buffer_and_may_land_on_next_event() {
        let mut model = PassiveModel::new();
        let mut engine = AtomicEngine::new("b");
        engine.initialise(&mut model, secs(0)).unwrap();
        engine.store_input(Event::new("E", secs(3)));
        engine.store_input(Event::new("E", secs(3)));
        assert!(engine.has_pending_external_events());

        engine.external_event_step(&mut model, Duration::seconds(3)).unwrap();
        assert!(!engine.has_pending_external_events());
        assert_eq!(engine.time_of_last_event(), secs(3));

        let report = model.final_report("b");
        let payload = report.payload_as::<devs_model::PassiveReport>().unwrap();
        assert_eq!(payload.received, 2);
        assert_eq!(payload.external_steps, 1);

        // Exactly at the scheduled internal event is allowed.
        let mut emitter = Emitter::new(5, 1);
        let mut engine = AtomicEngine::new("a");
        engine.initialise(&mut emitter, secs(0)).unwrap();
        engine.external_event_step(&mut emitter, Duration::seconds(5)).unwrap();
        assert_eq!(engine.time_of_last_event(), secs(5));
    }

    #[test]
    fn external_step_past_next_event_is_rejected() {
        let mut model = Emitter::new(5, 1);
        let mut engine = AtomicEngine::new("a");
        engine.initialise(&mut model, secs(0)).unwrap();
        let err = engine.external_event_step(&mut model, Duration::seconds(6)).unwrap_err();
        match err {
            EngineError::TimeOutOfRange { uri, time, latest, .. } => {
                assert_eq!(uri, "a");
                assert_eq!(time, secs(6));
                assert_eq!(latest, secs(5));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn causal_step_keeps_next_event() {
        let mut model = Emitter::new(5, 1);
        let mut engine = AtomicEngine::new("a");
        engine.initialise(&mut model, secs(0)).unwrap();
        engine.causal_event_step(&mut model, secs(3)).unwrap();
        assert_eq!(engine.time_of_last_event(), secs(3));
        assert_eq!(engine.time_of_next_event(), secs(5));
        assert_eq!(engine.next_time_advance(), Duration::seconds(2));
        assert!(engine.causal_event_step(&mut model, secs(2)).is_err());
    }

    #[test]
    fn steps_before_initialise_violate_protocol() {
        let mut model = Emitter::new(5, 1);
        let mut engine = AtomicEngine::new("a");
        let err = engine.internal_event_step(&mut model).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Protocol { state: ProtocolState::Uninitialised, operation: "internal_event_step", .. }
        ));
        engine.initialise(&mut model, secs(0)).unwrap();
        assert!(matches!(engine.initialise(&mut model, secs(0)), Err(EngineError::Protocol { .. })));
    }

    #[test]
    fn confluent_step_is_unimplemented() {
        let mut model = PassiveModel::new();
        let mut engine = AtomicEngine::new("b");
        engine.initialise(&mut model, secs(0)).unwrap();
        let err = engine.confluent_event_step(&mut model, Duration::zero(TimeUnit::Seconds)).unwrap_err();
        assert!(matches!(err, EngineError::Unimplemented { operation: "confluent_event_step", .. }));
    }

    #[test]
    fn ended_engine_rejects_steps() {
        let mut model = Emitter::new(5, 1);
        let mut engine = AtomicEngine::new("a");
        engine.initialise(&mut model, secs(0)).unwrap();
        engine.end_simulation(&mut model, secs(2)).unwrap();
        assert_eq!(engine.state(), ProtocolState::Ended);
        assert!(matches!(
            engine.produce_output(&mut model, secs(5)),
            Err(EngineError::Protocol { state: ProtocolState::Ended, .. })
        ));
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod builder_tests {
    use super::*;
    use crate::{EngineError, ProtocolState, SimulationEngine, SimulatorBuilder};

    #[test]
    fn unsealed_tree_is_rejected() {
        let mut tree = ModelTree::new();
        tree.add_atomic("a", Emitter::declarations(), Box::new(Emitter::new(1, 1))).unwrap();
        assert!(matches!(SimulatorBuilder::new(tree).build(), Err(EngineError::NotSealed)));
    }

    #[test]
    fn one_engine_per_node() {
        let sim = SimulatorBuilder::new(emitter_to_passive()).build().unwrap();
        for uri in ["root", "a", "b"] {
            let engine = sim.engine(uri).unwrap();
            assert_eq!(engine.uri(), uri);
            assert_eq!(engine.state(), ProtocolState::Uninitialised);
        }
        assert!(sim.coordinator("root").is_some());
        assert!(sim.coordinator("a").is_none());
        assert!(sim.engine("nope").is_none());
    }

    #[test]
    fn stepping_requires_initialisation() {
        let mut sim = SimulatorBuilder::new(emitter_to_passive()).build().unwrap();
        assert!(matches!(sim.step(), Err(EngineError::NotInitialised)));
        assert!(!sim.is_poisoned());
    }
}

// ── Run control ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod run_tests {
    use super::*;
    use crate::{EngineError, SimulationEngine, SimulatorBuilder};
    use devs_model::PassiveReport;

    #[test]
    fn emitter_to_passive_next_event_sequence_and_single_external_step() {
        let recorder = Recorder::default();
        let mut sim = SimulatorBuilder::new(emitter_to_passive())
            .observer(recorder.clone())
            .build()
            .unwrap();
        sim.initialise_simulation(secs(0), Duration::seconds(100)).unwrap();

        let mut sequence = vec![sim.time_of_next_event()];
        while sim.step().unwrap().is_some() {
            sequence.push(sim.time_of_next_event());
        }
        assert_eq!(sequence[0], secs(5));
        assert!(sequence[1].is_infinite());
        assert_eq!(sequence.len(), 2);

        assert_eq!(recorder.steps_of("b"), vec![(StepKind::External, secs(5))]);
        assert_eq!(recorder.steps_of("a"), vec![(StepKind::Internal, secs(5))]);

        let root = sim.coordinator("root").unwrap();
        let b = sim.tree().id_of("b").unwrap();
        assert_eq!(root.elapsed_of(b), Some(Duration::zero(TimeUnit::Seconds)));

        // b's external step gets the 5s since its own last event (DEVS
        // external transition), not the 0 its coordinator holds afterwards.
        let report = sim.final_report();
        let b_report = report.find("b").unwrap().payload_as::<PassiveReport>().unwrap();
        assert_eq!(b_report.external_steps, 1);
        assert_eq!(b_report.last_elapsed, Some(Duration::seconds(5)));
    }

    #[test]
    fn decay_reaches_zero_after_one_euler_step() {
        let mut tree = ModelTree::new();
        let model = devs_model::ContinuousModel::new(
            &devs_model::ModelContext::new("x", TimeUnit::Seconds),
            10.0,
            devs_model::Dynamics::continuous(|x, _| -x, Duration::seconds(1)),
        );
        tree.add_atomic("x", model.declared(), Box::new(model)).unwrap();
        ModelComposer::compose(&mut tree, Coupling::new("root").with_submodel("x")).unwrap();
        tree.seal("root").unwrap();

        let mut sim = SimulatorBuilder::new(tree).build().unwrap();
        sim.initialise_simulation(secs(0), Duration::seconds(1)).unwrap();
        assert_eq!(sim.step().unwrap(), Some(secs(1)));

        let x = sim
            .exported_value("x", "x", devs_core::VariableType::of::<f64>())
            .unwrap()
            .downcast_import::<f64>()
            .unwrap();
        assert!(x.get().unwrap().abs() < 1e-12);
        assert_eq!(x.time().unwrap(), Some(secs(1)));
        assert_eq!(sim.step().unwrap(), None);
    }

    #[test]
    fn atomic_root_exports_every_output() {
        let mut tree = ModelTree::new();
        tree.add_atomic("solo", Emitter::declarations(), Box::new(Emitter::new(2, 3))).unwrap();
        tree.seal("solo").unwrap();
        let mut sim = SimulatorBuilder::new(tree).build().unwrap();
        sim.initialise_simulation(secs(0), Duration::seconds(60)).unwrap();
        assert_eq!(sim.run().unwrap(), 3);

        let out = sim.take_exported_events();
        let times: Vec<Time> = out.iter().map(Event::time_of_occurrence).collect();
        assert_eq!(times, vec![secs(2), secs(4), secs(6)]);
        assert!(sim.take_exported_events().is_empty());
        assert_eq!(sim.final_report().payload_as::<u32>(), Some(&3));
    }

    #[test]
    fn root_reexports_reach_the_outbox() {
        let mut sim = SimulatorBuilder::new(emitter_to_passive()).build().unwrap();
        sim.initialise_simulation(secs(0), Duration::seconds(10)).unwrap();
        sim.run().unwrap();
        let out = sim.take_exported_events();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].event_type().as_str(), "Out");
        assert_eq!(out[0].time_of_occurrence(), secs(5));
        assert_eq!(out[0].payload::<u32>(), Some(&1));
    }

    #[test]
    fn run_stops_at_end_of_window() {
        let mut tree = ModelTree::new();
        tree.add_atomic("a", Emitter::declarations(), Box::new(Emitter::new(3, 100))).unwrap();
        ModelComposer::compose(&mut tree, Coupling::new("root").with_submodel("a")).unwrap();
        tree.seal("root").unwrap();
        let mut sim = SimulatorBuilder::new(tree).build().unwrap();
        sim.initialise_simulation(secs(0), Duration::seconds(10)).unwrap();
        assert_eq!(sim.run().unwrap(), 3);
        assert_eq!(sim.time_of_last_event(), secs(9));
        assert_eq!(sim.time_of_next_event(), secs(12));
        sim.end_simulation(secs(10)).unwrap();
        assert!(matches!(sim.step(), Ok(None)));
    }

    #[test]
    fn events_cross_levels_through_converters() {
        let mut tree = ModelTree::new();
        tree.add_atomic("a", Emitter::declarations(), Box::new(Emitter::new(5, 1))).unwrap();
        let (collector, seen) = Collector::new();
        tree.add_atomic("b", PassiveModel::declaring(["E"]), Box::new(collector)).unwrap();
        ModelComposer::compose(
            &mut tree,
            Coupling::new("p1")
                .with_submodel("a")
                .with_reexport("Out", EventSource::new("a", "E"), Some(devs_core::Converter::retype("Out"))),
        )
        .unwrap();
        let add_hundred = devs_core::Converter::new(|e: Event| {
            e.map_payload(|n: Option<&u32>| n.copied().unwrap_or(0) + 100)
        });
        ModelComposer::compose(
            &mut tree,
            Coupling::new("p2")
                .with_submodel("b")
                .with_import("In", EventSink::new("b", "E").with_converter(add_hundred)),
        )
        .unwrap();
        ModelComposer::compose(
            &mut tree,
            Coupling::new("g").with_submodels(["p1", "p2"]).with_connection(
                EventSource::new("p1", "Out"),
                EventSink::new("p2", "In").with_converter(devs_core::Converter::retype("In")),
            ),
        )
        .unwrap();
        tree.seal("g").unwrap();

        let mut sim = SimulatorBuilder::new(tree).build().unwrap();
        sim.initialise_simulation(secs(0), Duration::seconds(10)).unwrap();
        assert_eq!(sim.run().unwrap(), 1);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].event_type().as_str(), "E");
        assert_eq!(seen[0].payload::<u32>(), Some(&101));
        assert!(!sim.has_pending_external_events());
        for uri in ["g", "p1", "p2"] {
            assert_eq!(sim.coordinator(uri).unwrap().active_children().count(), 0, "{uri}");
        }
        assert_eq!(sim.engine("b").unwrap().time_of_last_event(), secs(5));
    }

    #[test]
    fn injected_events_wait_for_an_external_step() {
        let mut tree = ModelTree::new();
        tree.add_atomic("b", PassiveModel::declaring(["E"]), Box::new(PassiveModel::new())).unwrap();
        ModelComposer::compose(
            &mut tree,
            Coupling::new("root")
                .with_submodel("b")
                .with_import("In", EventSink::new("b", "E").with_converter(devs_core::Converter::retype("E"))),
        )
        .unwrap();
        tree.seal("root").unwrap();
        let mut sim = SimulatorBuilder::new(tree).build().unwrap();
        sim.initialise_simulation(secs(0), Duration::seconds(10)).unwrap();

        // Rejected injections do not poison the run.
        assert!(matches!(sim.inject_event("ghost", Event::new("E", secs(0))), Err(EngineError::UnknownModel(_))));
        assert!(matches!(sim.inject_imported_event(Event::new("E", secs(0))), Err(EngineError::NotImported { .. })));
        assert!(!sim.is_poisoned());

        sim.inject_imported_event(Event::new("In", secs(3))).unwrap();
        assert!(sim.has_pending_external_events());
        sim.external_event_step_at(secs(3)).unwrap();
        assert!(!sim.has_pending_external_events());

        sim.inject_event("b", Event::new("E", secs(7))).unwrap();
        sim.external_event_step_at(secs(7)).unwrap();

        let report = sim.final_report();
        let b = report.find("b").unwrap().payload_as::<PassiveReport>().unwrap();
        assert_eq!(b.received, 2);
        assert_eq!(b.external_steps, 2);
        assert_eq!(b.last_elapsed, Some(Duration::seconds(4)));
        assert_eq!(sim.time_of_last_event(), secs(7));
    }

    #[test]
    fn run_parameters_only_before_initialise() {
        let mut tree = ModelTree::new();
        let model = devs_model::ContinuousModel::new(
            &devs_model::ModelContext::new("ramp", TimeUnit::Seconds),
            0.0,
            devs_model::Dynamics::continuous(|_, _| 1.0, Duration::seconds(1)),
        );
        tree.add_atomic("ramp", model.declared(), Box::new(model)).unwrap();
        tree.seal("ramp").unwrap();
        let mut sim = SimulatorBuilder::new(tree).build().unwrap();

        let params = devs_core::RunParameters::new().with("ramp", "initial", 4.0_f64);
        sim.set_simulation_run_parameters(&params).unwrap();
        sim.initialise_simulation(secs(0), Duration::seconds(1)).unwrap();
        sim.step().unwrap();
        let report = sim.final_report();
        let ramp = report.payload_as::<devs_model::ContinuousReport>().unwrap();
        assert!((ramp.final_value - 5.0).abs() < 1e-12);

        let err = sim.set_simulation_run_parameters(&params).unwrap_err();
        assert!(matches!(err, EngineError::Protocol { operation: "set_simulation_run_parameters", .. }));
        assert!(sim.is_poisoned());
    }

    #[test]
    fn errors_poison_the_simulator() {
        let mut sim = SimulatorBuilder::new(emitter_to_passive()).build().unwrap();
        sim.initialise_simulation(secs(0), Duration::seconds(10)).unwrap();
        let err = sim.initialise_simulation(secs(0), Duration::seconds(10)).unwrap_err();
        assert!(matches!(err, EngineError::Protocol { .. }));
        assert!(sim.is_poisoned());
        assert!(matches!(sim.step(), Err(EngineError::Poisoned)));
        assert!(matches!(sim.end_simulation(secs(10)), Err(EngineError::Poisoned)));
    }

    #[test]
    fn stepping_after_end_violates_protocol() {
        let mut sim = SimulatorBuilder::new(emitter_to_passive()).build().unwrap();
        sim.initialise_simulation(secs(0), Duration::seconds(10)).unwrap();
        sim.end_simulation(secs(2)).unwrap();
        assert!(matches!(sim.step(), Err(EngineError::Protocol { .. })));
    }

    #[test]
    fn final_report_mirrors_the_tree() {
        let mut sim = SimulatorBuilder::new(emitter_to_passive()).build().unwrap();
        sim.initialise_simulation(secs(0), Duration::seconds(10)).unwrap();
        sim.run().unwrap();
        sim.end_simulation(secs(10)).unwrap();
        let report = sim.final_report();
        assert_eq!(report.model_uri, "root");
        assert_eq!(report.children.len(), 2);
        assert_eq!(report.find("a").unwrap().payload_as::<u32>(), Some(&1));
    }
}

// ── Coordination ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod coordination_tests {
    use super::*;
    use crate::{
        CollisionPolicy, EngineError, FirstCandidate, LexicographicSelect, SimulationConfig,
        SimulationEngine, Simulator, SimulatorBuilder,
    };
    use devs_core::{VariableSink, VariableSource};
    use devs_model::{ContinuousModel, ContinuousReport, Dynamics, ModelContext};

    fn first_producer(sim: &mut Simulator, recorder: &Recorder) -> String {
        sim.initialise_simulation(secs(0), Duration::seconds(10)).unwrap();
        sim.step().unwrap();
        recorder.outputs.lock().unwrap()[0].clone()
    }

    #[test]
    fn fixed_policies_decide_ties() {
        let recorder = Recorder::default();
        let mut sim = SimulatorBuilder::new(tied_pair("zeta", "alpha"))
            .tie_break(|_| FirstCandidate)
            .observer(recorder.clone())
            .build()
            .unwrap();
        assert_eq!(first_producer(&mut sim, &recorder), "zeta");

        let recorder = Recorder::default();
        let mut sim = SimulatorBuilder::new(tied_pair("zeta", "alpha"))
            .tie_break(|_| LexicographicSelect)
            .observer(recorder.clone())
            .build()
            .unwrap();
        assert_eq!(first_producer(&mut sim, &recorder), "alpha");

        let recorder = Recorder::default();
        let mut sim = SimulatorBuilder::new(tied_pair("zeta", "alpha"))
            .tie_break(|_| |candidates: &[&str]| candidates.len() - 1)
            .observer(recorder.clone())
            .build()
            .unwrap();
        assert_eq!(first_producer(&mut sim, &recorder), "alpha");
    }

    #[test]
    fn seeded_tie_breaks_are_reproducible() {
        let order = |seed: u64| {
            let recorder = Recorder::default();
            let mut sim = SimulatorBuilder::new(tied_pair("a", "b"))
                .seed(seed)
                .observer(recorder.clone())
                .build()
                .unwrap();
            sim.initialise_simulation(secs(0), Duration::seconds(10)).unwrap();
            sim.run().unwrap();
            let outputs = recorder.outputs.lock().unwrap().clone();
            outputs
        };
        for seed in [0, 1, 7, 42] {
            let first = order(seed);
            assert_eq!(first.len(), 2);
            assert_eq!(first, order(seed), "seed {seed}");
        }
    }

    #[test]
    fn out_of_range_selection_is_an_error() {
        let mut sim = SimulatorBuilder::new(tied_pair("a", "b"))
            .tie_break(|_| |_: &[&str]| 9usize)
            .build()
            .unwrap();
        let err = sim.initialise_simulation(secs(0), Duration::seconds(10)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSelection { index: 9, candidates: 2, .. }));
        assert!(sim.is_poisoned());
    }

    #[test]
    fn tied_children_both_fire_at_the_same_instant() {
        let recorder = Recorder::default();
        let mut sim = SimulatorBuilder::new(tied_pair("a", "b"))
            .observer(recorder.clone())
            .build()
            .unwrap();
        sim.initialise_simulation(secs(0), Duration::seconds(10)).unwrap();
        assert_eq!(sim.step().unwrap(), Some(secs(1)));
        assert_eq!(sim.step().unwrap(), Some(secs(1)));
        assert_eq!(sim.step().unwrap(), None);
        assert_eq!(recorder.steps_of("sink").len(), 2);
    }

    /// `q` integrates the value exported by `p`; `q` is defined first.
    fn producer_consumer() -> ModelTree {
        let mut tree = ModelTree::new();
        let q = ContinuousModel::new(
            &ModelContext::new("q", TimeUnit::Seconds),
            0.0,
            Dynamics::continuous(|_, u| u[0], Duration::seconds(1)),
        )
        .with_input("u");
        let p = ContinuousModel::new(
            &ModelContext::new("p", TimeUnit::Seconds),
            10.0,
            Dynamics::continuous(|x, _| -x, Duration::seconds(1)),
        );
        tree.add_atomic("q", q.declared(), Box::new(q)).unwrap();
        tree.add_atomic("p", p.declared(), Box::new(p)).unwrap();
        ModelComposer::compose(
            &mut tree,
            Coupling::new("root")
                .with_submodels(["q", "p"])
                .with_binding(VariableSource::of::<f64>("p", "x"), VariableSink::of::<f64>("q", "u")),
        )
        .unwrap();
        tree.seal("root").unwrap();
        tree
    }

    #[test]
    fn hioa_siblings_step_producers_first() {
        let recorder = Recorder::default();
        let mut sim = SimulatorBuilder::new(producer_consumer())
            .tie_break(|_| FirstCandidate)
            .observer(recorder.clone())
            .build()
            .unwrap();
        sim.initialise_simulation(secs(0), Duration::seconds(2)).unwrap();
        sim.step().unwrap();

        let leaf_steps: Vec<(String, StepKind)> = recorder
            .steps
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _, _)| u != "root")
            .map(|(u, k, _)| (u.clone(), *k))
            .collect();
        assert_eq!(leaf_steps, vec![
            ("p".to_owned(), StepKind::Causal),
            ("q".to_owned(), StepKind::Internal),
        ]);

        assert_eq!(sim.run().unwrap(), 3);
        let report = sim.final_report();
        let p = report.find("p").unwrap().payload_as::<ContinuousReport>().unwrap();
        let q = report.find("q").unwrap().payload_as::<ContinuousReport>().unwrap();
        assert_eq!(p.final_value, 0.0);
        assert_eq!(q.final_value, 10.0);
        assert_eq!(q.final_time, Some(secs(2)));
    }

    #[test]
    fn causal_refresh_brings_hioa_models_forward() {
        let mut sim = SimulatorBuilder::new(producer_consumer()).build().unwrap();
        sim.initialise_simulation(secs(0), Duration::seconds(10)).unwrap();
        sim.causal_event_step_at(Time::new(500, TimeUnit::Milliseconds)).unwrap();

        let half = Time::new(500, TimeUnit::Milliseconds);
        for uri in ["root", "p", "q"] {
            assert_eq!(sim.engine(uri).unwrap().time_of_last_event(), half, "{uri}");
            assert_eq!(sim.engine(uri).unwrap().time_of_next_event(), secs(1), "{uri}");
        }
        let x = sim
            .exported_value("p", "x", devs_core::VariableType::of::<f64>())
            .unwrap()
            .downcast_import::<f64>()
            .unwrap();
        assert!((x.get().unwrap() - 5.0).abs() < 1e-12);
        assert!(sim.causal_event_step_at(secs(2)).is_err());
    }

    #[test]
    fn clocks_and_virtual_synchrony_hold_after_every_step() {
        let mut tree = producer_consumer();
        tree.add_atomic("a", Emitter::declarations(), Box::new(Emitter::new(3, 5))).unwrap();
        tree.add_atomic("b", PassiveModel::declaring(["E"]), Box::new(PassiveModel::new())).unwrap();
        ModelComposer::compose(
            &mut tree,
            Coupling::new("inner")
                .with_submodel("b")
                .with_import("E", EventSink::new("b", "E")),
        )
        .unwrap();
        // `root` is sealed on its own; composing it under `top` and sealing
        // again moves the root.
        ModelComposer::compose(
            &mut tree,
            Coupling::new("top")
                .with_submodels(["root", "a", "inner"])
                .with_connection(EventSource::new("a", "E"), EventSink::new("inner", "E")),
        )
        .unwrap();
        tree.seal("top").unwrap();

        let mut sim = SimulatorBuilder::new(tree)
            .config(SimulationConfig { seed: 3, check_invariants: true, trace_steps: true, ..SimulationConfig::default() })
            .build()
            .unwrap();
        sim.initialise_simulation(secs(0), Duration::seconds(20)).unwrap();

        while sim.step().unwrap().is_some() {
            for id in sim.tree().ids() {
                let uri = sim.tree().uri(id);
                assert!(sim.engine(uri).unwrap().clock().is_consistent(), "{uri}");
                if let Some(c) = sim.coordinator(uri) {
                    for &child in c.children() {
                        let child_engine = sim.engine(sim.tree().uri(child)).unwrap();
                        assert_eq!(
                            child_engine.time_of_last_event() + c.elapsed_of(child).unwrap(),
                            c.time_of_last_event(),
                            "{uri} / {}",
                            sim.tree().uri(child)
                        );
                    }
                }
            }
        }
        let report = sim.final_report();
        let b = report.find("b").unwrap().payload_as::<devs_model::PassiveReport>().unwrap();
        assert_eq!(b.received, 5);
    }

    #[test]
    fn input_at_own_next_event_runs_internal_step_first() {
        let (tree, seen) = emitter_into_pulse();
        let recorder = Recorder::default();
        let mut sim = SimulatorBuilder::new(tree)
            .tie_break(|_| FirstCandidate)
            .observer(recorder.clone())
            .build()
            .unwrap();
        sim.initialise_simulation(secs(0), Duration::seconds(12)).unwrap();
        sim.run().unwrap();

        assert_eq!(
            recorder.steps_of("b"),
            vec![
                (StepKind::Internal, secs(5)),
                (StepKind::External, secs(5)),
                (StepKind::Internal, secs(10)),
                (StepKind::External, secs(10)),
            ]
        );
        // Output of b's internal step reaches c within the same round.
        let times: Vec<Time> = seen.borrow().iter().map(|e| e.time_of_occurrence()).collect();
        assert_eq!(times, vec![secs(5), secs(10)]);
        assert_eq!(recorder.steps_of("c"), vec![(StepKind::External, secs(5)), (StepKind::External, secs(10))]);

        let b = sim.engine("b").unwrap();
        assert_eq!(b.time_of_last_event(), secs(10));
        assert_eq!(b.time_of_next_event(), secs(15));
    }

    #[test]
    fn rejected_collision_is_an_unimplemented_confluent_step() {
        let (tree, seen) = emitter_into_pulse();
        let mut sim = SimulatorBuilder::new(tree)
            .tie_break(|_| FirstCandidate)
            .config(SimulationConfig { collisions: CollisionPolicy::Reject, ..SimulationConfig::default() })
            .build()
            .unwrap();
        sim.initialise_simulation(secs(0), Duration::seconds(12)).unwrap();

        let err = sim.step().unwrap_err();
        assert!(matches!(
            err,
            EngineError::Unimplemented { ref uri, operation: "confluent_event_step" } if uri == "b"
        ));
        assert!(sim.is_poisoned());
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn notifications_name_children_by_uri() {
        let sim = SimulatorBuilder::new(emitter_to_passive()).build().unwrap();
        let mut root = crate::CoordinationEngine::from_tree(
            sim.tree(),
            sim.root(),
            Box::new(FirstCandidate),
        )
        .unwrap();
        root.has_received_external_events("b").unwrap();
        assert_eq!(root.active_children().count(), 1);
        assert!(matches!(
            root.has_received_external_events("ghost"),
            Err(EngineError::NotAChild { .. })
        ));
        assert!(root.has_performed_external_events("b").unwrap());
    }
}
