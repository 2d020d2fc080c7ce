//! Unit tests for real-time pacing.

use std::sync::{Arc, Mutex};

use devs_compose::{Coupling, ModelComposer, ModelTree};
use devs_core::{Duration, Event, EventSink, EventSource, Time, TimeUnit};
use devs_engine::{SimObserver, Simulator, SimulatorBuilder, StepKind};
use devs_model::{AtomicModel, ModelDeclarations, ModelResult, PassiveModel, PassiveReport};
use tokio::time::Instant;

use crate::{AccelerationFactor, ExportTarget, RealTimeDriver, RtCommand, RtHandle};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn secs(n: u64) -> Time {
    Time::new(n, TimeUnit::Seconds)
}

/// Emits `Tick` once, `delay` after initialisation.
struct OneShot {
    delay: Duration,
    fired: bool,
}

impl AtomicModel for OneShot {
    fn time_advance(&self) -> Duration {
        if self.fired { Duration::INFINITY } else { self.delay }
    }

    fn output(&mut self, current: Time) -> ModelResult<Vec<Event>> {
        Ok(vec![Event::new("Tick", current)])
    }

    fn internal_transition(&mut self, _elapsed: Duration) -> ModelResult<()> {
        self.fired = true;
        Ok(())
    }
}

/// Records the wall instant of every internal step, coordinators included.
#[derive(Clone, Default)]
struct WallLog(Arc<Mutex<Vec<(String, Instant)>>>);

impl SimObserver for WallLog {
    fn on_step(&mut self, uri: &str, kind: StepKind, _time: Time) {
        if kind == StepKind::Internal {
            self.0.lock().unwrap().push((uri.to_owned(), Instant::now()));
        }
    }
}

/// `root { timer: OneShot(delay) --Tick--> sink: Passive }`, with `root`
/// importing `Poke` into `sink`.
fn timer_tree(delay: u64) -> ModelTree {
    let mut tree = ModelTree::new();
    tree.add_atomic(
        "timer",
        ModelDeclarations::new().with_export("Tick"),
        Box::new(OneShot { delay: Duration::seconds(delay), fired: false }),
    )
    .unwrap();
    tree.add_atomic("sink", PassiveModel::declaring(["Tick", "Poke"]), Box::new(PassiveModel::new()))
        .unwrap();
    ModelComposer::compose(
        &mut tree,
        Coupling::new("root")
            .with_submodels(["timer", "sink"])
            .with_connection(EventSource::new("timer", "Tick"), EventSink::new("sink", "Tick"))
            .with_import("Poke", EventSink::new("sink", "Poke")),
    )
    .unwrap();
    tree.seal("root").unwrap();
    tree
}

fn simulator(delay: u64, log: &WallLog) -> Simulator {
    SimulatorBuilder::new(timer_tree(delay)).observer(log.clone()).build().unwrap()
}

fn sink_report(outcome: &crate::RtOutcome) -> &PassiveReport {
    outcome.report.find("sink").unwrap().payload_as::<PassiveReport>().unwrap()
}

// ── AccelerationFactor ────────────────────────────────────────────────────────

#[cfg(test)]
mod acceleration_tests {
    use super::*;
    use crate::RtError;

    #[test]
    fn rejects_non_positive_and_non_finite() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(AccelerationFactor::new(bad), Err(RtError::InvalidAcceleration(_))));
        }
        assert_eq!(AccelerationFactor::new(0.5).unwrap().get(), 0.5);
    }

    #[test]
    fn converts_between_simulated_and_wall_time() {
        let twice = AccelerationFactor::new(2.0).unwrap();
        assert_eq!(twice.to_wall(Duration::seconds(4)), Some(std::time::Duration::from_secs(2)));
        assert_eq!(twice.to_wall(Duration::INFINITY), None);
        assert_eq!(
            twice.to_simulated(std::time::Duration::from_millis(1500), TimeUnit::Milliseconds),
            Duration::millis(3000)
        );
        assert_eq!(AccelerationFactor::default(), AccelerationFactor::REAL_TIME);
    }

    #[test]
    fn spans_beyond_wall_clock_range_have_no_wall_duration() {
        let far = Duration::seconds(u64::MAX - 1);
        assert_eq!(AccelerationFactor::REAL_TIME.to_wall(far), None);
        let crawl = AccelerationFactor::new(1e-300).unwrap();
        assert_eq!(crawl.to_wall(Duration::seconds(2)), None);
        assert_eq!(crawl.to_wall(Duration::seconds(0)), Some(std::time::Duration::ZERO));
    }
}

// ── RealTimeDriver ────────────────────────────────────────────────────────────

#[cfg(test)]
mod driver_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn doubled_speed_fires_four_second_event_after_two() {
        let log = WallLog::default();
        let mut driver = RealTimeDriver::new(simulator(4, &log), AccelerationFactor::new(2.0).unwrap());
        let start = Instant::now();

        let outcome = driver.start_rt_simulation(start, secs(0), secs(6)).await.unwrap();

        let fired: Vec<Instant> = log
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|(uri, _)| uri == "timer")
            .map(|&(_, at)| at)
            .collect();
        assert_eq!(fired.len(), 1);
        let fired_after = fired[0] - start;
        assert!(fired_after >= std::time::Duration::from_secs(2));
        assert!(fired_after < std::time::Duration::from_millis(2010));

        // sim end 6s is reached at wall 3s
        assert!(Instant::now() - start >= std::time::Duration::from_secs(3));
        assert_eq!(outcome.end, secs(6));
        assert_eq!(outcome.steps, 1);
        assert!(!outcome.stopped);
        assert_eq!(sink_report(&outcome).received, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn injected_event_lands_at_matching_simulated_time() {
        let log = WallLog::default();
        let mut driver = RealTimeDriver::new(simulator(100, &log), AccelerationFactor::REAL_TIME);
        let handle = driver.handle().unwrap();
        let start = Instant::now();

        let poker = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            handle.inject_imported(Event::new("Poke", Time::zero(TimeUnit::Seconds))).unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            handle.stop().unwrap();
        });

        let outcome = driver.start_rt_simulation(start, secs(0), secs(10)).await.unwrap();
        poker.await.unwrap();

        assert!(outcome.stopped);
        assert_eq!(outcome.end, secs(3));
        assert_eq!(outcome.steps, 0);
        let sink = sink_report(&outcome);
        assert_eq!(sink.external_steps, 1);
        assert_eq!(sink.last_elapsed, Some(Duration::seconds(1)));
        assert_eq!(driver.simulator().time_of_last_event(), secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn root_exports_go_to_the_export_target() {
        let mut tree = ModelTree::new();
        tree.add_atomic(
            "timer",
            ModelDeclarations::new().with_export("Tick"),
            Box::new(OneShot { delay: Duration::seconds(2), fired: false }),
        )
        .unwrap();
        tree.seal("timer").unwrap();
        let (parent, mut commands) = RtHandle::channel();
        let mut driver = RealTimeDriver::new(SimulatorBuilder::new(tree).build().unwrap(), AccelerationFactor::REAL_TIME);
        driver.forward_exports(ExportTarget::new(parent, "timer-proxy"));

        let outcome = driver.start_rt_simulation(Instant::now(), secs(0), secs(5)).await.unwrap();

        assert!(outcome.exported.is_empty());
        match commands.0.try_recv() {
            Ok(RtCommand::Inject { model_uri, event }) => {
                assert_eq!(model_uri, "timer-proxy");
                assert_eq!(event.event_type().as_str(), "Tick");
                assert_eq!(event.time_of_occurrence(), secs(2));
            }
            other => panic!("expected a forwarded Tick, got {other:?}"),
        }
        assert!(commands.0.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_target_is_rejected_without_ending_the_run() {
        let log = WallLog::default();
        let mut driver = RealTimeDriver::new(simulator(2, &log), AccelerationFactor::REAL_TIME);
        let handle = driver.handle().unwrap();
        handle.inject("nowhere", Event::new("Poke", secs(0))).unwrap();
        drop(handle);

        let outcome = driver.start_rt_simulation(Instant::now(), secs(0), secs(5)).await.unwrap();

        assert!(!driver.simulator().is_poisoned());
        assert_eq!(outcome.steps, 1);
        assert_eq!(outcome.end, secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn handles_close_when_the_run_ends() {
        let log = WallLog::default();
        let mut driver = RealTimeDriver::new(simulator(1, &log), AccelerationFactor::REAL_TIME);
        let handle = driver.handle().unwrap();
        driver.start_rt_simulation(Instant::now(), secs(0), secs(2)).await.unwrap();
        drop(driver);
        assert!(handle.is_closed());
        assert!(handle.refresh().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn run_window_must_not_end_before_it_starts() {
        let log = WallLog::default();
        let mut driver = RealTimeDriver::new(simulator(1, &log), AccelerationFactor::REAL_TIME);
        let err = driver.start_rt_simulation(Instant::now(), secs(5), secs(2)).await.unwrap_err();
        assert!(matches!(err, crate::RtError::InvalidWindow { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn end_beyond_wall_clock_range_runs_until_stopped() {
        let log = WallLog::default();
        let mut driver = RealTimeDriver::new(simulator(2, &log), AccelerationFactor::REAL_TIME);
        let handle = driver.handle().unwrap();
        let start = Instant::now();
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            handle.stop().unwrap();
        });

        let far = Time::new(u64::MAX - 1, TimeUnit::Seconds);
        let outcome = driver.start_rt_simulation(start, secs(0), far).await.unwrap();
        stopper.await.unwrap();

        assert!(outcome.stopped);
        assert_eq!(outcome.steps, 1);
        assert_eq!(outcome.end, secs(5));
        assert_eq!(driver.deadline(far).unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn tiny_acceleration_leaves_steps_to_commands() {
        let log = WallLog::default();
        let mut driver = RealTimeDriver::new(simulator(2, &log), AccelerationFactor::new(1e-300).unwrap());
        driver.handle().unwrap().stop().unwrap();

        let outcome = driver.start_rt_simulation(Instant::now(), secs(0), secs(10)).await.unwrap();

        assert!(outcome.stopped);
        assert_eq!(outcome.steps, 0);
        assert_eq!(outcome.end, secs(0));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_end_without_handles_is_an_invalid_window() {
        let log = WallLog::default();
        let mut driver = RealTimeDriver::new(simulator(2, &log), AccelerationFactor::new(1e-300).unwrap());
        let err = driver.start_rt_simulation(Instant::now(), secs(0), secs(10)).await.unwrap_err();
        assert!(matches!(err, crate::RtError::InvalidWindow { .. }));
    }

    #[test]
    fn time_mapping_needs_a_started_run() {
        let log = WallLog::default();
        let driver = RealTimeDriver::new(simulator(1, &log), AccelerationFactor::REAL_TIME);
        assert!(matches!(driver.simulated_at(Instant::now()), Err(crate::RtError::NotStarted)));
    }
}

// ── spawn_rt_simulation ───────────────────────────────────────────────────────

#[cfg(test)]
mod spawn_tests {
    use super::*;
    use crate::{RtSpawner, spawn_rt_simulation};

    #[test]
    fn spawned_run_is_stopped_through_its_handle() {
        let rt = spawn_rt_simulation(
            || SimulatorBuilder::new(timer_tree(3600)).build(),
            AccelerationFactor::REAL_TIME,
            secs(0),
            secs(7200),
        )
        .unwrap();
        rt.handle().inject_imported(Event::new("Poke", secs(0))).unwrap();
        rt.handle().stop().unwrap();

        let outcome = rt.join().unwrap();
        assert!(outcome.stopped);
        assert_eq!(outcome.steps, 0);
        assert_eq!(sink_report(&outcome).external_steps, 1);
    }

    #[test]
    fn build_failure_is_reported() {
        let err = spawn_rt_simulation(
            || SimulatorBuilder::new(ModelTree::new()).build(),
            AccelerationFactor::REAL_TIME,
            secs(0),
            secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, crate::RtError::Build(_)));
    }

    #[test]
    fn fast_run_finishes_on_its_own() {
        let rt = spawn_rt_simulation(
            || SimulatorBuilder::new(timer_tree(10)).build(),
            AccelerationFactor::new(1000.0).unwrap(),
            secs(0),
            secs(20),
        )
        .unwrap();
        let outcome = rt.join().unwrap();
        assert!(!outcome.stopped);
        assert_eq!(outcome.steps, 1);
        assert_eq!(outcome.end, secs(20));
    }

    #[test]
    fn stopping_a_run_ends_its_subtrees_first() {
        let child = spawn_rt_simulation(
            || SimulatorBuilder::new(timer_tree(3600)).build(),
            AccelerationFactor::REAL_TIME,
            secs(0),
            secs(7200),
        )
        .unwrap();
        let parent = RtSpawner::new(AccelerationFactor::REAL_TIME, secs(0), secs(7200))
            .name("devs-rt:parent")
            .subtree(child)
            .spawn(|| SimulatorBuilder::new(timer_tree(3600)).build())
            .unwrap();
        parent.handle().stop().unwrap();

        let outcome = parent.join().unwrap();
        assert!(outcome.stopped);
        assert_eq!(outcome.subtrees.len(), 1);
        assert!(outcome.subtrees[0].stopped);
        assert_eq!(outcome.subtrees[0].steps, 0);
    }

    #[test]
    fn failed_build_ends_the_subtrees() {
        let child = spawn_rt_simulation(
            || SimulatorBuilder::new(timer_tree(3600)).build(),
            AccelerationFactor::REAL_TIME,
            secs(0),
            secs(7200),
        )
        .unwrap();
        let child_handle = child.handle().clone();
        let err = RtSpawner::new(AccelerationFactor::REAL_TIME, secs(0), secs(7200))
            .subtree(child)
            .spawn(|| SimulatorBuilder::new(ModelTree::new()).build())
            .unwrap_err();
        assert!(matches!(err, crate::RtError::Build(_)));
        assert!(child_handle.is_closed());
    }
}

// ── RemoteSubtree ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod remote_tests {
    use super::*;
    use crate::{RemoteSubtree, RemoteSubtreeReport};

    fn pump_declarations() -> ModelDeclarations {
        ModelDeclarations::new().with_import("Start").with_export("Done")
    }

    #[test]
    fn declares_exports_as_imports_too() {
        let declarations = RemoteSubtree::declarations(&pump_declarations());
        assert!(declarations.imports_event(&"Start".into()));
        assert!(declarations.imports_event(&"Done".into()));
        assert!(declarations.exports_event(&"Done".into()));
        assert!(!declarations.exports_event(&"Start".into()));
    }

    #[test]
    fn imports_are_sent_on_and_exports_emitted() {
        let (handle, mut commands) = RtHandle::channel();
        let mut pump = RemoteSubtree::new(handle, &pump_declarations(), TimeUnit::Seconds);
        assert_eq!(pump.time_advance(), Duration::INFINITY);

        pump.apply_event(&Event::new("Start", secs(3))).unwrap();
        assert!(matches!(commands.0.try_recv(), Ok(RtCommand::InjectImported(ref e)) if e.event_type().as_str() == "Start"));
        assert_eq!(pump.time_advance(), Duration::INFINITY);

        pump.apply_event(&Event::new("Done", secs(4))).unwrap();
        assert_eq!(pump.time_advance(), Duration::zero(TimeUnit::Seconds));
        let out = pump.output(secs(5)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].time_of_occurrence(), secs(5));
        pump.internal_transition(Duration::zero(TimeUnit::Seconds)).unwrap();
        assert_eq!(pump.time_advance(), Duration::INFINITY);

        drop(commands);
        pump.apply_event(&Event::new("Start", secs(6))).unwrap();
        let report = pump.final_report("pump");
        assert_eq!(
            report.payload_as::<RemoteSubtreeReport>(),
            Some(&RemoteSubtreeReport { forwarded: 1, emitted: 1, dropped: 1 })
        );
    }
}
