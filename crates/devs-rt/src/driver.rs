//! The pacing loop.

use devs_core::{Event, SimulationReport, Time};
use devs_engine::{EngineError, Simulator};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::spawn::end_subtrees;
use crate::{
    AccelerationFactor, ExportTarget, RtCommand, RtCommands, RtError, RtHandle, RtResult, RtSimulation,
    TokioClock, WallClock,
};

/// Where simulated time and wall-clock time coincide.
#[derive(Copy, Clone, Debug)]
struct Anchor {
    real:      Instant,
    simulated: Time,
}

/// What a finished real-time run leaves behind.
#[derive(Debug)]
pub struct RtOutcome {
    /// Simulated time the run ended at.
    pub end:      Time,
    /// Internal steps taken.
    pub steps:    u64,
    /// `true` if a [`RtCommand::Stop`] ended the run early.
    pub stopped:  bool,
    pub report:   SimulationReport,
    /// Events exported by the root and not forwarded, oldest first.
    pub exported: Vec<Event>,
    /// Outcomes of the subtrees paced on their own threads.
    pub subtrees: Vec<RtOutcome>,
}

impl RtOutcome {
    /// The report with each subtree's report in place of its stand-in leaf.
    pub fn into_report(self) -> SimulationReport {
        let mut report = self.report;
        for subtree in self.subtrees {
            let subtree = subtree.into_report();
            let uri = subtree.model_uri.clone();
            if !report.graft(subtree) {
                tracing::warn!(model = %uri, "no stand-in for subtree report");
            }
        }
        report
    }
}

/// Paces a [`Simulator`] so that simulated time advances `acceleration`
/// times faster than the wall clock.
///
/// Each internal event at simulated time `t` fires at wall instant
/// `real_start + (t - sim_start) / acceleration`.  While waiting, the driver
/// services commands from its [`RtHandle`]s.  Overdue steps always run
/// before the next command is handled.  A step too far away for the wall
/// clock to represent is only reached through commands, so such a run ends
/// with [`RtCommand::Stop`].
///
/// Subtrees paced on other threads are attached with
/// [`add_subtree`](Self::add_subtree).  However the run ends, they are
/// stopped and awaited before this simulator finalises.
pub struct RealTimeDriver<C: WallClock = TokioClock> {
    sim:          Simulator,
    clock:        C,
    acceleration: AccelerationFactor,
    commands:     mpsc::UnboundedReceiver<RtCommand>,
    /// Dropped when the run starts, so the channel closes with the last user handle.
    handle:       Option<RtHandle>,
    anchor:       Option<Anchor>,
    exports:      Option<ExportTarget>,
    exported:     Vec<Event>,
    subtrees:     Vec<RtSimulation>,
}

impl RealTimeDriver<TokioClock> {
    pub fn new(sim: Simulator, acceleration: AccelerationFactor) -> Self {
        Self::with_clock(sim, acceleration, TokioClock)
    }
}

impl<C: WallClock> RealTimeDriver<C> {
    pub fn with_clock(sim: Simulator, acceleration: AccelerationFactor, clock: C) -> Self {
        Self::with_channel(sim, acceleration, clock, RtHandle::channel())
    }

    /// A driver reading the command stream of an existing handle.
    pub fn with_channel(
        sim: Simulator,
        acceleration: AccelerationFactor,
        clock: C,
        (handle, commands): (RtHandle, RtCommands),
    ) -> Self {
        Self {
            sim,
            clock,
            acceleration,
            commands: commands.0,
            handle: Some(handle),
            anchor: None,
            exports: None,
            exported: Vec::new(),
            subtrees: Vec::new(),
        }
    }

    /// Inject root exports into another run as they happen instead of
    /// keeping them for the outcome.
    pub fn forward_exports(&mut self, target: ExportTarget) {
        self.exports = Some(target);
    }

    /// A run to stop and await before this one finalises.
    pub fn add_subtree(&mut self, subtree: RtSimulation) {
        self.subtrees.push(subtree);
    }

    /// A handle for sending commands.  Take handles before the run starts.
    pub fn handle(&self) -> RtResult<RtHandle> {
        self.handle.clone().ok_or(RtError::Disconnected)
    }

    pub fn simulator(&self) -> &Simulator {
        &self.sim
    }

    pub fn into_simulator(self) -> Simulator {
        self.sim
    }

    pub fn acceleration(&self) -> AccelerationFactor {
        self.acceleration
    }

    // ── Time mapping ──────────────────────────────────────────────────────

    fn anchor(&self) -> RtResult<Anchor> {
        self.anchor.ok_or(RtError::NotStarted)
    }

    /// Wall instant at which simulated time `t` is reached, or `None` if no
    /// representable instant is that far away.
    pub fn deadline(&self, t: Time) -> RtResult<Option<Instant>> {
        let anchor = self.anchor()?;
        let simulated = t
            .checked_duration_since(anchor.simulated)
            .ok_or(RtError::InvalidWindow { start: anchor.simulated, end: t })?;
        Ok(self
            .acceleration
            .to_wall(simulated)
            .and_then(|offset| anchor.real.checked_add(offset)))
    }

    /// Simulated time at wall instant `real`, clamped between the last and
    /// the next event of the root.
    pub fn simulated_at(&self, real: Instant) -> RtResult<Time> {
        let anchor = self.anchor()?;
        let offset = self
            .acceleration
            .to_simulated(real.saturating_duration_since(anchor.real), anchor.simulated.unit());
        let t = anchor.simulated + offset;
        Ok(t.clamp(self.sim.time_of_last_event(), self.sim.time_of_next_event()))
    }

    // ── Run ───────────────────────────────────────────────────────────────

    /// Initialise the simulator over `[sim_start, sim_end]` and run it,
    /// anchored at `real_start`, until the wall clock reaches `sim_end` or a
    /// stop command arrives.  Subtrees end first, depth-first.
    pub async fn start_rt_simulation(
        &mut self,
        real_start: Instant,
        sim_start: Time,
        sim_end: Time,
    ) -> RtResult<RtOutcome> {
        let paced = self.pace(real_start, sim_start, sim_end).await;
        let subtrees = end_subtrees(std::mem::take(&mut self.subtrees));
        let (steps, stopped_at) = paced?;
        let subtrees = subtrees?;

        let end = stopped_at.unwrap_or(sim_end);
        self.sim.end_simulation(end)?;
        self.flush_exports();
        tracing::info!(%end, steps, stopped = stopped_at.is_some(), subtrees = subtrees.len(), "real-time run finished");
        Ok(RtOutcome {
            end,
            steps,
            stopped: stopped_at.is_some(),
            report: self.sim.final_report(),
            exported: std::mem::take(&mut self.exported),
            subtrees,
        })
    }

    /// The pacing loop.  Returns the steps taken and, if stopped, when.
    async fn pace(&mut self, real_start: Instant, sim_start: Time, sim_end: Time) -> RtResult<(u64, Option<Time>)> {
        let duration = sim_end
            .checked_duration_since(sim_start)
            .ok_or(RtError::InvalidWindow { start: sim_start, end: sim_end })?;
        self.sim.initialise_simulation(sim_start, duration)?;
        self.anchor = Some(Anchor { real: real_start, simulated: sim_start });
        self.handle = None;
        tracing::info!(%sim_start, %sim_end, acceleration = self.acceleration.get(), "real-time run started");

        let mut steps = 0;
        let mut listening = true;
        loop {
            let next = self.sim.time_of_next_event();
            let target = if next <= sim_end { next } else { sim_end };
            let deadline = self.deadline(target)?;
            match deadline {
                Some(deadline) if self.clock.now() >= deadline => {
                    if next <= sim_end {
                        self.sim.step()?;
                        self.flush_exports();
                        steps += 1;
                        continue;
                    }
                    return Ok((steps, None));
                }
                // Out of wall-clock reach and nobody left to stop the run.
                None if !listening => {
                    return Err(RtError::InvalidWindow { start: sim_start, end: target });
                }
                _ => {}
            }
            tokio::select! {
                biased;
                () = pause(&self.clock, deadline) => {}
                command = self.commands.recv(), if listening => match command {
                    Some(RtCommand::Stop) => {
                        return Ok((steps, Some(self.simulated_at(self.clock.now())?)));
                    }
                    Some(command) => {
                        self.handle_command(command)?;
                        self.flush_exports();
                    }
                    None => listening = false,
                },
            }
        }
    }

    fn flush_exports(&mut self) {
        let events = self.sim.take_exported_events();
        match &self.exports {
            None => self.exported.extend(events),
            Some(target) => {
                for event in events {
                    if !target.forward(event) {
                        tracing::warn!(model = %target.model_uri, "export target has finished; event dropped");
                    }
                }
            }
        }
    }

    fn handle_command(&mut self, command: RtCommand) -> RtResult<()> {
        let now = self.clock.now();
        match command {
            RtCommand::Inject { model_uri, event } => match self.sim.inject_event(&model_uri, event) {
                Ok(()) => self.schedule_external_event_task(now),
                Err(e) => self.reject(e),
            },
            RtCommand::InjectImported(event) => match self.sim.inject_imported_event(event) {
                Ok(()) => self.schedule_external_event_task(now),
                Err(e) => self.reject(e),
            },
            RtCommand::CausalRefresh => self.schedule_causal_event_task(now),
            RtCommand::Stop => Ok(()),
        }
    }

    /// A rejected injection leaves the run intact unless it poisoned the simulator.
    fn reject(&self, e: EngineError) -> RtResult<()> {
        if self.sim.is_poisoned() {
            return Err(e.into());
        }
        tracing::warn!(error = %e, "command rejected");
        Ok(())
    }

    /// Deliver pending external events at the simulated time matching `real_now`.
    pub fn schedule_external_event_task(&mut self, real_now: Instant) -> RtResult<()> {
        let t = self.simulated_at(real_now)?;
        self.sim.external_event_step_at(t)?;
        Ok(())
    }

    /// Refresh HIOA models at the simulated time matching `real_now`.
    pub fn schedule_causal_event_task(&mut self, real_now: Instant) -> RtResult<()> {
        let t = self.simulated_at(real_now)?;
        self.sim.causal_event_step_at(t)?;
        Ok(())
    }
}

/// Sleep until `deadline`; without one, only a command can end the wait.
async fn pause<C: WallClock>(clock: &C, deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => clock.sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl<C: WallClock> std::fmt::Debug for RealTimeDriver<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealTimeDriver")
            .field("sim", &self.sim)
            .field("acceleration", &self.acceleration)
            .field("anchor", &self.anchor)
            .field("subtrees", &self.subtrees.len())
            .finish_non_exhaustive()
    }
}
