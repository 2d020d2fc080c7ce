//! Running a real-time simulation on its own thread.

use std::thread::JoinHandle;

use devs_core::Time;
use devs_engine::Simulator;
use tokio::time::Instant;

use crate::{
    AccelerationFactor, ExportTarget, RealTimeDriver, RtCommands, RtError, RtHandle, RtOutcome, RtResult,
};

/// A real-time run on a dedicated thread.
#[derive(Debug)]
pub struct RtSimulation {
    handle: RtHandle,
    thread: JoinHandle<RtResult<RtOutcome>>,
}

impl RtSimulation {
    pub fn handle(&self) -> &RtHandle {
        &self.handle
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the run to end.
    pub fn join(self) -> RtResult<RtOutcome> {
        self.thread.join().map_err(|_| RtError::ThreadPanicked)?
    }
}

/// Stop every run in `subtrees`, then wait for each.  All are awaited even
/// if one fails; the first failure is returned.
pub fn end_subtrees(subtrees: Vec<RtSimulation>) -> RtResult<Vec<RtOutcome>> {
    for rt in &subtrees {
        // Runs past their own end have already closed their channel.
        if rt.handle().stop().is_err() {
            tracing::debug!("subtree already finished");
        }
    }
    let mut outcomes = Vec::with_capacity(subtrees.len());
    let mut failure = None;
    for rt in subtrees {
        match rt.join() {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                failure.get_or_insert(e);
            }
        }
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(outcomes),
    }
}

/// Options for [`spawn`](Self::spawn)ing a run that is part of a larger
/// real-time simulation.
///
/// ```rust,ignore
/// let (parent, commands) = RtHandle::channel();
/// let child = RtSpawner::new(accel, start, end)
///     .forward_exports(ExportTarget::new(parent.clone(), "pump"))
///     .spawn(build_pump)?;
/// let root = RtSpawner::new(accel, start, end)
///     .channel((parent, commands))
///     .subtree(child)
///     .spawn(build_plant)?;
/// ```
#[derive(Debug)]
pub struct RtSpawner {
    name:         String,
    acceleration: AccelerationFactor,
    sim_start:    Time,
    sim_end:      Time,
    real_start:   Option<Instant>,
    channel:      Option<(RtHandle, RtCommands)>,
    exports:      Option<ExportTarget>,
    subtrees:     Vec<RtSimulation>,
}

impl RtSpawner {
    pub fn new(acceleration: AccelerationFactor, sim_start: Time, sim_end: Time) -> Self {
        Self {
            name: "devs-rt".into(),
            acceleration,
            sim_start,
            sim_end,
            real_start: None,
            channel: None,
            exports: None,
            subtrees: Vec::new(),
        }
    }

    /// Thread name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Wall instant of `sim_start`; the moment the thread starts pacing by
    /// default.  Runs sharing it stay in step.
    pub fn anchored_at(mut self, real_start: std::time::Instant) -> Self {
        self.real_start = Some(Instant::from_std(real_start));
        self
    }

    /// Read commands from an existing channel.
    pub fn channel(mut self, channel: (RtHandle, RtCommands)) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn forward_exports(mut self, target: ExportTarget) -> Self {
        self.exports = Some(target);
        self
    }

    /// A run ended and awaited before this one finalises.
    pub fn subtree(mut self, subtree: RtSimulation) -> Self {
        self.subtrees.push(subtree);
        self
    }

    /// Build a simulator with `build` on a new thread and pace it there on
    /// a current-thread tokio runtime.
    ///
    /// Models need not be `Send`: only `build` crosses the thread boundary.
    /// If building fails, the subtrees are ended and the error returned.
    pub fn spawn<F, E>(self, build: F) -> RtResult<RtSimulation>
    where
        F: FnOnce() -> Result<Simulator, E> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let Self { name, acceleration, sim_start, sim_end, real_start, channel, exports, subtrees } = self;
        let (handle_tx, handle_rx) = std::sync::mpsc::sync_channel(1);
        let thread = std::thread::Builder::new()
            .name(name)
            .spawn(move || -> RtResult<RtOutcome> {
                let built = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .map_err(RtError::from)
                    .and_then(|runtime| {
                        let sim = build().map_err(|e| RtError::Build(Box::new(e)))?;
                        Ok((runtime, sim))
                    });
                let (runtime, sim) = match built {
                    Ok(built) => built,
                    Err(e) => {
                        if let Err(ending) = end_subtrees(subtrees) {
                            tracing::warn!(error = %ending, "ending subtrees failed");
                        }
                        return Err(e);
                    }
                };
                let channel = channel.unwrap_or_else(RtHandle::channel);
                let mut driver = RealTimeDriver::with_channel(sim, acceleration, crate::TokioClock, channel);
                if let Some(target) = exports {
                    driver.forward_exports(target);
                }
                for subtree in subtrees {
                    driver.add_subtree(subtree);
                }
                // The receiver only disappears if the spawner is gone.
                let _ = handle_tx.send(driver.handle()?);
                let real_start = real_start.unwrap_or_else(Instant::now);
                runtime.block_on(driver.start_rt_simulation(real_start, sim_start, sim_end))
            })?;

        match handle_rx.recv() {
            Ok(handle) => Ok(RtSimulation { handle, thread }),
            // Setup failed before a handle existed; surface the thread's error.
            Err(_) => match thread.join() {
                Ok(Err(e)) => Err(e),
                Ok(Ok(_)) => Err(RtError::Disconnected),
                Err(_) => Err(RtError::ThreadPanicked),
            },
        }
    }
}

/// Build a simulator with `build` on a new thread and pace it there.
pub fn spawn_rt_simulation<F, E>(
    build: F,
    acceleration: AccelerationFactor,
    sim_start: Time,
    sim_end: Time,
) -> RtResult<RtSimulation>
where
    F: FnOnce() -> Result<Simulator, E> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    RtSpawner::new(acceleration, sim_start, sim_end).spawn(build)
}
