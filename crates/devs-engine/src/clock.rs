//! Per-engine clock state and the engine capability shared by all engines.

use devs_core::{Duration, Time};

use crate::{EngineError, EngineResult, ProtocolState};

/// `timeOfLastEvent`, `timeOfNextEvent` and `nextTimeAdvance` of one engine.
///
/// Outside a step the clock satisfies
/// `next_time_advance == time_of_next_event - time_of_last_event`, with an
/// infinite advance meaning an infinite next-event time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EngineClock {
    pub time_of_last_event: Time,
    pub time_of_next_event: Time,
    pub next_time_advance:  Duration,
}

impl EngineClock {
    /// Clock of an engine that has not been initialised.
    pub fn unstarted() -> Self {
        Self {
            time_of_last_event: Time::default(),
            time_of_next_event: Time::INFINITY,
            next_time_advance:  Duration::INFINITY,
        }
    }

    /// Last event at `last`, next event `advance` later.
    pub fn schedule(&mut self, last: Time, advance: Duration) {
        self.time_of_last_event = last;
        self.next_time_advance = advance;
        self.time_of_next_event = last + advance;
    }

    /// Move the last-event time to `current`, keeping the next-event time.
    pub fn resync(&mut self, current: Time) {
        self.time_of_last_event = current;
        self.next_time_advance = self
            .time_of_next_event
            .checked_duration_since(current)
            .unwrap_or(Duration::zero(current.unit()));
    }

    pub fn is_consistent(&self) -> bool {
        if self.next_time_advance.is_infinite() {
            return self.time_of_next_event.is_infinite();
        }
        self.time_of_next_event
            .checked_duration_since(self.time_of_last_event)
            .is_some_and(|d| d == self.next_time_advance)
    }

    pub(crate) fn check(&self, uri: &str, operation: &'static str) -> EngineResult<()> {
        if self.is_consistent() {
            return Ok(());
        }
        Err(EngineError::ClockInconsistency {
            uri: uri.to_owned(),
            operation,
            expected: self
                .time_of_next_event
                .checked_duration_since(self.time_of_last_event)
                .unwrap_or(Duration::INFINITY),
            actual: self.next_time_advance,
        })
    }

    /// Error unless `time` lies in `[time_of_last_event, time_of_next_event]`.
    pub(crate) fn check_within(&self, uri: &str, operation: &'static str, time: Time) -> EngineResult<()> {
        if time < self.time_of_last_event || time > self.time_of_next_event {
            return Err(EngineError::TimeOutOfRange {
                uri: uri.to_owned(),
                operation,
                time,
                earliest: self.time_of_last_event,
                latest: self.time_of_next_event,
            });
        }
        Ok(())
    }
}

/// What every engine, atomic or coordinating, exposes about itself.
pub trait SimulationEngine {
    fn uri(&self) -> &str;

    fn clock(&self) -> &EngineClock;

    fn state(&self) -> ProtocolState;

    fn time_of_last_event(&self) -> Time {
        self.clock().time_of_last_event
    }

    fn time_of_next_event(&self) -> Time {
        self.clock().time_of_next_event
    }

    fn next_time_advance(&self) -> Duration {
        self.clock().next_time_advance
    }

    /// Whether external events are waiting to be consumed in this subtree.
    fn has_pending_external_events(&self) -> bool;
}
