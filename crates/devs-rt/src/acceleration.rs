use devs_core::{Duration, TimeUnit};

use crate::{RtError, RtResult};

/// How many simulated time units elapse per wall-clock unit.
///
/// `2.0` runs twice as fast as the wall clock: four simulated seconds take
/// two real ones.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AccelerationFactor(f64);

impl AccelerationFactor {
    pub const REAL_TIME: AccelerationFactor = AccelerationFactor(1.0);

    /// Rejects zero, negative, NaN and infinite factors.
    pub fn new(factor: f64) -> RtResult<Self> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(RtError::InvalidAcceleration(factor));
        }
        Ok(Self(factor))
    }

    pub fn get(self) -> f64 {
        self.0
    }

    /// Wall-clock span of a simulated duration; `None` if it is infinite or
    /// longer than a [`std::time::Duration`] can hold.
    pub fn to_wall(self, simulated: Duration) -> Option<std::time::Duration> {
        if simulated.is_infinite() {
            return None;
        }
        std::time::Duration::try_from_secs_f64(simulated.as_secs_f64() / self.0).ok()
    }

    /// Simulated span of a wall-clock duration, rounded to `unit`.
    pub fn to_simulated(self, wall: std::time::Duration, unit: TimeUnit) -> Duration {
        Duration::from_secs_f64(wall.as_secs_f64() * self.0, unit)
    }
}

impl Default for AccelerationFactor {
    fn default() -> Self {
        Self::REAL_TIME
    }
}

impl TryFrom<f64> for AccelerationFactor {
    type Error = RtError;

    fn try_from(factor: f64) -> RtResult<Self> {
        Self::new(factor)
    }
}
