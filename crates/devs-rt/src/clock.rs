//! Wall-clock providers.

use std::future::Future;

use tokio::time::Instant;

/// Source of wall-clock time and sleeps for a [`RealTimeDriver`](crate::RealTimeDriver).
///
/// Drift and fairness are the provider's concern; the driver only asks to
/// be woken at a deadline and reads the current instant.
pub trait WallClock {
    fn now(&self) -> Instant;

    fn sleep_until(&self, deadline: Instant) -> impl Future<Output = ()>;
}

/// Tokio's timer.  Honours paused time under `#[tokio::test(start_paused = true)]`.
#[derive(Copy, Clone, Debug, Default)]
pub struct TokioClock;

impl WallClock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) -> impl Future<Output = ()> {
        tokio::time::sleep_until(deadline)
    }
}
