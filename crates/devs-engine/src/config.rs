//! Run configuration threaded through [`SimulatorBuilder`](crate::SimulatorBuilder).

/// Engine-level settings.  No global flags: every simulator carries its own.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationConfig {
    /// Seed of the default random tie-break policy.
    pub seed:             u64,
    /// Verify clock consistency and virtual synchrony after every step.
    pub check_invariants: bool,
    /// Emit a `tracing` debug event for every engine step.
    pub trace_steps:      bool,
    /// Resolution of an input arriving at its consumer's own next-event time.
    #[cfg_attr(feature = "serde", serde(default))]
    pub collisions:       CollisionPolicy,
}

impl SimulationConfig {
    pub fn with_seed(seed: u64) -> Self {
        Self { seed, ..Self::default() }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed:             0,
            check_invariants: true,
            trace_steps:      false,
            collisions:       CollisionPolicy::default(),
        }
    }
}

/// What a coordinator does when a child has inputs waiting at the instant
/// of its own scheduled internal event.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CollisionPolicy {
    /// Output and internal transition first, then the external transition
    /// with zero elapsed time.
    #[default]
    InternalFirst,
    /// Fail with [`EngineError::Unimplemented`](crate::EngineError::Unimplemented)
    /// for `confluent_event_step`.
    Reject,
}
