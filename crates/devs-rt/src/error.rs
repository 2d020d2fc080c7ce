use devs_core::Time;
use devs_engine::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RtError {
    /// Acceleration factors must be finite and strictly positive.
    #[error("invalid acceleration factor {0}")]
    InvalidAcceleration(f64),

    #[error("run window ends at {end}, before its start {start}")]
    InvalidWindow { start: Time, end: Time },

    #[error("real-time run has not started")]
    NotStarted,

    /// The driver is gone; the command was not delivered.
    #[error("real-time driver has stopped")]
    Disconnected,

    #[error("building the simulator failed: {0}")]
    Build(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("real-time thread panicked")]
    ThreadPanicked,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type RtResult<T> = Result<T, RtError>;
