use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ChargerError {
    #[error("actuator write failed: {0}")]
    Actuator(String),
    #[error("actuator fault: {0}")]
    ActuatorFault(String),
    #[error("invalid mode: {0}")]
    InvalidMode(&'static str),
    #[error("parameter out of range: {0}")]
    InvalidParameter(&'static str),
    #[error("invalid state: {0}")]
    State(String),
}

/// Why the safety monitor halted a run. Ordered by evaluation priority.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TripReason {
    #[error("invalid measurement")]
    InvalidMeasurement,
    #[error("overvoltage")]
    Overvoltage,
    #[error("overcurrent")]
    Overcurrent,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing power sensor")]
    MissingSensor,
    #[error("missing pwm output")]
    MissingPwm,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
