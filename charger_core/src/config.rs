//! Runtime configuration types for the regulation engine and scheduler.
//!
//! These are the in-memory config structs used by the core. They are
//! separate from the TOML-deserialized schema in `charger_config`; see
//! `conversions` for the bridge.

use std::time::Duration;

/// Control configuration: regulation targets, tolerances, and duty range.
#[derive(Debug, Clone)]
pub struct ControlCfg {
    /// Target voltage in volts.
    pub target_voltage: f32,
    /// Target current in milliamps.
    pub target_current: f32,
    /// Regulation dead band around the voltage target (volts).
    pub voltage_tolerance: f32,
    /// Regulation dead band around the current target (milliamps).
    pub current_tolerance: f32,
    /// Base duty adjustment per step; tier multipliers scale this up.
    pub duty_step: u16,
    /// Lowest duty value the engine will ever write.
    pub min_duty: u16,
    /// Highest duty value; also the "output disabled" value on this topology.
    pub max_duty: u16,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            target_voltage: 7.2,
            target_current: 1000.0,
            voltage_tolerance: 0.05,
            current_tolerance: 50.0,
            duty_step: 2,
            min_duty: 0,
            max_duty: 4095,
        }
    }
}

/// Scheduler cadence. With equal intervals every actuation cycle re-reads
/// the sensor (the simple, non-hybrid case); a longer sensor interval
/// enables hybrid mode, where cached measurements drive actuation between
/// reads.
#[derive(Debug, Clone)]
pub struct TimingCfg {
    /// How often a fresh sample is taken.
    pub sensor_read_interval: Duration,
    /// How often a control step runs (the per-cycle sleep).
    pub actuation_interval: Duration,
    /// Max sensor wait per read.
    pub sensor_timeout: Duration,
}

impl TimingCfg {
    /// Single-cadence timing: sample and actuate every `update_interval`.
    pub fn uniform(update_interval: Duration) -> Self {
        Self {
            sensor_read_interval: update_interval,
            actuation_interval: update_interval,
            sensor_timeout: Duration::from_millis(150),
        }
    }

    /// Dual-cadence timing: sample slowly, actuate quickly off the cache.
    pub fn hybrid(sensor_read_interval: Duration, actuation_interval: Duration) -> Self {
        Self {
            sensor_read_interval,
            actuation_interval,
            sensor_timeout: Duration::from_millis(150),
        }
    }

    pub fn is_hybrid(&self) -> bool {
        self.sensor_read_interval != self.actuation_interval
    }
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self::uniform(Duration::from_millis(10))
    }
}

/// Absolute safety limits a sample must stay under.
#[derive(Debug, Clone, Copy)]
pub struct SafetyLimits {
    /// Maximum safe bus voltage in volts.
    pub max_voltage: f32,
    /// Maximum safe current in milliamps.
    pub max_current: f32,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_voltage: 30.0,
            max_current: 5000.0,
        }
    }
}
