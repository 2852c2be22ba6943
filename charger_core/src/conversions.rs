//! `From` implementations bridging `charger_config` types to `charger_core`
//! types, so the CLI never maps fields by hand.

use std::time::Duration;

use crate::config::{ControlCfg, SafetyLimits, TimingCfg};
use crate::engine::Mode;

// ── ControlCfg ───────────────────────────────────────────────────────────────

impl From<&charger_config::ControlCfg> for ControlCfg {
    fn from(c: &charger_config::ControlCfg) -> Self {
        Self {
            target_voltage: c.target_voltage,
            target_current: c.target_current,
            voltage_tolerance: c.voltage_tolerance,
            current_tolerance: c.current_tolerance,
            duty_step: c.duty_step,
            min_duty: c.min_duty,
            max_duty: c.max_duty,
        }
    }
}

// ── TimingCfg ────────────────────────────────────────────────────────────────

impl From<&charger_config::TimingCfg> for TimingCfg {
    fn from(c: &charger_config::TimingCfg) -> Self {
        let mut timing = match (c.sensor_read_interval_ms, c.actuation_interval_ms) {
            (Some(sensor), Some(actuation)) => TimingCfg::hybrid(
                Duration::from_millis(sensor),
                Duration::from_millis(actuation),
            ),
            _ => TimingCfg::uniform(Duration::from_millis(c.update_interval_ms)),
        };
        timing.sensor_timeout = Duration::from_millis(c.sensor_timeout_ms);
        timing
    }
}

// ── SafetyLimits ─────────────────────────────────────────────────────────────

impl From<&charger_config::Safety> for SafetyLimits {
    fn from(c: &charger_config::Safety) -> Self {
        Self {
            max_voltage: c.max_voltage,
            max_current: c.max_current,
        }
    }
}

// ── Mode ─────────────────────────────────────────────────────────────────────

impl From<charger_config::ModeCfg> for Mode {
    fn from(m: charger_config::ModeCfg) -> Self {
        match m {
            charger_config::ModeCfg::VoltageRegulation => Mode::VoltageRegulation,
            charger_config::ModeCfg::CurrentLimiting => Mode::CurrentLimiting,
            charger_config::ModeCfg::CcCv => Mode::CcCv,
            charger_config::ModeCfg::Custom => Mode::Custom,
        }
    }
}
