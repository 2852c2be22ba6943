#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas for the charge-regulation system.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - A deployment is a list of `[[controller]]` tables, each binding one
//!   sensor channel and one PWM channel to its own targets and cadence.
//! - Battery profiles provide named target presets.

use serde::Deserialize;

/// Regulation mode selector as written in config files.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModeCfg {
    #[default]
    VoltageRegulation,
    CurrentLimiting,
    CcCv,
    Custom,
}

/// Regulation targets and duty parameters for one controller.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ControlCfg {
    /// Target voltage in volts.
    pub target_voltage: f32,
    /// Target current in milliamps.
    pub target_current: f32,
    /// Dead band around the voltage target (volts).
    pub voltage_tolerance: f32,
    /// Dead band around the current target (milliamps).
    pub current_tolerance: f32,
    /// Base duty adjustment per control step.
    pub duty_step: u16,
    pub min_duty: u16,
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

/// Loop cadence for one controller. Setting both hybrid intervals selects
/// hybrid mode; otherwise `update_interval_ms` is used for both sampling
/// and actuation.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimingCfg {
    /// Uniform cadence in milliseconds; ignored when the hybrid pair is set.
    pub update_interval_ms: u64,
    /// Hybrid: how often to take a fresh sample (ms).
    pub sensor_read_interval_ms: Option<u64>,
    /// Hybrid: how often to run a control step (ms).
    pub actuation_interval_ms: Option<u64>,
    /// Max sensor wait per read (ms).
    pub sensor_timeout_ms: u64,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            update_interval_ms: 10,
            sensor_read_interval_ms: None,
            actuation_interval_ms: None,
            sensor_timeout_ms: 150,
        }
    }
}

impl TimingCfg {
    pub fn is_hybrid(&self) -> bool {
        self.sensor_read_interval_ms.is_some() && self.actuation_interval_ms.is_some()
    }
}

/// Absolute safety limits, shared by all controllers.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Safety {
    /// Maximum safe bus voltage in volts.
    pub max_voltage: f32,
    /// Maximum safe current in milliamps.
    pub max_current: f32,
}

impl Default for Safety {
    fn default() -> Self {
        Self {
            max_voltage: 30.0,
            max_current: 5000.0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// PWM chip parameters (one PCA9685 per deployment).
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Pwm {
    /// I2C address of the PWM chip.
    pub address: u8,
    /// Output frequency in Hz.
    pub frequency_hz: u16,
}

impl Default for Pwm {
    fn default() -> Self {
        Self {
            address: 0x40,
            frequency_hz: 1526,
        }
    }
}

/// One regulated channel.
#[derive(Debug, Deserialize, Clone)]
pub struct ControllerCfg {
    pub name: String,
    /// Logical sensor channel 0..=11 (mapped across INA3221 addresses).
    #[serde(default)]
    pub sensor_channel: u8,
    /// PWM output channel 0..=15.
    #[serde(default)]
    pub pwm_channel: u8,
    #[serde(default)]
    pub mode: ModeCfg,
    /// Optional battery profile; overrides the control targets when set.
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub control: ControlCfg,
    #[serde(default)]
    pub timing: TimingCfg,
}

impl ControllerCfg {
    /// Control config with the battery profile (if any) applied on top.
    pub fn resolved_control(&self) -> eyre::Result<ControlCfg> {
        let mut control = self.control.clone();
        if let Some(key) = &self.profile {
            let Some(p) = profiles::lookup(key) else {
                eyre::bail!("controller '{}': unknown battery profile '{key}'", self.name);
            };
            control.target_voltage = p.voltage;
            control.target_current = p.current_ma;
        }
        Ok(control)
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(rename = "controller")]
    pub controllers: Vec<ControllerCfg>,
    #[serde(default)]
    pub safety: Safety,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub pwm: Pwm,
    /// Aggregate status log cadence (ms).
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

fn default_status_interval_ms() -> u64 {
    1000
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.controllers.is_empty() {
            eyre::bail!("config must define at least one [[controller]]");
        }
        if !(self.safety.max_voltage.is_finite() && self.safety.max_voltage > 0.0) {
            eyre::bail!("safety.max_voltage must be a positive number");
        }
        if !(self.safety.max_current.is_finite() && self.safety.max_current > 0.0) {
            eyre::bail!("safety.max_current must be a positive number");
        }
        if self.status_interval_ms == 0 {
            eyre::bail!("status_interval_ms must be >= 1");
        }

        let mut names: Vec<&str> = Vec::new();
        let mut sensor_channels: Vec<u8> = Vec::new();
        let mut pwm_channels: Vec<u8> = Vec::new();
        for c in &self.controllers {
            if c.name.trim().is_empty() {
                eyre::bail!("every controller needs a non-empty name");
            }
            if names.contains(&c.name.as_str()) {
                eyre::bail!("duplicate controller name '{}'", c.name);
            }
            names.push(&c.name);

            if c.sensor_channel > 11 {
                eyre::bail!(
                    "controller '{}': sensor_channel {} out of range 0..=11",
                    c.name,
                    c.sensor_channel
                );
            }
            if sensor_channels.contains(&c.sensor_channel) {
                eyre::bail!(
                    "controller '{}': sensor_channel {} already in use",
                    c.name,
                    c.sensor_channel
                );
            }
            sensor_channels.push(c.sensor_channel);

            if c.pwm_channel > 15 {
                eyre::bail!(
                    "controller '{}': pwm_channel {} out of range 0..=15",
                    c.name,
                    c.pwm_channel
                );
            }
            if pwm_channels.contains(&c.pwm_channel) {
                eyre::bail!(
                    "controller '{}': pwm_channel {} already in use",
                    c.name,
                    c.pwm_channel
                );
            }
            pwm_channels.push(c.pwm_channel);

            let control = c.resolved_control()?;
            validate_control(&c.name, &control, &self.safety)?;
            validate_timing(&c.name, &c.timing)?;
        }
        Ok(())
    }
}

fn validate_control(name: &str, control: &ControlCfg, safety: &Safety) -> eyre::Result<()> {
    if !(control.target_voltage.is_finite()
        && control.target_voltage > 0.0
        && control.target_voltage <= safety.max_voltage)
    {
        eyre::bail!(
            "controller '{name}': target_voltage {} outside (0, {}]",
            control.target_voltage,
            safety.max_voltage
        );
    }
    if !(control.target_current.is_finite()
        && control.target_current > 0.0
        && control.target_current <= safety.max_current)
    {
        eyre::bail!(
            "controller '{name}': target_current {} outside (0, {}]",
            control.target_current,
            safety.max_current
        );
    }
    if !(control.voltage_tolerance.is_finite() && control.voltage_tolerance >= 0.0) {
        eyre::bail!("controller '{name}': voltage_tolerance must be >= 0");
    }
    if !(control.current_tolerance.is_finite() && control.current_tolerance >= 0.0) {
        eyre::bail!("controller '{name}': current_tolerance must be >= 0");
    }
    if control.duty_step == 0 {
        eyre::bail!("controller '{name}': duty_step must be >= 1");
    }
    if control.min_duty >= control.max_duty {
        eyre::bail!("controller '{name}': min_duty must be < max_duty");
    }
    Ok(())
}

fn validate_timing(name: &str, timing: &TimingCfg) -> eyre::Result<()> {
    match (timing.sensor_read_interval_ms, timing.actuation_interval_ms) {
        (Some(s), Some(a)) => {
            if s == 0 || a == 0 {
                eyre::bail!("controller '{name}': hybrid intervals must be >= 1 ms");
            }
        }
        (None, None) => {
            if timing.update_interval_ms == 0 {
                eyre::bail!("controller '{name}': update_interval_ms must be >= 1");
            }
        }
        _ => eyre::bail!(
            "controller '{name}': hybrid timing requires both sensor_read_interval_ms and actuation_interval_ms"
        ),
    }
    if timing.sensor_timeout_ms == 0 {
        eyre::bail!("controller '{name}': sensor_timeout_ms must be >= 1");
    }
    Ok(())
}

/// Named battery charge presets (target voltage / current).
pub mod profiles {
    #[derive(Debug, Clone, Copy)]
    pub struct Profile {
        pub key: &'static str,
        pub name: &'static str,
        /// Charge voltage in volts.
        pub voltage: f32,
        /// Charge current in milliamps.
        pub current_ma: f32,
    }

    pub const PROFILES: [Profile; 6] = [
        Profile {
            key: "li_ion_single",
            name: "Li-ion Single Cell",
            voltage: 4.2,
            current_ma: 1000.0,
        },
        Profile {
            key: "li_ion_2s",
            name: "Li-ion 2S Pack",
            voltage: 8.4,
            current_ma: 2000.0,
        },
        Profile {
            key: "li_ion_3s",
            name: "Li-ion 3S Pack",
            voltage: 12.6,
            current_ma: 2000.0,
        },
        Profile {
            key: "lead_acid_6v",
            name: "6V Lead Acid",
            voltage: 7.2,
            current_ma: 1500.0,
        },
        Profile {
            key: "lead_acid_12v",
            name: "12V Lead Acid",
            voltage: 14.4,
            current_ma: 3000.0,
        },
        Profile {
            key: "nimh_6cell",
            name: "NiMH 6-Cell",
            voltage: 8.4,
            current_ma: 1000.0,
        },
    ];

    pub fn lookup(key: &str) -> Option<&'static Profile> {
        PROFILES.iter().find(|p| p.key == key)
    }
}
