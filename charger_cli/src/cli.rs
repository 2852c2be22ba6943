//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "charger", version, about = "Battery charge regulator CLI")]
pub struct Cli {
    /// Path to config TOML (required by `multi`)
    #[arg(long, value_name = "FILE", default_value = "etc/charger.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Also write JSON-lines logs to this file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Regulation mode selector.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ModeArg {
    VoltageRegulation,
    CurrentLimiting,
    CcCv,
    Custom,
}

impl From<ModeArg> for charger_core::Mode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::VoltageRegulation => charger_core::Mode::VoltageRegulation,
            ModeArg::CurrentLimiting => charger_core::Mode::CurrentLimiting,
            ModeArg::CcCv => charger_core::Mode::CcCv,
            ModeArg::Custom => charger_core::Mode::Custom,
        }
    }
}

#[derive(Args, Debug)]
pub struct RunOpts {
    /// Regulation mode
    #[arg(long, value_enum, default_value_t = ModeArg::CcCv)]
    pub mode: ModeArg,

    /// Battery profile preset (li_ion_single, li_ion_2s, li_ion_3s,
    /// lead_acid_6v, lead_acid_12v, nimh_6cell)
    #[arg(long)]
    pub profile: Option<String>,

    /// Target voltage in volts
    #[arg(long, value_name = "VOLTS")]
    pub target_voltage: Option<f32>,

    /// Target current in mA
    #[arg(long, value_name = "MA")]
    pub target_current: Option<f32>,

    /// Base duty adjustment per control step
    #[arg(long)]
    pub duty_step: Option<u16>,

    /// Uniform loop interval in ms (ignored when the hybrid pair is given)
    #[arg(long, value_name = "MS")]
    pub update_interval_ms: Option<u64>,

    /// Hybrid: sensor read interval in ms
    #[arg(long, value_name = "MS", requires = "actuation_interval_ms")]
    pub sensor_interval_ms: Option<u64>,

    /// Hybrid: actuation interval in ms
    #[arg(long, value_name = "MS", requires = "sensor_interval_ms")]
    pub actuation_interval_ms: Option<u64>,

    /// Logical sensor channel (0..=11)
    #[arg(long, default_value_t = 0)]
    pub sensor_channel: u8,

    /// PWM output channel (0..=15)
    #[arg(long, default_value_t = 0)]
    pub pwm_channel: u8,

    /// Print the final status as JSON on stdout
    #[arg(long, action = ArgAction::SetTrue)]
    pub json_status: bool,

    /// Heartbeat log interval in ms (0 disables)
    #[arg(long, value_name = "MS", default_value_t = 0)]
    pub heartbeat_ms: u64,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Regulate a single channel until Ctrl-C or a safety trip
    Run(RunOpts),
    /// Run every controller in the config file concurrently
    Multi,
    /// Quick health check (hardware presence / sim ok)
    SelfCheck,
}
