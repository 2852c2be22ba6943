//! Mode-dispatched regulation engine.
//!
//! The engine owns the duty-cycle state and the PWM output. It consumes one
//! sample per step and emits at most one duty update, chosen by the active
//! mode's step algorithm. It performs no timing and no safety checks of its
//! own; the scheduler in `scheduler` drives it.

use charger_traits::{PwmOutput, Sample};
use eyre::WrapErr;

use crate::config::ControlCfg;
use crate::error::{ChargerError, Result};
use crate::status::ControllerStatus;
use crate::target::{ControlTuning, TargetHandle};

/// Regulation modes. `Stopped` is both the initial and the terminal state;
/// transitions into a running mode are explicit `start` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    VoltageRegulation,
    CurrentLimiting,
    /// Constant-current until the voltage target is reached, then
    /// constant-voltage.
    CcCv,
    /// No built-in step; runs the caller-supplied step closure if any.
    Custom,
    Stopped,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::VoltageRegulation => "voltage_regulation",
            Mode::CurrentLimiting => "current_limiting",
            Mode::CcCv => "cc_cv",
            Mode::Custom => "custom",
            Mode::Stopped => "stopped",
        }
    }
}

impl core::fmt::Display for Mode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error-magnitude tiers for the adaptive step multiplier, largest first.
const VOLTAGE_TIERS: [f32; 3] = [1.0, 0.5, 0.2]; // volts
const CURRENT_TIERS: [f32; 3] = [500.0, 250.0, 100.0]; // milliamps

/// Step multiplier for an absolute error against descending tier
/// thresholds: big errors converge fast, small errors keep precision.
#[inline]
fn tier_multiplier(abs_err: f32, tiers: [f32; 3]) -> u16 {
    if abs_err > tiers[0] {
        8
    } else if abs_err > tiers[1] {
        4
    } else if abs_err > tiers[2] {
        2
    } else {
        1
    }
}

/// Caller-supplied step for `Mode::Custom`: receives the sample and the
/// current duty, returns the desired duty (still clamped by the engine) or
/// `None` to skip actuation this cycle.
pub type CustomStep = Box<dyn FnMut(&Sample, u16) -> Option<u16>>;

pub struct RegulationEngine<P: PwmOutput> {
    pwm: P,
    targets: TargetHandle,
    min_duty: u16,
    max_duty: u16,
    duty: u16,
    mode: Mode,
    cycle_count: u64,
    start_ms: Option<u64>,
    last_sample: Option<Sample>,
    custom_step: Option<CustomStep>,
}

impl<P: PwmOutput> core::fmt::Debug for RegulationEngine<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegulationEngine")
            .field("mode", &self.mode)
            .field("duty", &self.duty)
            .field("cycle_count", &self.cycle_count)
            .finish()
    }
}

impl<P: PwmOutput> RegulationEngine<P> {
    /// The engine starts stopped with the output at its disabled duty value.
    /// No write is issued until a run starts or the duty is set manually.
    pub fn new(pwm: P, cfg: &ControlCfg, targets: TargetHandle) -> Self {
        Self {
            pwm,
            targets,
            min_duty: cfg.min_duty,
            max_duty: cfg.max_duty,
            duty: cfg.max_duty,
            mode: Mode::Stopped,
            cycle_count: 0,
            start_ms: None,
            last_sample: None,
            custom_step: None,
        }
    }

    pub fn set_custom_step(&mut self, step: CustomStep) {
        self.custom_step = Some(step);
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.mode != Mode::Stopped
    }

    pub fn duty(&self) -> u16 {
        self.duty
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn last_sample(&self) -> Option<Sample> {
        self.last_sample
    }

    /// Handle for runtime target/tuning adjustments.
    pub fn targets(&self) -> TargetHandle {
        self.targets.clone()
    }

    pub(crate) fn tuning(&self) -> ControlTuning {
        self.targets.snapshot()
    }

    /// Begin a run: `Stopped -> mode`, statistics reset. Rejected without a
    /// state change when `mode` is `Stopped` or a run is already active.
    pub fn start(&mut self, mode: Mode, now_ms: u64) -> Result<()> {
        if mode == Mode::Stopped {
            return Err(eyre::Report::new(ChargerError::InvalidMode(
                "cannot start into stopped",
            )));
        }
        if self.is_running() {
            return Err(eyre::Report::new(ChargerError::State(
                "regulation already running".into(),
            )));
        }
        self.mode = mode;
        self.cycle_count = 0;
        self.start_ms = Some(now_ms);
        self.last_sample = None;
        tracing::info!(mode = %mode, "regulation started");
        Ok(())
    }

    /// Apply one control step of the active mode. Every call counts one
    /// cycle. Fails when stopped or when the actuator write fails.
    pub fn apply_step(&mut self, sample: &Sample) -> Result<()> {
        if !self.is_running() {
            return Err(eyre::Report::new(ChargerError::State(
                "engine is stopped".into(),
            )));
        }
        self.last_sample = Some(*sample);
        self.cycle_count += 1;
        let tuning = self.tuning();
        match self.mode {
            Mode::VoltageRegulation => self.voltage_step(sample, &tuning),
            Mode::CurrentLimiting => self.current_step(sample, &tuning),
            Mode::CcCv => self.cc_cv_step(sample, &tuning),
            Mode::Custom => self.run_custom_step(sample),
            Mode::Stopped => Ok(()),
        }
    }

    fn voltage_step(&mut self, sample: &Sample, t: &ControlTuning) -> Result<()> {
        let err = sample.voltage - t.target.target_voltage;
        if err.abs() <= t.target.voltage_tolerance {
            return Ok(());
        }
        let step = t
            .duty_step
            .saturating_mul(tier_multiplier(err.abs(), VOLTAGE_TIERS));
        // Measured above target: raise duty (less delivered power on this
        // topology); below target: lower it.
        self.nudge_duty(err > 0.0, step)
    }

    fn current_step(&mut self, sample: &Sample, t: &ControlTuning) -> Result<()> {
        let err = sample.current_ma - t.target.target_current;
        if err.abs() <= t.target.current_tolerance {
            return Ok(());
        }
        let step = t
            .duty_step
            .saturating_mul(tier_multiplier(err.abs(), CURRENT_TIERS));
        self.nudge_duty(err > 0.0, step)
    }

    fn cc_cv_step(&mut self, sample: &Sample, t: &ControlTuning) -> Result<()> {
        // The phase is re-derived from the live sample every cycle: no
        // tracking flag, so it self-corrects if voltage sags below target.
        if sample.voltage < t.target.target_voltage {
            self.current_step(sample, t)
        } else {
            self.voltage_step(sample, t)
        }
    }

    fn run_custom_step(&mut self, sample: &Sample) -> Result<()> {
        let Some(mut step) = self.custom_step.take() else {
            return Ok(());
        };
        let desired = step(sample, self.duty);
        self.custom_step = Some(step);
        match desired {
            Some(duty) => self.write_clamped(duty),
            None => Ok(()),
        }
    }

    /// Move duty one step toward max (`raise`) or min.
    fn nudge_duty(&mut self, raise: bool, step: u16) -> Result<()> {
        let next = if raise {
            self.duty.saturating_add(step)
        } else {
            self.duty.saturating_sub(step)
        };
        self.write_clamped(next)
    }

    /// Clamp to the duty range and write. Writes that would not change the
    /// clamped value are suppressed; duty state only advances after a
    /// successful write.
    fn write_clamped(&mut self, duty: u16) -> Result<()> {
        let clamped = duty.clamp(self.min_duty, self.max_duty);
        if clamped == self.duty {
            return Ok(());
        }
        self.pwm
            .write_duty(clamped)
            .map_err(|e| eyre::Report::new(map_hw_error_dyn(&*e)))
            .wrap_err("write duty")?;
        self.duty = clamped;
        Ok(())
    }

    /// Manual duty override. Validates against the configured range and
    /// leaves state unchanged on rejection.
    pub fn set_duty_cycle(&mut self, duty: u16) -> Result<()> {
        if duty < self.min_duty || duty > self.max_duty {
            tracing::warn!(
                duty,
                min = self.min_duty,
                max = self.max_duty,
                "rejected duty cycle outside range"
            );
            return Err(eyre::Report::new(ChargerError::InvalidParameter(
                "duty cycle outside range",
            )));
        }
        self.write_clamped(duty)?;
        tracing::info!(duty, "duty cycle set");
        Ok(())
    }

    /// Halt the run: force the output to its disabled duty and transition to
    /// `Stopped`. A no-op when already stopped, so repeated cancellation
    /// leaves duty and statistics untouched.
    pub fn halt(&mut self) -> Result<()> {
        if self.mode == Mode::Stopped {
            return Ok(());
        }
        self.mode = Mode::Stopped;
        // Max duty corresponds to minimum delivered power on this hardware.
        self.write_clamped(self.max_duty)
    }

    /// Status snapshot at `now_ms` (same epoch as `start`).
    pub fn status(&self, now_ms: u64) -> ControllerStatus {
        let t = self.tuning();
        ControllerStatus {
            mode: self.mode,
            running: self.is_running(),
            last_sample: self.last_sample,
            target_voltage: t.target.target_voltage,
            target_current: t.target.target_current,
            duty: self.duty,
            cycle_count: self.cycle_count,
            runtime_seconds: self
                .start_ms
                .map(|s| crate::util::ms_to_secs(now_ms.saturating_sub(s)))
                .unwrap_or(0.0),
        }
    }
}

// Map any boxed actuator error to a typed ChargerError, downcasting known
// hardware errors when the hardware crate is linked.
#[cfg(feature = "hardware-errors")]
fn map_hw_error_dyn(e: &(dyn std::error::Error + 'static)) -> ChargerError {
    if let Some(hw) = e.downcast_ref::<charger_hardware::error::HwError>() {
        ChargerError::ActuatorFault(hw.to_string())
    } else {
        ChargerError::Actuator(e.to_string())
    }
}

#[cfg(not(feature = "hardware-errors"))]
fn map_hw_error_dyn(e: &(dyn std::error::Error + 'static)) -> ChargerError {
    ChargerError::Actuator(e.to_string())
}
