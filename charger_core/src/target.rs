//! Operator-adjustable regulation targets.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::SafetyLimits;
use crate::error::ChargerError;

/// The regulation target tuple. Mutations replace the whole tuple through
/// `TargetHandle`; the engine snapshots it once per control step, so a
/// change takes effect on the next step with no further synchronization.
#[derive(Debug, Clone, Copy)]
pub struct ControlTarget {
    pub target_voltage: f32,
    pub target_current: f32,
    pub voltage_tolerance: f32,
    pub current_tolerance: f32,
}

/// Everything an operator may adjust while a run is active.
#[derive(Debug, Clone, Copy)]
pub struct ControlTuning {
    pub target: ControlTarget,
    /// Base duty adjustment per step.
    pub duty_step: u16,
    /// Per-cycle sleep of the scheduler.
    pub actuation_interval: Duration,
}

/// Shared handle to the live tuning. Setters validate against the safety
/// limits, log rejects, and return an error instead of panicking; a
/// rejected value leaves the tuning unchanged.
#[derive(Clone)]
pub struct TargetHandle {
    inner: Arc<Mutex<ControlTuning>>,
    limits: SafetyLimits,
}

impl TargetHandle {
    pub fn new(tuning: ControlTuning, limits: SafetyLimits) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tuning)),
            limits,
        }
    }

    /// Copy of the current tuning.
    pub fn snapshot(&self) -> ControlTuning {
        match self.inner.lock() {
            Ok(g) => *g,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn update(&self, f: impl FnOnce(&mut ControlTuning)) {
        let mut g = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut g);
    }

    pub fn set_target_voltage(&self, volts: f32) -> Result<(), ChargerError> {
        if !volts.is_finite() || volts < 0.0 || volts > self.limits.max_voltage {
            tracing::warn!(
                volts,
                max = self.limits.max_voltage,
                "rejected target voltage outside safe range"
            );
            return Err(ChargerError::InvalidParameter(
                "target voltage outside safe range",
            ));
        }
        self.update(|t| t.target.target_voltage = volts);
        tracing::info!(volts, "target voltage set");
        Ok(())
    }

    pub fn set_target_current(&self, milliamps: f32) -> Result<(), ChargerError> {
        if !milliamps.is_finite() || milliamps < 0.0 || milliamps > self.limits.max_current {
            tracing::warn!(
                milliamps,
                max = self.limits.max_current,
                "rejected target current outside safe range"
            );
            return Err(ChargerError::InvalidParameter(
                "target current outside safe range",
            ));
        }
        self.update(|t| t.target.target_current = milliamps);
        tracing::info!(milliamps, "target current set");
        Ok(())
    }

    /// Partial update of the step/tolerance/cadence knobs. Every provided
    /// value is validated before any of them is applied.
    pub fn set_control_parameters(
        &self,
        duty_step: Option<u16>,
        voltage_tolerance: Option<f32>,
        current_tolerance: Option<f32>,
        actuation_interval: Option<Duration>,
    ) -> Result<(), ChargerError> {
        if let Some(step) = duty_step
            && step == 0
        {
            tracing::warn!("rejected zero duty step");
            return Err(ChargerError::InvalidParameter("duty step must be >= 1"));
        }
        if let Some(tol) = voltage_tolerance
            && !(tol.is_finite() && tol >= 0.0)
        {
            tracing::warn!(tol, "rejected voltage tolerance");
            return Err(ChargerError::InvalidParameter(
                "voltage tolerance must be >= 0",
            ));
        }
        if let Some(tol) = current_tolerance
            && !(tol.is_finite() && tol >= 0.0)
        {
            tracing::warn!(tol, "rejected current tolerance");
            return Err(ChargerError::InvalidParameter(
                "current tolerance must be >= 0",
            ));
        }
        if let Some(iv) = actuation_interval
            && iv.is_zero()
        {
            tracing::warn!("rejected zero actuation interval");
            return Err(ChargerError::InvalidParameter(
                "actuation interval must be > 0",
            ));
        }
        self.update(|t| {
            if let Some(step) = duty_step {
                t.duty_step = step;
            }
            if let Some(tol) = voltage_tolerance {
                t.target.voltage_tolerance = tol;
            }
            if let Some(tol) = current_tolerance {
                t.target.current_tolerance = tol;
            }
            if let Some(iv) = actuation_interval {
                t.actuation_interval = iv;
            }
        });
        tracing::info!(
            ?duty_step,
            ?voltage_tolerance,
            ?current_tolerance,
            ?actuation_interval,
            "control parameters updated"
        );
        Ok(())
    }
}

impl core::fmt::Debug for TargetHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TargetHandle")
            .field("tuning", &self.snapshot())
            .finish()
    }
}
