#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core charge-regulation logic (hardware-agnostic).
//!
//! This crate drives a PWM duty cycle toward a voltage/current target from
//! periodic measurements. All hardware interactions go through
//! `charger_traits::PowerSensor` and `charger_traits::PwmOutput`.
//!
//! ## Architecture
//!
//! - **Safety**: stateless sample checks against absolute limits (`safety`)
//! - **Engine**: mode-dispatched tiered step algorithms owning the duty
//!   state (`engine`)
//! - **Scheduler**: cooperative loop decoupling sensor cadence from
//!   actuation cadence, with cancellation (`scheduler`)
//! - **Coordinator**: fan-out over independent controllers on one thread
//!   (`coordinator`)
//! - **Targets**: operator-adjustable tuning behind a shared handle
//!   (`target`)
//!
//! Raising the duty cycle lowers the delivered voltage/current on this
//! hardware topology; the disabled state is therefore `max_duty`.

// Module declarations
pub mod config;
pub mod conversions;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod mocks;
pub mod safety;
pub mod scheduler;
pub mod status;
pub mod target;
pub mod util;

use std::marker::PhantomData;
use std::sync::Arc;

use charger_traits::{Clock, MonotonicClock, PowerSensor, PwmOutput};

pub use crate::config::{ControlCfg, SafetyLimits, TimingCfg};
pub use crate::coordinator::{BoxedScheduler, Coordinator, ControllerReport};
pub use crate::engine::{CustomStep, Mode, RegulationEngine};
pub use crate::error::{BuildError, ChargerError, Result, TripReason};
pub use crate::scheduler::{CancelToken, CycleStatus, HybridScheduler, RunOutcome};
pub use crate::status::ControllerStatus;
pub use crate::target::{ControlTarget, ControlTuning, TargetHandle};

/// Public controller over boxed hardware, composed of one engine and one
/// scheduler. Build via [`ChargerController::builder`].
pub struct ChargerController {
    inner: BoxedScheduler,
}

impl core::fmt::Debug for ChargerController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChargerController")
            .field("mode", &self.inner.engine().mode())
            .field("duty", &self.inner.engine().duty())
            .finish()
    }
}

impl ChargerController {
    /// Start building a controller.
    pub fn builder() -> ChargerBuilder<Missing, Missing> {
        ChargerBuilder::default()
    }

    /// Drive regulation until cancellation, a safety trip, or a fatal
    /// actuator error.
    pub fn run(&mut self, mode: Mode) -> Result<RunOutcome> {
        self.inner.run(mode)
    }

    /// Cooperative stop flag for this controller.
    pub fn cancel_token(&self) -> CancelToken {
        self.inner.cancel_token()
    }

    /// Handle for runtime target/tuning adjustments.
    pub fn targets(&self) -> TargetHandle {
        self.inner.engine().targets()
    }

    /// On-demand status snapshot.
    pub fn status(&self) -> ControllerStatus {
        self.inner.status()
    }

    /// Manual duty override (validated against the configured range).
    pub fn set_duty_cycle(&mut self, duty: u16) -> Result<()> {
        self.inner.engine_mut().set_duty_cycle(duty)
    }

    /// Install the step closure used by `Mode::Custom`.
    pub fn set_custom_step(&mut self, step: CustomStep) {
        self.inner.engine_mut().set_custom_step(step);
    }

    /// Unwrap into the scheduler, e.g. to hand the controller to a
    /// [`Coordinator`].
    pub fn into_scheduler(self) -> BoxedScheduler {
        self.inner
    }
}

// Type-state markers for the builder
pub struct Missing;
pub struct Set;

/// Builder for `ChargerController`. The sensor and PWM output advance the
/// type-state; everything else has defaults. All fields are validated on
/// `build()`.
pub struct ChargerBuilder<S, P> {
    sensor: Option<Box<dyn PowerSensor>>,
    pwm: Option<Box<dyn PwmOutput>>,
    control: Option<ControlCfg>,
    timing: Option<TimingCfg>,
    limits: Option<SafetyLimits>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    custom_step: Option<CustomStep>,
    _s: PhantomData<S>,
    _p: PhantomData<P>,
}

impl Default for ChargerBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            sensor: None,
            pwm: None,
            control: None,
            timing: None,
            limits: None,
            clock: None,
            custom_step: None,
            _s: PhantomData,
            _p: PhantomData,
        }
    }
}

/// Chainable setters that do not affect type-state
impl<S, P> ChargerBuilder<S, P> {
    pub fn with_control(mut self, control: ControlCfg) -> Self {
        self.control = Some(control);
        self
    }

    pub fn with_timing(mut self, timing: TimingCfg) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn with_limits(mut self, limits: SafetyLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Provide a custom clock; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Step closure for `Mode::Custom`.
    pub fn with_custom_step(mut self, step: CustomStep) -> Self {
        self.custom_step = Some(step);
        self
    }

    /// Fallible build available in any type-state; returns detailed
    /// `BuildError`s for missing pieces.
    pub fn try_build(self) -> Result<ChargerController> {
        let ChargerBuilder {
            sensor,
            pwm,
            control,
            timing,
            limits,
            clock,
            custom_step,
            _s: _,
            _p: _,
        } = self;

        let sensor = sensor.ok_or_else(|| eyre::Report::new(BuildError::MissingSensor))?;
        let pwm = pwm.ok_or_else(|| eyre::Report::new(BuildError::MissingPwm))?;
        let control = control.unwrap_or_default();
        let timing = timing.unwrap_or_default();
        let limits = limits.unwrap_or_default();
        let clock = clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        if !(limits.max_voltage.is_finite() && limits.max_voltage > 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "max_voltage must be > 0",
            )));
        }
        if !(limits.max_current.is_finite() && limits.max_current > 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "max_current must be > 0",
            )));
        }
        if !(control.target_voltage.is_finite()
            && control.target_voltage > 0.0
            && control.target_voltage <= limits.max_voltage)
        {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "target voltage outside safe range",
            )));
        }
        if !(control.target_current.is_finite()
            && control.target_current > 0.0
            && control.target_current <= limits.max_current)
        {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "target current outside safe range",
            )));
        }
        if !(control.voltage_tolerance.is_finite() && control.voltage_tolerance >= 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "voltage_tolerance must be >= 0",
            )));
        }
        if !(control.current_tolerance.is_finite() && control.current_tolerance >= 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "current_tolerance must be >= 0",
            )));
        }
        if control.duty_step == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "duty_step must be >= 1",
            )));
        }
        if control.min_duty >= control.max_duty {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "min_duty must be < max_duty",
            )));
        }
        if timing.sensor_read_interval.is_zero() || timing.actuation_interval.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "timing intervals must be > 0",
            )));
        }
        if timing.sensor_timeout.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "sensor_timeout must be > 0",
            )));
        }

        let targets = TargetHandle::new(
            ControlTuning {
                target: ControlTarget {
                    target_voltage: control.target_voltage,
                    target_current: control.target_current,
                    voltage_tolerance: control.voltage_tolerance,
                    current_tolerance: control.current_tolerance,
                },
                duty_step: control.duty_step,
                actuation_interval: timing.actuation_interval,
            },
            limits,
        );
        let mut engine = RegulationEngine::new(pwm, &control, targets);
        if let Some(step) = custom_step {
            engine.set_custom_step(step);
        }
        let inner = HybridScheduler::with_clock(sensor, engine, timing, limits, clock);
        Ok(ChargerController { inner })
    }
}

// Setters that advance type-state when providing mandatory components
impl<P> ChargerBuilder<Missing, P> {
    pub fn with_sensor(self, sensor: impl PowerSensor + 'static) -> ChargerBuilder<Set, P> {
        let ChargerBuilder {
            sensor: _,
            pwm,
            control,
            timing,
            limits,
            clock,
            custom_step,
            _s: _,
            _p: _,
        } = self;
        ChargerBuilder {
            sensor: Some(Box::new(sensor)),
            pwm,
            control,
            timing,
            limits,
            clock,
            custom_step,
            _s: PhantomData,
            _p: PhantomData,
        }
    }
}

impl<S> ChargerBuilder<S, Missing> {
    pub fn with_pwm(self, pwm: impl PwmOutput + 'static) -> ChargerBuilder<S, Set> {
        let ChargerBuilder {
            sensor,
            pwm: _,
            control,
            timing,
            limits,
            clock,
            custom_step,
            _s: _,
            _p: _,
        } = self;
        ChargerBuilder {
            sensor,
            pwm: Some(Box::new(pwm)),
            control,
            timing,
            limits,
            clock,
            custom_step,
            _s: PhantomData,
            _p: PhantomData,
        }
    }
}

impl ChargerBuilder<Set, Set> {
    /// Validate and build. Only available once sensor and PWM are set.
    pub fn build(self) -> Result<ChargerController> {
        self.try_build()
    }
}
