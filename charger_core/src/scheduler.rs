//! Cooperative scheduler driving one regulation engine.
//!
//! The scheduler decouples the sensor cadence from the actuation cadence:
//! a fresh sample is taken only when the sensor interval has elapsed, and
//! every cycle (fresh or cached) applies one control step. The safety check
//! runs on cycles that produced a fresh sample; a cached sample was checked
//! strictly safe when it was read. All suspension happens at the single
//! end-of-cycle sleep, so a cycle is atomic with respect to cooperatively
//! interleaved controllers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use charger_traits::{Clock, MonotonicClock, PowerSensor, PwmOutput, Sample};

use crate::config::{SafetyLimits, TimingCfg};
use crate::engine::{Mode, RegulationEngine};
use crate::error::{Result, TripReason};
use crate::safety::{self, SafetyVerdict};
use crate::status::ControllerStatus;
use crate::util;

/// Cooperative stop flag shared between an operator and a scheduler.
/// Polled at the top of every cycle; the shutdown path always runs before
/// the loop ends, including when the request lands mid-sleep.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// How a regulation run ended. Fatal actuator errors surface as `Err` from
/// `run`/`poll_cycle` instead of a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Stop was requested; a normal shutdown, not a fault.
    Cancelled,
    /// The safety monitor tripped and the output was disabled.
    SafetyTrip(TripReason),
}

/// Result of one scheduler cycle, for cooperative multiplexers.
#[derive(Debug)]
pub enum CycleStatus {
    Continue,
    Finished(RunOutcome),
}

// Status-line cadence in cycles. Hybrid actuation typically runs an order
// of magnitude faster, hence the higher divisor.
const STATUS_EVERY_UNIFORM: u64 = 500;
const STATUS_EVERY_HYBRID: u64 = 2000;

pub struct HybridScheduler<S: PowerSensor, P: PwmOutput> {
    sensor: S,
    engine: RegulationEngine<P>,
    timing: TimingCfg,
    limits: SafetyLimits,
    cancel: CancelToken,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    cached: Option<Sample>,
    last_read_ms: u64,
    status_every: u64,
}

impl<S: PowerSensor, P: PwmOutput> HybridScheduler<S, P> {
    pub fn new(
        sensor: S,
        engine: RegulationEngine<P>,
        timing: TimingCfg,
        limits: SafetyLimits,
    ) -> Self {
        Self::with_clock(sensor, engine, timing, limits, Arc::new(MonotonicClock::new()))
    }

    /// Construct with a caller-provided clock (deterministic in tests).
    pub fn with_clock(
        sensor: S,
        engine: RegulationEngine<P>,
        timing: TimingCfg,
        limits: SafetyLimits,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let epoch = clock.now();
        let status_every = if timing.is_hybrid() {
            STATUS_EVERY_HYBRID
        } else {
            STATUS_EVERY_UNIFORM
        };
        Self {
            sensor,
            engine,
            timing,
            limits,
            cancel: CancelToken::new(),
            clock,
            epoch,
            cached: None,
            last_read_ms: 0,
            status_every,
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn engine(&self) -> &RegulationEngine<P> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut RegulationEngine<P> {
        &mut self.engine
    }

    pub fn status(&self) -> ControllerStatus {
        self.engine.status(self.now_ms())
    }

    /// Current actuation interval (runtime-adjustable via the target handle).
    pub fn actuation_interval(&self) -> Duration {
        self.engine.tuning().actuation_interval
    }

    fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    /// Prepare a run: start the engine, invalidate the sample cache, clear a
    /// stale stop request from a previous run.
    pub fn begin(&mut self, mode: Mode) -> Result<()> {
        let now = self.now_ms();
        self.engine.start(mode, now)?;
        self.cached = None;
        self.last_read_ms = 0;
        self.cancel.clear();
        tracing::info!(
            mode = %mode,
            hybrid = self.timing.is_hybrid(),
            sensor_ms = util::interval_ms(self.timing.sensor_read_interval),
            actuation_ms = util::interval_ms(self.timing.actuation_interval),
            "regulation loop starting"
        );
        Ok(())
    }

    /// Execute one scheduler cycle without sleeping. The caller owns the
    /// cadence: sleep `actuation_interval()` between `Continue` results.
    pub fn poll_cycle(&mut self) -> Result<CycleStatus> {
        if self.cancel.is_cancelled() {
            self.shutdown("cancelled");
            return Ok(CycleStatus::Finished(RunOutcome::Cancelled));
        }

        let now = self.now_ms();
        let sensor_interval = util::interval_ms(self.timing.sensor_read_interval);
        let sample = match self.cached {
            Some(s) if now.saturating_sub(self.last_read_ms) < sensor_interval => s,
            _ => {
                let s = self.sensor.read(self.timing.sensor_timeout);
                self.last_read_ms = now;
                self.cached = Some(s);
                if let SafetyVerdict::Unsafe(reason) = safety::check(&s, &self.limits) {
                    self.shutdown("safety trip");
                    return Ok(CycleStatus::Finished(RunOutcome::SafetyTrip(reason)));
                }
                s
            }
        };

        if let Err(e) = self.engine.apply_step(&sample) {
            // Actuation is no longer trustworthy; still try to disable the
            // output before surfacing the failure.
            self.shutdown("actuator failure");
            return Err(e);
        }

        if self.engine.cycle_count() % self.status_every == 0 {
            tracing::info!("{}", self.engine.status(now));
        }
        Ok(CycleStatus::Continue)
    }

    /// Drive the engine until the run ends, sleeping one actuation interval
    /// per cycle.
    pub fn run(&mut self, mode: Mode) -> Result<RunOutcome> {
        self.begin(mode)?;
        loop {
            match self.poll_cycle()? {
                CycleStatus::Finished(outcome) => return Ok(outcome),
                CycleStatus::Continue => self.clock.sleep(self.actuation_interval()),
            }
        }
    }

    /// Common exit path for cancellation, safety trips, and fatal errors:
    /// read one final sample for the report, disable the output
    /// best-effort, log the final status.
    fn shutdown(&mut self, cause: &str) {
        let final_sample = self.sensor.read(self.timing.sensor_timeout);
        if let Err(e) = self.engine.halt() {
            tracing::warn!(error = %e, "disable write failed during shutdown");
        }
        let status = self.engine.status(self.now_ms());
        tracing::info!(
            cause,
            voltage = final_sample.voltage,
            current_ma = final_sample.current_ma,
            power_w = final_sample.power_w(),
            duty = status.duty,
            cycles = status.cycle_count,
            runtime_s = status.runtime_seconds,
            "regulation stopped"
        );
    }
}
