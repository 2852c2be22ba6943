//! Fan-out/fan-in over independent controllers.
//!
//! The coordinator multiplexes N schedulers cooperatively on the calling
//! thread: each cycle it polls every controller whose actuation deadline
//! has arrived, then sleeps to the earliest remaining deadline. It holds no
//! control logic of its own. Per-controller faults are converted into
//! reports so one controller can never starve or crash its siblings.

use std::sync::Arc;
use std::time::{Duration, Instant};

use charger_traits::{Clock, MonotonicClock, PowerSensor, PwmOutput};

use crate::engine::Mode;
use crate::error::Report;
use crate::scheduler::{CancelToken, CycleStatus, HybridScheduler, RunOutcome};
use crate::util;

/// Boxed scheduler type used for heterogeneous controller sets.
pub type BoxedScheduler = HybridScheduler<Box<dyn PowerSensor>, Box<dyn PwmOutput>>;

/// Terminal state of one coordinated controller.
#[derive(Debug)]
pub enum ControllerReport {
    Finished(RunOutcome),
    Failed(Report),
}

struct Entry {
    name: String,
    scheduler: BoxedScheduler,
    mode: Mode,
    next_due_ms: u64,
}

pub struct Coordinator {
    entries: Vec<Entry>,
    stop: CancelToken,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    status_interval: Duration,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let epoch = clock.now();
        Self {
            entries: Vec::new(),
            stop: CancelToken::new(),
            clock,
            epoch,
            status_interval: Duration::from_secs(1),
        }
    }

    /// Global stop signal: cancelling it requests cancellation of every
    /// registered controller; `run_all` returns once all reached stopped.
    pub fn stop_token(&self) -> CancelToken {
        self.stop.clone()
    }

    /// Cadence of the aggregate status log.
    pub fn set_status_interval(&mut self, interval: Duration) {
        self.status_interval = interval;
    }

    pub fn add(&mut self, name: impl Into<String>, scheduler: BoxedScheduler, mode: Mode) {
        self.entries.push(Entry {
            name: name.into(),
            scheduler,
            mode,
            next_due_ms: 0,
        });
    }

    pub fn controller_count(&self) -> usize {
        self.entries.len()
    }

    /// Run every registered controller to completion, cooperatively
    /// multiplexed on the calling thread. Returns one report per
    /// controller; errors never unwind past this loop.
    pub fn run_all(&mut self) -> Vec<(String, ControllerReport)> {
        let mut reports = Vec::with_capacity(self.entries.len());
        let mut active: Vec<Entry> = Vec::new();

        for mut e in self.entries.drain(..) {
            match e.scheduler.begin(e.mode) {
                Ok(()) => {
                    e.next_due_ms = self.clock.ms_since(self.epoch);
                    active.push(e);
                }
                Err(err) => {
                    tracing::error!(controller = %e.name, error = %err, "failed to start controller");
                    reports.push((e.name, ControllerReport::Failed(err)));
                }
            }
        }
        tracing::info!(controllers = active.len(), "coordinator running");

        let mut stop_forwarded = false;
        let mut next_status_ms = util::interval_ms(self.status_interval);
        while !active.is_empty() {
            let now = self.clock.ms_since(self.epoch);
            if self.stop.is_cancelled() && !stop_forwarded {
                tracing::info!("global stop requested; cancelling all controllers");
                for e in &active {
                    e.scheduler.cancel_token().cancel();
                }
                stop_forwarded = true;
            }

            let mut i = 0;
            while i < active.len() {
                if now < active[i].next_due_ms {
                    i += 1;
                    continue;
                }
                let entry = &mut active[i];
                match entry.scheduler.poll_cycle() {
                    Ok(CycleStatus::Continue) => {
                        entry.next_due_ms =
                            now + util::interval_ms(entry.scheduler.actuation_interval());
                        i += 1;
                    }
                    Ok(CycleStatus::Finished(outcome)) => {
                        tracing::info!(controller = %entry.name, ?outcome, "controller stopped");
                        let e = active.swap_remove(i);
                        reports.push((e.name, ControllerReport::Finished(outcome)));
                    }
                    Err(err) => {
                        // The fault stays contained to this controller; its
                        // scheduler already ran the shutdown path.
                        tracing::error!(controller = %entry.name, error = %err, "controller failed");
                        let e = active.swap_remove(i);
                        reports.push((e.name, ControllerReport::Failed(err)));
                    }
                }
            }

            if now >= next_status_ms {
                for e in &active {
                    tracing::info!(controller = %e.name, "{}", e.scheduler.status());
                }
                next_status_ms = now + util::interval_ms(self.status_interval);
            }

            if let Some(min_due) = active.iter().map(|e| e.next_due_ms).min() {
                let wait = min_due.saturating_sub(self.clock.ms_since(self.epoch));
                if wait > 0 {
                    self.clock.sleep(Duration::from_millis(wait));
                }
            }
        }
        tracing::info!("all controllers stopped");
        reports
    }
}
