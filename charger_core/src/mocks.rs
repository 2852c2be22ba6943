//! Test and helper doubles for charger_core.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use charger_traits::{PowerSensor, PwmOutput, Sample};

/// Sensor that replays a fixed sequence of samples, then repeats the last
/// one. An empty sequence yields the invalid sentinel.
pub struct ScriptedSensor {
    seq: Vec<Sample>,
    idx: usize,
}

impl ScriptedSensor {
    pub fn new(seq: impl Into<Vec<Sample>>) -> Self {
        Self {
            seq: seq.into(),
            idx: 0,
        }
    }
}

impl PowerSensor for ScriptedSensor {
    fn read(&mut self, _timeout: Duration) -> Sample {
        if self.idx < self.seq.len() {
            let s = self.seq[self.idx];
            self.idx += 1;
            s
        } else {
            self.seq.last().copied().unwrap_or_else(|| Sample::invalid(0))
        }
    }
}

/// Sensor returning the same sample forever, counting how often it is read.
pub struct CountingSensor {
    pub sample: Sample,
    reads: Arc<AtomicU32>,
}

impl CountingSensor {
    pub fn new(sample: Sample) -> Self {
        Self {
            sample,
            reads: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Shared read counter; clone before moving the sensor into a scheduler.
    pub fn read_counter(&self) -> Arc<AtomicU32> {
        self.reads.clone()
    }
}

impl PowerSensor for CountingSensor {
    fn read(&mut self, _timeout: Duration) -> Sample {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.sample
    }
}

fn lock_writes(writes: &Arc<Mutex<Vec<u16>>>) -> MutexGuard<'_, Vec<u16>> {
    match writes.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// PWM spy that records every accepted duty write.
#[derive(Clone, Default)]
pub struct RecordingPwm {
    writes: Arc<Mutex<Vec<u16>>>,
}

impl RecordingPwm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<u16> {
        lock_writes(&self.writes).clone()
    }

    pub fn last_write(&self) -> Option<u16> {
        lock_writes(&self.writes).last().copied()
    }

    pub fn write_count(&self) -> usize {
        lock_writes(&self.writes).len()
    }
}

impl PwmOutput for RecordingPwm {
    fn write_duty(
        &mut self,
        duty: u16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        lock_writes(&self.writes).push(duty);
        Ok(())
    }
}

/// PWM that accepts a fixed number of writes, then fails every write.
#[derive(Clone)]
pub struct FailingPwm {
    accept: Arc<AtomicU32>,
    writes: Arc<Mutex<Vec<u16>>>,
}

impl FailingPwm {
    pub fn after(accepted_writes: u32) -> Self {
        Self {
            accept: Arc::new(AtomicU32::new(accepted_writes)),
            writes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn writes(&self) -> Vec<u16> {
        lock_writes(&self.writes).clone()
    }
}

impl PwmOutput for FailingPwm {
    fn write_duty(
        &mut self,
        duty: u16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.accept.load(Ordering::Relaxed) == 0 {
            return Err(Box::new(std::io::Error::other("pwm bus write failed")));
        }
        self.accept.fetch_sub(1, Ordering::Relaxed);
        lock_writes(&self.writes).push(duty);
        Ok(())
    }
}
