//! Auxiliary liveness indicator.
//!
//! Runs on its own thread and shares no mutable state with the controllers
//! beyond the stop flag. Stands in for the firmware's LED blinker: a tick
//! is logged at a fixed interval so an operator can see the process is
//! alive even when the control loops are quiet.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

pub struct Heartbeat {
    stop: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub fn start(interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();
        let join_handle = std::thread::spawn(move || {
            let mut ticks: u64 = 0;
            loop {
                std::thread::sleep(interval);
                if stop_clone.load(Ordering::Relaxed) {
                    break;
                }
                ticks += 1;
                tracing::debug!(ticks, "heartbeat");
            }
            tracing::trace!("heartbeat thread exiting");
        });
        Self {
            stop,
            join_handle: Some(join_handle),
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("heartbeat thread panicked during shutdown");
        }
    }
}
