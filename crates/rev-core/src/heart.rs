//! Process liveness watchdog.
//!
//! One auxiliary thread wakes every period. If nobody called [`Heart::beat`]
//! since the previous wake-up, the process is presumed wedged and is taken
//! down ungracefully — the only legitimate non-graceful exit. Otherwise the
//! beat counter is zeroed and the tick callback runs (typically: send a
//! `heartbeat` self-message so the owner's receive loop stays busy).
//!
//! The heart is born running and stops when dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::error;

/// Callback run on every healthy tick.
pub type TickAction = Box<dyn Fn() + Send + 'static>;
/// Action taken when a beat is missed. The default terminates the process.
pub type AbortAction = Box<dyn Fn() + Send + 'static>;

#[derive(Debug)]
struct Pulse {
    running: AtomicBool,
    beats: AtomicU32,
}

/// The watchdog handle. Beaten from the owner's main loop, monitored from
/// its own thread.
pub struct Heart {
    pulse: Arc<Pulse>,
    monitor: Option<JoinHandle<()>>,
}

impl Heart {
    /// Start a heart that aborts the process on a missed beat.
    pub fn new(period: Duration, tick: TickAction) -> Self {
        Self::with_abort_action(
            period,
            tick,
            Box::new(|| std::process::abort()),
        )
    }

    /// Start a heart with a custom missed-beat action. This is the seam the
    /// liveness tests use; production hearts use [`Heart::new`].
    pub fn with_abort_action(period: Duration, tick: TickAction, abort: AbortAction) -> Self {
        let pulse = Arc::new(Pulse {
            running: AtomicBool::new(true),
            // One free beat so the owner has a full period to start looping.
            beats: AtomicU32::new(1),
        });
        let monitor = {
            let pulse = Arc::clone(&pulse);
            thread::spawn(move || {
                while pulse.running.load(Ordering::SeqCst) {
                    if pulse.beats.load(Ordering::SeqCst) == 0 {
                        error!("no heartbeat within the period; terminating");
                        abort();
                        return;
                    }
                    pulse.beats.store(0, Ordering::SeqCst);
                    tick();
                    thread::sleep(period);
                }
            })
        };
        Self {
            pulse,
            monitor: Some(monitor),
        }
    }

    /// Record one beat. Called by the owner's receive loop each iteration.
    pub fn beat(&self) {
        self.pulse.beats.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for Heart {
    fn drop(&mut self) {
        self.pulse.running.store(false, Ordering::SeqCst);
        if let Some(monitor) = self.monitor.take() {
            let _ = monitor.join();
        }
    }
}
