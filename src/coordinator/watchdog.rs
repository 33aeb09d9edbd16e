/*!
 * Watchdogs
 *
 * Observers notified whenever a thread blocks on a monitored primitive.
 */

use super::manager::Coordinator;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::warn;

/// Observer of blocking events
///
/// `trigger` receives the number of threads currently blocked on any
/// monitored semaphore or condition variable of the coordinator it is
/// installed on. It runs on the thread that is about to block, with no
/// coordinator or primitive lock held, so it may call back into the
/// coordinator (including [`Coordinator::set_free_mode`]).
#[cfg_attr(test, mockall::automock)]
pub trait Watchdog: Send + Sync {
    fn trigger(&self, blocked: usize);
}

impl<F> Watchdog for F
where
    F: Fn(usize) + Send + Sync,
{
    fn trigger(&self, blocked: usize) {
        self(blocked)
    }
}

/// Watchdog keeping every reported count
#[derive(Debug, Default)]
pub struct RecordingWatchdog {
    history: Mutex<Vec<usize>>,
}

impl RecordingWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts reported so far, in trigger order
    pub fn history(&self) -> Vec<usize> {
        self.history.lock().clone()
    }

    /// Number of triggers
    pub fn triggers(&self) -> usize {
        self.history.lock().len()
    }

    /// Highest count reported
    pub fn peak(&self) -> usize {
        self.history.lock().iter().copied().max().unwrap_or(0)
    }
}

impl Watchdog for RecordingWatchdog {
    fn trigger(&self, blocked: usize) {
        self.history.lock().push(blocked);
    }
}

/// Deadlock breaker
///
/// Once `threshold` threads are blocked at the same time the watchdog
/// switches its coordinator to free mode, draining every monitored semaphore.
/// It fires at most once until [`rearm`](Self::rearm) is called.
pub struct StallWatchdog {
    coordinator: Weak<Coordinator>,
    threshold: usize,
    fired: AtomicBool,
    peak: AtomicUsize,
}

impl StallWatchdog {
    pub fn new(coordinator: &Arc<Coordinator>, threshold: usize) -> Self {
        Self {
            coordinator: Arc::downgrade(coordinator),
            threshold: threshold.max(1),
            fired: AtomicBool::new(false),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Whether the stall was detected
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Highest blocked count observed
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Allow the watchdog to fire again
    pub fn rearm(&self) {
        self.fired.store(false, Ordering::Release);
    }
}

impl Watchdog for StallWatchdog {
    fn trigger(&self, blocked: usize) {
        self.peak.fetch_max(blocked, Ordering::Relaxed);
        if blocked < self.threshold {
            return;
        }
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        warn!(
            blocked,
            threshold = self.threshold,
            "stall detected, switching to free mode"
        );
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.set_free_mode();
        }
    }
}
