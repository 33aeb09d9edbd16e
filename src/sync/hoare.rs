/*!
 * Hoare Monitor
 *
 * Monitor with signal-and-urgent-wait conditions, built from unmonitored
 * semaphores:
 * - `entry` (initially 1) guards the monitor
 * - `urgent` (initially 0) parks signalers until the signaled thread leaves
 *   or waits
 *
 * A thread leaving the monitor hands it to a parked signaler first, so
 * signalers resume before threads queued at the entry.
 */

use super::semaphore::Semaphore;
use crate::coordinator::Coordinator;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Condition of a [`HoareMonitor`]
///
/// Only meaningful when used from inside the monitor it belongs to.
#[derive(Debug)]
pub struct Condition {
    waiting: Semaphore,
    waiters: AtomicUsize,
}

impl Condition {
    pub fn new() -> Self {
        Self::with_coordinator(Coordinator::global())
    }

    pub fn with_coordinator(coordinator: Arc<Coordinator>) -> Self {
        Self {
            waiting: Semaphore::with_coordinator(0, false, coordinator),
            waiters: AtomicUsize::new(0),
        }
    }

    /// Threads suspended on this condition
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}

/// Hoare-style monitor
///
/// Entry points call [`enter`](Self::enter) first and [`leave`](Self::leave)
/// last, or wrap their body in [`with`](Self::with).
///
/// # Example
///
/// ```
/// use synchro::HoareMonitor;
///
/// let monitor = HoareMonitor::new();
/// let not_empty = monitor.condition();
///
/// let answer = monitor.with(|| {
///     monitor.signal(&not_empty);
///     42
/// });
/// assert_eq!(answer, 42);
/// ```
#[derive(Debug)]
pub struct HoareMonitor {
    entry: Semaphore,
    urgent: Semaphore,
    urgent_count: AtomicUsize,
    coordinator: Arc<Coordinator>,
}

impl HoareMonitor {
    pub fn new() -> Self {
        Self::with_coordinator(Coordinator::global())
    }

    pub fn with_coordinator(coordinator: Arc<Coordinator>) -> Self {
        Self {
            entry: Semaphore::with_coordinator(1, false, coordinator.clone()),
            urgent: Semaphore::with_coordinator(0, false, coordinator.clone()),
            urgent_count: AtomicUsize::new(0),
            coordinator,
        }
    }

    /// New condition sharing this monitor's coordinator
    pub fn condition(&self) -> Condition {
        Condition::with_coordinator(self.coordinator.clone())
    }

    /// Enter the monitor, blocking while another thread is inside
    pub fn enter(&self) {
        self.entry.acquire();
    }

    /// Leave the monitor, handing it to a parked signaler if there is one
    pub fn leave(&self) {
        self.hand_off();
    }

    /// Run `body` inside the monitor
    pub fn with<R>(&self, body: impl FnOnce() -> R) -> R {
        struct Inside<'a>(&'a HoareMonitor);

        impl Drop for Inside<'_> {
            fn drop(&mut self) {
                self.0.leave();
            }
        }

        self.enter();
        let _inside = Inside(self);
        body()
    }

    /// Suspend on `cond`, giving the monitor away until signaled
    ///
    /// On return the caller is inside the monitor again.
    pub fn wait(&self, cond: &Condition) {
        cond.waiters.fetch_add(1, Ordering::SeqCst);
        self.hand_off();
        cond.waiting.acquire();
        cond.waiters.fetch_sub(1, Ordering::SeqCst);
    }

    /// Wake one thread suspended on `cond`, if any
    ///
    /// The signaler is suspended until the woken thread leaves the monitor or
    /// waits again; it then resumes ahead of threads blocked in `enter`.
    pub fn signal(&self, cond: &Condition) {
        if cond.waiters() == 0 {
            return;
        }
        self.urgent_count.fetch_add(1, Ordering::SeqCst);
        cond.waiting.release();
        self.urgent.acquire();
        self.urgent_count.fetch_sub(1, Ordering::SeqCst);
    }

    fn hand_off(&self) {
        if self.urgent_count.load(Ordering::SeqCst) > 0 {
            trace!("monitor handed to a signaler");
            self.urgent.release();
        } else {
            self.entry.release();
        }
    }
}

impl Default for HoareMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as Log;
    use pretty_assertions::assert_eq;
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_signal_without_waiter_returns() {
        let monitor = HoareMonitor::with_coordinator(Arc::new(Coordinator::new()));
        let cond = monitor.condition();
        monitor.enter();
        monitor.signal(&cond);
        monitor.leave();
        // Monitor is free again
        monitor.enter();
        monitor.leave();
    }

    #[test]
    fn test_signaled_thread_runs_before_signaler_resumes() {
        let coordinator = Arc::new(Coordinator::new());
        let monitor = Arc::new(HoareMonitor::with_coordinator(coordinator.clone()));
        let cond = Arc::new(monitor.condition());
        let log = Arc::new(Log::new(Vec::new()));

        let waiter = {
            let (monitor, cond, log) = (monitor.clone(), cond.clone(), log.clone());
            thread::spawn(move || {
                monitor.enter();
                monitor.wait(&cond);
                log.lock().push("waiter resumed");
                monitor.leave();
            })
        };
        wait_until(|| cond.waiters() == 1);

        monitor.enter();
        log.lock().push("signal");
        monitor.signal(&cond);
        log.lock().push("signaler resumed");
        monitor.leave();

        waiter.join().unwrap();
        assert_eq!(
            *log.lock(),
            vec!["signal", "waiter resumed", "signaler resumed"]
        );
        assert_eq!(coordinator.blocked_threads(), 0);
    }

    #[test]
    fn test_with_leaves_on_panic() {
        let monitor = Arc::new(HoareMonitor::with_coordinator(Arc::new(Coordinator::new())));
        let remote = monitor.clone();
        let result = thread::spawn(move || remote.with(|| panic!("inside monitor"))).join();
        assert!(result.is_err());

        assert_eq!(monitor.with(|| 7), 7);
    }
}
