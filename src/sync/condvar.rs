/*!
 * Condition Variable
 *
 * Mesa-style condition variable bound to [`Mutex`] at wait time.
 *
 * Enqueueing the waiter, counting it as blocked and releasing the mutex happen
 * under the condition variable's own lock, so a notify issued after the waiter
 * gave up the mutex always finds it in the queue. Notifiers decrement the
 * blocked count for the waiters they wake.
 */

use super::mutex::{current_key, Mutex};
use super::wakeup::{WakeResult, WakeupQueue};
use crate::coordinator::{Coordinator, EventType};
use parking_lot::Mutex as RawMutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Condition variable with optional coordinator monitoring
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
/// use synchro::{ConditionVariable, Mutex};
///
/// let pair = Arc::new((Mutex::default(), ConditionVariable::new()));
/// let remote = pair.clone();
///
/// let (mutex, cond) = &*pair;
/// mutex.lock();
/// let waker = thread::spawn(move || {
///     let (mutex, cond) = &*remote;
///     mutex.lock();
///     cond.notify_one();
///     mutex.unlock();
/// });
/// cond.wait(mutex);
/// mutex.unlock();
/// waker.join().unwrap();
/// ```
pub struct ConditionVariable {
    queue: RawMutex<WakeupQueue>,
    monitored: bool,
    coordinator: Arc<Coordinator>,
}

impl ConditionVariable {
    /// Monitored condition variable on the global coordinator
    pub fn new() -> Self {
        Self::with_coordinator(true, Coordinator::global())
    }

    pub fn unmonitored() -> Self {
        Self::with_coordinator(false, Coordinator::global())
    }

    pub fn with_coordinator(monitored: bool, coordinator: Arc<Coordinator>) -> Self {
        Self {
            queue: RawMutex::new(WakeupQueue::new()),
            monitored,
            coordinator,
        }
    }

    /// Release `mutex`, block until notified, then lock it again
    ///
    /// The caller must hold `mutex`. Waiting without holding it is a protocol
    /// violation: it is recorded and the call returns without blocking.
    pub fn wait(&self, mutex: &Mutex) {
        self.wait_inner(mutex, None);
    }

    /// Like [`wait`](Self::wait), giving up after `seconds`
    ///
    /// Returns `true` if notified, `false` on timeout. The mutex is held again
    /// in both cases.
    pub fn wait_for_seconds(&self, mutex: &Mutex, seconds: u64) -> bool {
        self.wait_timeout(mutex, Duration::from_secs(seconds))
    }

    pub fn wait_timeout(&self, mutex: &Mutex, timeout: Duration) -> bool {
        self.wait_inner(mutex, Some(timeout))
    }

    fn wait_inner(&self, mutex: &Mutex, timeout: Option<Duration>) -> bool {
        self.coordinator.random_delay(EventType::ConditionWait);
        let me = current_key();

        let (waiter, blocked, holds) = {
            let mut queue = self.queue.lock();
            let holds = match mutex.release_all(me) {
                Ok(holds) => holds,
                Err(_) => {
                    drop(queue);
                    self.coordinator
                        .record_violation("condition wait without holding the mutex");
                    return false;
                }
            };
            let waiter = queue.enqueue();
            let blocked = self.monitored.then(|| self.coordinator.enter_blocked());
            (waiter, blocked, holds)
        };

        if let Some(blocked) = blocked {
            self.coordinator.notify_watchdog(blocked);
        }
        debug!(ticket = waiter.ticket(), holds, "waiting on condition");

        let signaled = match timeout {
            Some(timeout) => waiter.wait_timeout(timeout),
            None => waiter.wait(),
        };

        let notified = signaled || {
            let mut queue = self.queue.lock();
            if queue.cancel(waiter.ticket()) {
                if self.monitored {
                    self.coordinator.leave_blocked(1);
                }
                debug!(ticket = waiter.ticket(), "condition wait timed out");
                false
            } else {
                // Notified between the timeout and the cancel
                true
            }
        };

        self.coordinator.random_delay(EventType::ConditionWait);
        mutex.reacquire(me, holds);
        self.coordinator.random_delay(EventType::ConditionWait);
        notified
    }

    /// Wake one waiter, if any
    pub fn notify_one(&self) -> WakeResult {
        self.coordinator.random_delay(EventType::ConditionNotifyOne);
        let woken = {
            let mut queue = self.queue.lock();
            let woken = queue.wake_front();
            if self.monitored {
                self.coordinator.leave_blocked(woken.count());
            }
            woken
        };
        self.coordinator.random_delay(EventType::ConditionNotifyOne);
        woken
    }

    /// Wake every thread waiting at the time of the call
    pub fn notify_all(&self) -> WakeResult {
        self.coordinator.random_delay(EventType::ConditionNotifyAll);
        let woken = {
            let mut queue = self.queue.lock();
            let woken = queue.wake_all();
            if self.monitored {
                self.coordinator.leave_blocked(woken.count());
            }
            woken
        };
        if woken.is_woken() {
            debug!(count = woken.count(), "notified all waiters");
        }
        self.coordinator.random_delay(EventType::ConditionNotifyAll);
        woken
    }

    /// Number of threads currently waiting
    pub fn waiters(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_monitored(&self) -> bool {
        self.monitored
    }
}

impl Default for ConditionVariable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConditionVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionVariable")
            .field("waiters", &self.waiters())
            .field("monitored", &self.monitored)
            .finish()
    }
}
