/*!
 * FIFO Semaphore
 *
 * Strong counting semaphore: blocked acquirers are released in the exact
 * order they blocked.
 *
 * # Design
 *
 * `value` may go negative; `-value` is then the number of queued waiters.
 * Each waiter parks on its own one-shot token, so `release()` wakes the head
 * of the queue specifically instead of broadcasting. Tokens are enqueued and
 * signaled under the semaphore lock; blocking happens after it is released.
 */

use super::wakeup::{WakeResult, WakeupQueue};
use crate::coordinator::{Coordinator, EventType, FreeModeTarget, Mode};
use crate::core::SemaphoreId;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

struct SemaphoreState {
    value: i64,
    queue: WakeupQueue,
}

/// Shared part of a semaphore; the coordinator keeps a weak reference to it
struct SemaphoreCore {
    state: Mutex<SemaphoreState>,
    monitored: bool,
    coordinator: Arc<Coordinator>,
    registration: Option<SemaphoreId>,
}

impl SemaphoreCore {
    fn acquire(&self) {
        self.coordinator.random_delay(EventType::SemaphoreAcquire);

        let pending = {
            let mut state = self.state.lock();
            if self.monitored && self.coordinator.mode() == Mode::Free {
                trace!("free mode, acquire does not block");
                return;
            }
            state.value -= 1;
            if state.value < 0 {
                let waiter = state.queue.enqueue();
                let blocked = self.monitored.then(|| self.coordinator.enter_blocked());
                Some((waiter, blocked))
            } else {
                None
            }
        };

        if let Some((waiter, blocked)) = pending {
            if let Some(blocked) = blocked {
                self.coordinator.notify_watchdog(blocked);
            }
            debug!(ticket = waiter.ticket(), "blocking on semaphore");
            if !waiter.wait() {
                debug!(ticket = waiter.ticket(), "semaphore torn down while waiting");
            }
        }

        self.coordinator.random_delay(EventType::SemaphoreAcquire);
    }

    fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if self.monitored && self.coordinator.mode() == Mode::Free {
            return true;
        }
        if state.value > 0 {
            state.value -= 1;
            true
        } else {
            false
        }
    }

    fn release(&self) {
        self.coordinator.random_delay(EventType::SemaphoreRelease);
        {
            let mut state = self.state.lock();
            self.release_locked(&mut state);
        }
        self.coordinator.random_delay(EventType::SemaphoreRelease);
    }

    fn release_locked(&self, state: &mut SemaphoreState) -> WakeResult {
        state.value += 1;
        if state.value > 0 {
            return WakeResult::NoWaiters;
        }
        let woken = state.queue.wake_front();
        if woken.is_woken() && self.monitored {
            self.coordinator.leave_blocked(1);
        }
        woken
    }
}

impl FreeModeTarget for SemaphoreCore {
    fn open(&self) -> usize {
        let mut state = self.state.lock();
        let mut releases = 0;
        while state.value <= 0 {
            self.release_locked(&mut state);
            releases += 1;
        }
        if releases > 0 {
            debug!(releases, value = state.value, "semaphore opened by free mode");
        }
        releases
    }
}

impl Drop for SemaphoreCore {
    fn drop(&mut self) {
        if let Some(id) = self.registration {
            self.coordinator.unregister_semaphore(id);
        }
        let state = self.state.get_mut();
        if state.value < 0 || !state.queue.is_empty() {
            self.coordinator
                .record_violation("semaphore dropped while threads are waiting on it");
            let woken = state.queue.wake_all();
            if self.monitored {
                self.coordinator.leave_blocked(woken.count());
            }
        }
    }
}

/// Counting semaphore with a FIFO waiting queue
///
/// Monitored semaphores (the default) report blocked threads to the
/// coordinator, trigger its watchdog, and stop blocking in free mode.
///
/// # Example
///
/// ```
/// use synchro::Semaphore;
///
/// let sem = Semaphore::new(1);
/// sem.acquire();
/// assert!(!sem.try_acquire());
/// sem.release();
/// assert_eq!(sem.value(), 1);
/// ```
pub struct Semaphore {
    core: Arc<SemaphoreCore>,
}

impl Semaphore {
    /// Monitored semaphore on the global coordinator
    pub fn new(initial: u32) -> Self {
        Self::with_coordinator(initial, true, Coordinator::global())
    }

    /// Semaphore invisible to the coordinator's counters and free mode
    pub fn unmonitored(initial: u32) -> Self {
        Self::with_coordinator(initial, false, Coordinator::global())
    }

    pub fn with_coordinator(initial: u32, monitored: bool, coordinator: Arc<Coordinator>) -> Self {
        let core = Arc::new_cyclic(|weak: &Weak<SemaphoreCore>| {
            let registration = monitored.then(|| {
                let target: Weak<dyn FreeModeTarget> = weak.clone();
                coordinator.register_semaphore(target)
            });
            SemaphoreCore {
                state: Mutex::new(SemaphoreState {
                    value: i64::from(initial),
                    queue: WakeupQueue::new(),
                }),
                monitored,
                coordinator,
                registration,
            }
        });
        Self { core }
    }

    /// Decrement, blocking in FIFO order while the value is negative
    pub fn acquire(&self) {
        self.core.acquire();
    }

    /// Decrement only if that does not block
    pub fn try_acquire(&self) -> bool {
        self.core.try_acquire()
    }

    /// Increment, waking the longest-waiting acquirer if any
    pub fn release(&self) {
        self.core.release();
    }

    /// Current value; negative when threads are waiting
    pub fn value(&self) -> i64 {
        self.core.state.lock().value
    }

    /// Number of threads blocked in `acquire`
    pub fn waiting(&self) -> usize {
        self.core.state.lock().queue.len()
    }

    pub fn is_monitored(&self) -> bool {
        self.core.monitored
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.core.state.lock();
        f.debug_struct("Semaphore")
            .field("value", &state.value)
            .field("waiting", &state.queue.len())
            .field("monitored", &self.core.monitored)
            .finish()
    }
}
