/*!
 * Synchronization Primitives
 *
 * Classic teaching primitives instrumented by the [`Coordinator`]:
 * - `Mutex`: explicit lock/unlock, recursive or not
 * - `Semaphore`: counting, strictly FIFO wakeups
 * - `ConditionVariable`: Mesa semantics over `Mutex`
 * - `HoareMonitor`: signal-and-urgent-wait monitor over semaphores
 *
 * # Architecture
 *
 * Every primitive keeps its state behind a private `parking_lot` lock and
 * parks blocked threads on per-waiter tokens from a `WakeupQueue`. Blocking
 * always happens after the private lock is released.
 *
 * # Monitoring
 *
 * Monitored semaphores and condition variables report blocked threads to
 * their coordinator, which drives the watchdog and free mode. Every operation
 * brackets itself with fault-injection delays for its `EventType`.
 *
 * [`Coordinator`]: crate::coordinator::Coordinator
 */

mod condvar;
mod hoare;
mod mutex;
mod semaphore;
mod wakeup;

pub use condvar::ConditionVariable;
pub use hoare::{Condition, HoareMonitor};
pub use mutex::{Mutex, MutexGuard, RecursionMode};
pub use semaphore::Semaphore;
pub use wakeup::WakeResult;
