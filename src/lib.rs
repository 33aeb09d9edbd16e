/*!
 * Synchro Library
 * Monitored synchronization primitives for concurrency teaching and testing
 *
 * Mutexes, FIFO semaphores, condition variables and managed threads whose
 * operations share one coordinator: it injects random delays to widen race
 * windows, counts threads blocked on monitored primitives, notifies a
 * watchdog and can switch to free mode to drain deadlocked programs.
 */

pub mod coordinator;
pub mod core;
pub mod monitoring;
pub mod sync;
pub mod thread;

// Re-exports
pub use coordinator::{
    Coordinator, CoordinatorStats, DelayConfig, EventType, Mode, RecordingWatchdog, StallWatchdog,
    Watchdog,
};
pub use self::core::{SyncError, SyncResult};
pub use monitoring::init_tracing;
pub use sync::{
    Condition, ConditionVariable, HoareMonitor, Mutex, MutexGuard, RecursionMode, Semaphore,
    WakeResult,
};
pub use thread::{sleep_micros, ThreadBuilder, ThreadHandle, ThreadRef};
