/*!
 * Coordinator Types
 * Event kinds, execution modes and statistics snapshots
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of operation a fault-injection delay is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Start of a managed thread, before its body runs
    ThreadCreation,
    /// Around `ThreadHandle::join`
    ThreadJoin,
    /// Around `Mutex::lock`
    MutexLock,
    /// Around `Mutex::unlock`
    MutexUnlock,
    /// Around `ConditionVariable::wait` and its timed variants
    ConditionWait,
    /// Around `ConditionVariable::notify_one`
    ConditionNotifyOne,
    /// Around `ConditionVariable::notify_all`
    ConditionNotifyAll,
    /// Around `Semaphore::acquire`
    SemaphoreAcquire,
    /// Around `Semaphore::release`
    SemaphoreRelease,
    /// Fallback bound for events without their own
    Standard,
}

impl EventType {
    /// Every event kind, `Standard` last
    pub const ALL: [EventType; 10] = [
        EventType::ThreadCreation,
        EventType::ThreadJoin,
        EventType::MutexLock,
        EventType::MutexUnlock,
        EventType::ConditionWait,
        EventType::ConditionNotifyOne,
        EventType::ConditionNotifyAll,
        EventType::SemaphoreAcquire,
        EventType::SemaphoreRelease,
        EventType::Standard,
    ];

    /// Stable snake_case name, shared by serde and environment lookups
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventType::ThreadCreation => "thread_creation",
            EventType::ThreadJoin => "thread_join",
            EventType::MutexLock => "mutex_lock",
            EventType::MutexUnlock => "mutex_unlock",
            EventType::ConditionWait => "condition_wait",
            EventType::ConditionNotifyOne => "condition_notify_one",
            EventType::ConditionNotifyAll => "condition_notify_all",
            EventType::SemaphoreAcquire => "semaphore_acquire",
            EventType::SemaphoreRelease => "semaphore_release",
            EventType::Standard => "standard",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        EventType::ALL
            .iter()
            .copied()
            .find(|event| event.as_str() == normalized)
            .ok_or_else(|| format!("unknown event type '{}'", s))
    }
}

/// Execution mode for monitored semaphores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Semaphores block as usual
    #[default]
    Normal,
    /// Monitored semaphores never block on acquire
    Free,
}

/// Point-in-time view of the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    pub mode: Mode,
    pub blocked_threads: usize,
    pub live_threads: usize,
    pub monitored_semaphores: usize,
    pub protocol_violations: u64,
    pub watchdog_installed: bool,
}
