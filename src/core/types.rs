/*!
 * Core Types
 * Common types used across the crate
 */

/// Identity of a managed thread
pub type ThreadKey = std::thread::ThreadId;

/// Microseconds, used for delay bounds
pub type Micros = u64;

/// Identifier handed out to registered semaphores
pub type SemaphoreId = u64;
