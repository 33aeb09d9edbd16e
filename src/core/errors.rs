/*!
 * Error Types
 * Centralized error handling with thiserror and miette diagnostics
 */

use miette::Diagnostic;
use thiserror::Error;

/// Result type for fallible synchronization operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by the synchronization primitives and the coordinator
///
/// Blocking never fails: timeouts are reported as `false` and registry
/// misses as `None`. These variants cover protocol violations the caller asked
/// to see explicitly, thread lifecycle failures and configuration problems.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum SyncError {
    #[error("Mutex unlocked by a thread that does not own it")]
    #[diagnostic(
        code(sync::not_owner),
        help("Only the thread holding the lock may release it. Check lock/unlock pairing.")
    )]
    NotOwner,

    #[error("Thread '{0}' panicked before completing")]
    #[diagnostic(
        code(thread::panicked),
        help("The thread body panicked. Its registration was still cleaned up.")
    )]
    ThreadPanicked(String),

    #[error("Calling thread is not a managed thread")]
    #[diagnostic(
        code(thread::not_managed),
        help("Only threads started through ThreadHandle can exit early.")
    )]
    NotManaged,

    #[error("Failed to spawn thread: {0}")]
    #[diagnostic(
        code(thread::spawn_failed),
        help("The operating system refused to create a thread. Check resource limits.")
    )]
    SpawnFailed(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(config::invalid),
        help("Delay configuration must be JSON mapping event names to microseconds.")
    )]
    Config(String),

    #[error("I/O error: {0}")]
    #[diagnostic(
        code(config::io_error),
        help("Could not read the configuration source. Check the path and permissions.")
    )]
    Io(String),
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Config(err.to_string())
    }
}
