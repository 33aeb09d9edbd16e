/*!
 * Limits and Constants
 *
 * Centralized location for defaults, thresholds and environment variable names.
 * Organized by domain for maintainability and discoverability.
 *
 * - Performance-relevant constants are marked with [PERF]
 * - Testing aids are marked with [TESTING]
 */

use std::time::Duration;

// =============================================================================
// FAULT INJECTION
// =============================================================================

/// Default upper bound for the `Standard` delay (microseconds)
/// [TESTING] Zero disables fault injection until explicitly configured
pub const DEFAULT_MAX_DELAY_US: u64 = 0;

/// Largest accepted delay bound (10 seconds)
/// Guards against configuration typos stalling a test suite
pub const MAX_DELAY_BOUND_US: u64 = 10_000_000;

/// Environment variable holding the `Standard` delay bound
pub const ENV_MAX_DELAY: &str = "SYNCHRO_MAX_DELAY_US";

/// Prefix of per-event delay variables, e.g. `SYNCHRO_DELAY_MUTEX_LOCK_US`
pub const ENV_DELAY_PREFIX: &str = "SYNCHRO_DELAY_";

/// Suffix of per-event delay variables
pub const ENV_DELAY_SUFFIX: &str = "_US";

/// Environment variable pointing at a JSON delay configuration file
pub const ENV_CONFIG_FILE: &str = "SYNCHRO_CONFIG";

// =============================================================================
// WAIT QUEUES
// =============================================================================

/// Initial capacity of per-primitive wakeup queues
/// [PERF] Covers typical lab scenarios without reallocating
pub const WAKEUP_QUEUE_CAPACITY: usize = 8;

// =============================================================================
// THREADS
// =============================================================================

/// Name given to managed threads spawned without an explicit name
pub const DEFAULT_THREAD_NAME: &str = "synchro-worker";

// =============================================================================
// TRACING
// =============================================================================

/// Environment variable enabling JSON log output
pub const ENV_TRACE_JSON: &str = "SYNCHRO_TRACE_JSON";

/// Operations slower than this are reported at warn level
pub const SLOW_OPERATION_THRESHOLD: Duration = Duration::from_millis(100);
