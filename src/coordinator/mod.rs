/*!
 * Coordinator Subsystem
 *
 * Registry, fault injector and deadlock watchdog shared by the primitives.
 *
 * # Architecture
 *
 * - `Coordinator`: one per process via [`Coordinator::global`], or explicitly
 *   constructed and injected for isolation
 * - `DelayConfig`: per-event fault-injection bounds
 * - `Watchdog`: observer invoked whenever a thread blocks on a monitored
 *   primitive
 *
 * # Modes
 *
 * `Normal -> Free` via `set_free_mode` (drains monitored semaphores),
 * `Free -> Normal` via `set_normal_mode` (no side effect).
 */

mod config;
mod manager;
mod traits;
mod types;
mod watchdog;

pub use config::DelayConfig;
pub use manager::Coordinator;
pub use traits::FreeModeTarget;
pub use types::{CoordinatorStats, EventType, Mode};
pub use watchdog::{RecordingWatchdog, StallWatchdog, Watchdog};
