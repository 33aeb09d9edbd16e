/*!
 * Core
 * Errors, limits and shared type aliases
 */

pub mod errors;
pub mod limits;
pub mod types;

pub use errors::{SyncError, SyncResult};
pub use types::{Micros, SemaphoreId, ThreadKey};
