/*!
 * Threads
 *
 * Managed threads: registered with a coordinator while their body runs so
 * that any code can look up the calling thread and its stop flag.
 */

mod handle;
mod registration;

pub use handle::{sleep_micros, ThreadBuilder, ThreadHandle, ThreadRef};

pub(crate) use handle::ThreadShared;
