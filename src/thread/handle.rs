/*!
 * Managed Threads
 *
 * OS threads registered with a coordinator for the duration of their body,
 * with a cooperative stop flag and self lookup.
 */

use super::registration::{is_managed, Registration};
use crate::coordinator::{Coordinator, EventType};
use crate::core::limits::DEFAULT_THREAD_NAME;
use crate::core::{SyncError, SyncResult, ThreadKey};
use crate::monitoring::span_operation;
use parking_lot::Mutex;
use std::any::Any;
use std::convert::Infallible;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

static NEXT_THREAD_NUMBER: AtomicUsize = AtomicUsize::new(1);

/// Unwind payload used by [`ThreadHandle::exit_current`]
struct ThreadExit;

/// State shared between a handle, its thread and the registry
#[derive(Debug)]
pub(crate) struct ThreadShared {
    name: String,
    stop: Mutex<bool>,
    finished: AtomicBool,
}

impl ThreadShared {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            stop: Mutex::new(false),
            finished: AtomicBool::new(false),
        }
    }

    fn request_stop(&self) {
        *self.stop.lock() = true;
    }

    fn stop_requested(&self) -> bool {
        *self.stop.lock()
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }
}

/// Cheap reference to a running managed thread
///
/// Returned by self lookup; lets a thread body observe its own stop flag.
#[derive(Debug, Clone)]
pub struct ThreadRef {
    key: ThreadKey,
    shared: Arc<ThreadShared>,
}

impl ThreadRef {
    pub(crate) fn new(key: ThreadKey, shared: Arc<ThreadShared>) -> Self {
        Self { key, shared }
    }

    pub fn id(&self) -> ThreadKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn request_stop(&self) {
        self.shared.request_stop();
    }

    pub fn stop_requested(&self) -> bool {
        self.shared.stop_requested()
    }
}

/// Builder for managed threads
#[derive(Default)]
pub struct ThreadBuilder {
    name: Option<String>,
    coordinator: Option<Arc<Coordinator>>,
}

impl ThreadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Register with `coordinator` instead of the global one
    pub fn coordinator(mut self, coordinator: Arc<Coordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Start the thread
    ///
    /// The thread registers itself before running `body` and unregisters
    /// when `body` returns, panics or calls [`ThreadHandle::exit_current`].
    pub fn spawn<F>(self, body: F) -> SyncResult<ThreadHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = self.name.unwrap_or_else(|| {
            let number = NEXT_THREAD_NUMBER.fetch_add(1, Ordering::Relaxed);
            format!("{}-{}", DEFAULT_THREAD_NAME, number)
        });
        let coordinator = self.coordinator.unwrap_or_else(Coordinator::global);
        let shared = Arc::new(ThreadShared::new(name.clone()));

        let thread_coordinator = coordinator.clone();
        let thread_shared = shared.clone();
        let inner = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_managed(thread_coordinator, thread_shared, body))
            .map_err(|e| SyncError::SpawnFailed(e.to_string()))?;

        debug!(thread = %name, "managed thread spawned");
        Ok(ThreadHandle {
            inner,
            shared,
            coordinator,
        })
    }
}

fn run_managed<F>(coordinator: Arc<Coordinator>, shared: Arc<ThreadShared>, body: F) -> Result<(), String>
where
    F: FnOnce(),
{
    let _registration = Registration::new(coordinator.clone(), shared);
    coordinator.random_delay(EventType::ThreadCreation);

    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(()) => Ok(()),
        Err(payload) if payload.is::<ThreadExit>() => {
            debug!("managed thread exited early");
            Ok(())
        }
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Owning handle to a managed thread
///
/// # Example
///
/// ```
/// use synchro::ThreadHandle;
///
/// let handle = ThreadHandle::spawn(|| {
///     let me = ThreadHandle::current().expect("managed thread");
///     assert!(!me.stop_requested());
/// })
/// .unwrap();
/// handle.join().unwrap();
/// ```
pub struct ThreadHandle {
    inner: JoinHandle<Result<(), String>>,
    shared: Arc<ThreadShared>,
    coordinator: Arc<Coordinator>,
}

impl ThreadHandle {
    /// Start a managed thread on the global coordinator
    pub fn spawn<F>(body: F) -> SyncResult<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        ThreadBuilder::new().spawn(body)
    }

    pub fn spawn_named<F>(name: impl Into<String>, body: F) -> SyncResult<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        ThreadBuilder::new().name(name).spawn(body)
    }

    pub fn builder() -> ThreadBuilder {
        ThreadBuilder::new()
    }

    /// Wait for the thread to finish
    ///
    /// A body that panicked is reported as [`SyncError::ThreadPanicked`].
    pub fn join(self) -> SyncResult<()> {
        self.coordinator.random_delay(EventType::ThreadJoin);
        let span = span_operation("thread_join");
        let name = self.shared.name.clone();

        let result = match self.inner.join() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => {
                warn!(thread = %name, panic = %message, "managed thread panicked");
                Err(SyncError::ThreadPanicked(name))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(thread = %name, panic = %message, "managed thread aborted");
                Err(SyncError::ThreadPanicked(name))
            }
        };
        span.record_result(result.is_ok());
        drop(span);

        self.coordinator.random_delay(EventType::ThreadJoin);
        result
    }

    /// Ask the thread to stop; it decides when to honor the request
    pub fn request_stop(&self) {
        self.shared.request_stop();
    }

    pub fn stop_requested(&self) -> bool {
        self.shared.stop_requested()
    }

    pub fn id(&self) -> ThreadKey {
        self.inner.thread().id()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Whether the body has returned (or unwound)
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    /// Reference usable from other threads
    pub fn thread_ref(&self) -> ThreadRef {
        ThreadRef::new(self.id(), self.shared.clone())
    }

    /// The calling thread, if it was spawned on the global coordinator
    pub fn current() -> Option<ThreadRef> {
        Coordinator::global().current_thread()
    }

    /// The calling thread, if it was spawned on `coordinator`
    pub fn current_in(coordinator: &Coordinator) -> Option<ThreadRef> {
        coordinator.current_thread()
    }

    /// Terminate the calling managed thread
    ///
    /// Unwinds to the thread entry, dropping the body's locals and its
    /// registration; `join` then reports success. Returns
    /// [`SyncError::NotManaged`] when called from any other thread. A body
    /// that wraps its code in `catch_unwind` intercepts the exit.
    pub fn exit_current() -> SyncResult<Infallible> {
        if !is_managed() {
            return Err(SyncError::NotManaged);
        }
        panic::resume_unwind(Box::new(ThreadExit))
    }
}

impl std::fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("name", &self.shared.name)
            .field("id", &self.id())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Sleep the calling thread for `micros` microseconds
pub fn sleep_micros(micros: u64) {
    std::thread::sleep(Duration::from_micros(micros));
}
