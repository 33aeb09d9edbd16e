/*!
 * Thread Registration
 * Scoped membership of a managed thread in its coordinator's registry
 */

use super::handle::ThreadShared;
use crate::coordinator::Coordinator;
use crate::core::ThreadKey;
use std::cell::Cell;
use std::sync::Arc;

thread_local! {
    static MANAGED: Cell<bool> = const { Cell::new(false) };
}

/// Whether the calling thread runs a managed body right now
pub(crate) fn is_managed() -> bool {
    MANAGED.with(Cell::get)
}

/// Registers the running thread on creation, unregisters on drop
///
/// Lives on the managed thread's stack for the whole body, so it is dropped
/// on normal return, on panic and on early exit alike.
pub(crate) struct Registration {
    coordinator: Arc<Coordinator>,
    shared: Arc<ThreadShared>,
    key: ThreadKey,
}

impl Registration {
    pub(crate) fn new(coordinator: Arc<Coordinator>, shared: Arc<ThreadShared>) -> Self {
        let key = std::thread::current().id();
        coordinator.register_thread(key, Arc::downgrade(&shared));
        MANAGED.with(|managed| managed.set(true));
        Self {
            coordinator,
            shared,
            key,
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        MANAGED.with(|managed| managed.set(false));
        self.coordinator.unregister_thread(self.key);
        self.shared.mark_finished();
    }
}
