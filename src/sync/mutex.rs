/*!
 * Mutex
 *
 * Explicit `lock()`/`unlock()` mutual exclusion with an optional recursive
 * mode, instrumented with fault-injection delays.
 */

use crate::coordinator::{Coordinator, EventType};
use crate::core::{SyncError, SyncResult, ThreadKey};
use parking_lot::{Condvar, Mutex as RawMutex};
use std::sync::Arc;
use tracing::trace;

/// Recursion behavior, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecursionMode {
    /// The owner may lock again; each lock needs its own unlock
    Recursive,
    /// A second lock by the owner deadlocks, like a native mutex
    #[default]
    NonRecursive,
}

/// Ownership state; the variant never changes after construction
#[derive(Debug)]
enum LockState {
    Recursive { owner: Option<ThreadKey>, holds: usize },
    NonRecursive { owner: Option<ThreadKey> },
}

impl LockState {
    fn owner(&self) -> Option<ThreadKey> {
        match self {
            LockState::Recursive { owner, .. } | LockState::NonRecursive { owner } => *owner,
        }
    }

    /// Try to take one hold for `me`
    fn try_take(&mut self, me: ThreadKey) -> bool {
        match self {
            LockState::Recursive { owner, holds } => match owner {
                None => {
                    *owner = Some(me);
                    *holds = 1;
                    true
                }
                Some(current) if *current == me => {
                    *holds += 1;
                    true
                }
                Some(_) => false,
            },
            LockState::NonRecursive { owner } => {
                if owner.is_none() {
                    *owner = Some(me);
                    true
                } else {
                    false
                }
            }
        }
    }
}

/// Mutual exclusion lock with explicit unlock
///
/// Unlike `std::sync::Mutex` the lock is not tied to a guard, so it can be
/// released by [`ConditionVariable::wait`](super::ConditionVariable::wait)
/// and mirrors classic `lock()`/`unlock()` teaching material. Use
/// [`guard`](Self::guard) for scoped locking.
///
/// # Example
///
/// ```
/// use synchro::{Mutex, RecursionMode};
///
/// let mutex = Mutex::new(RecursionMode::Recursive);
/// mutex.lock();
/// mutex.lock();
/// mutex.unlock();
/// mutex.unlock();
/// assert!(!mutex.is_locked());
/// ```
pub struct Mutex {
    state: RawMutex<LockState>,
    available: Condvar,
    coordinator: Arc<Coordinator>,
}

impl Mutex {
    pub fn new(mode: RecursionMode) -> Self {
        Self::with_coordinator(mode, Coordinator::global())
    }

    /// Non-recursive mutex
    pub fn non_recursive() -> Self {
        Self::new(RecursionMode::NonRecursive)
    }

    /// Recursive mutex
    pub fn recursive() -> Self {
        Self::new(RecursionMode::Recursive)
    }

    pub fn with_coordinator(mode: RecursionMode, coordinator: Arc<Coordinator>) -> Self {
        let state = match mode {
            RecursionMode::Recursive => LockState::Recursive {
                owner: None,
                holds: 0,
            },
            RecursionMode::NonRecursive => LockState::NonRecursive { owner: None },
        };
        Self {
            state: RawMutex::new(state),
            available: Condvar::new(),
            coordinator,
        }
    }

    pub fn recursion_mode(&self) -> RecursionMode {
        match *self.state.lock() {
            LockState::Recursive { .. } => RecursionMode::Recursive,
            LockState::NonRecursive { .. } => RecursionMode::NonRecursive,
        }
    }

    /// Block until the calling thread owns the mutex
    pub fn lock(&self) {
        self.coordinator.random_delay(EventType::MutexLock);
        self.acquire(current_key());
        self.coordinator.random_delay(EventType::MutexLock);
    }

    /// Take the mutex if it is free (or already owned, in recursive mode)
    pub fn try_lock(&self) -> bool {
        self.state.lock().try_take(current_key())
    }

    /// Release one hold
    ///
    /// Unlocking a mutex the caller does not own is a protocol violation: it
    /// is logged, counted on the coordinator, and otherwise ignored.
    pub fn unlock(&self) {
        if let Err(e) = self.try_unlock() {
            self.coordinator.record_violation(&e.to_string());
        }
    }

    /// Release one hold, reporting a foreign unlock as an error
    pub fn try_unlock(&self) -> SyncResult<()> {
        self.coordinator.random_delay(EventType::MutexUnlock);
        let result = self.release(current_key());
        self.coordinator.random_delay(EventType::MutexUnlock);
        result
    }

    /// Lock and return a guard that unlocks on drop
    pub fn guard(&self) -> MutexGuard<'_> {
        self.lock();
        MutexGuard { mutex: self }
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().owner().is_some()
    }

    /// Whether the calling thread holds the mutex
    pub fn is_held_by_current(&self) -> bool {
        self.state.lock().owner() == Some(current_key())
    }

    fn acquire(&self, me: ThreadKey) {
        let mut state = self.state.lock();
        let mut warned = false;
        while !state.try_take(me) {
            if !warned && state.owner() == Some(me) {
                // Non-recursive relock: blocks forever, like the native primitive
                warned = true;
                drop(state);
                self.coordinator
                    .record_violation("non-recursive mutex locked twice by its owner");
                state = self.state.lock();
                continue;
            }
            self.available.wait(&mut state);
        }
        trace!(owner = ?me, "mutex locked");
    }

    fn release(&self, me: ThreadKey) -> SyncResult<()> {
        let mut state = self.state.lock();
        if state.owner() != Some(me) {
            return Err(SyncError::NotOwner);
        }
        let freed = match &mut *state {
            LockState::Recursive { owner, holds } => {
                *holds -= 1;
                if *holds == 0 {
                    *owner = None;
                    true
                } else {
                    false
                }
            }
            LockState::NonRecursive { owner } => {
                *owner = None;
                true
            }
        };
        drop(state);
        if freed {
            self.available.notify_one();
            trace!(owner = ?me, "mutex unlocked");
        }
        Ok(())
    }

    /// Drop every hold of the caller without delays, returning the count
    ///
    /// Used by condition variables; the unlock half of their atomic
    /// unlock-and-enqueue step.
    pub(crate) fn release_all(&self, me: ThreadKey) -> SyncResult<usize> {
        let mut state = self.state.lock();
        if state.owner() != Some(me) {
            return Err(SyncError::NotOwner);
        }
        let holds = match &mut *state {
            LockState::Recursive { owner, holds } => {
                *owner = None;
                std::mem::take(holds)
            }
            LockState::NonRecursive { owner } => {
                *owner = None;
                1
            }
        };
        drop(state);
        self.available.notify_one();
        Ok(holds)
    }

    /// Lock again after a condition wait, restoring the recursion depth
    pub(crate) fn reacquire(&self, me: ThreadKey, holds: usize) {
        self.coordinator.random_delay(EventType::MutexLock);
        self.acquire(me);
        if let LockState::Recursive { holds: current, .. } = &mut *self.state.lock() {
            *current = holds.max(1);
        }
        self.coordinator.random_delay(EventType::MutexLock);
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::non_recursive()
    }
}

impl std::fmt::Debug for Mutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutex")
            .field("state", &*self.state.lock())
            .finish()
    }
}

/// Scoped lock returned by [`Mutex::guard`]
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

#[inline]
pub(crate) fn current_key() -> ThreadKey {
    std::thread::current().id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    fn isolated(mode: RecursionMode) -> (Arc<Coordinator>, Arc<Mutex>) {
        let coordinator = Arc::new(Coordinator::new());
        let mutex = Arc::new(Mutex::with_coordinator(mode, coordinator.clone()));
        (coordinator, mutex)
    }

    #[test]
    fn test_lock_unlock_does_not_block() {
        let (_, mutex) = isolated(RecursionMode::NonRecursive);
        let start = Instant::now();
        mutex.lock();
        assert!(mutex.is_locked());
        assert!(mutex.is_held_by_current());
        mutex.unlock();
        assert!(!mutex.is_locked());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_recursive_nesting() {
        let (_, mutex) = isolated(RecursionMode::Recursive);
        for _ in 0..5 {
            mutex.lock();
        }
        for _ in 0..4 {
            mutex.unlock();
            assert!(mutex.is_locked());
        }
        mutex.unlock();
        assert!(!mutex.is_locked());
    }

    #[test]
    fn test_recursive_blocks_other_threads_until_last_unlock() {
        let (_, mutex) = isolated(RecursionMode::Recursive);
        mutex.lock();
        mutex.lock();

        let acquired = Arc::new(AtomicBool::new(false));
        let mutex_clone = mutex.clone();
        let acquired_clone = acquired.clone();
        let handle = thread::spawn(move || {
            mutex_clone.lock();
            acquired_clone.store(true, Ordering::SeqCst);
            mutex_clone.unlock();
        });

        mutex.unlock();
        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));

        mutex.unlock();
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_try_lock() {
        let (_, mutex) = isolated(RecursionMode::NonRecursive);
        assert!(mutex.try_lock());
        // Non-recursive: the owner cannot take it again
        assert!(!mutex.try_lock());

        let mutex_clone = mutex.clone();
        let other = thread::spawn(move || mutex_clone.try_lock()).join().unwrap();
        assert!(!other);
        mutex.unlock();
    }

    #[test]
    fn test_foreign_unlock_is_reported() {
        let (coordinator, mutex) = isolated(RecursionMode::NonRecursive);
        mutex.lock();

        let mutex_clone = mutex.clone();
        let result = thread::spawn(move || mutex_clone.try_unlock()).join().unwrap();
        assert_eq!(result, Err(SyncError::NotOwner));
        assert!(mutex.is_locked());

        let mutex_clone = mutex.clone();
        thread::spawn(move || mutex_clone.unlock()).join().unwrap();
        assert_eq!(coordinator.protocol_violations(), 1);
        assert!(mutex.is_locked());

        mutex.unlock();
    }

    #[test]
    fn test_unlock_unlocked() {
        let (coordinator, mutex) = isolated(RecursionMode::Recursive);
        assert_eq!(mutex.try_unlock(), Err(SyncError::NotOwner));
        mutex.unlock();
        assert_eq!(coordinator.protocol_violations(), 1);
    }

    #[test]
    fn test_guard_unlocks_on_drop() {
        let (_, mutex) = isolated(RecursionMode::NonRecursive);
        {
            let _guard = mutex.guard();
            assert!(mutex.is_locked());
        }
        assert!(!mutex.is_locked());
    }

    #[test]
    fn test_mutual_exclusion() {
        let (_, mutex) = isolated(RecursionMode::NonRecursive);
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mutex = mutex.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        mutex.lock();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                        mutex.unlock();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_all_and_reacquire() {
        let (_, mutex) = isolated(RecursionMode::Recursive);
        let me = current_key();
        mutex.lock();
        mutex.lock();
        mutex.lock();

        assert_eq!(mutex.release_all(me), Ok(3));
        assert!(!mutex.is_locked());

        mutex.reacquire(me, 3);
        mutex.unlock();
        mutex.unlock();
        assert!(mutex.is_locked());
        mutex.unlock();
        assert!(!mutex.is_locked());
    }

    #[test]
    fn test_recursion_mode_reported() {
        assert_eq!(
            isolated(RecursionMode::Recursive).1.recursion_mode(),
            RecursionMode::Recursive
        );
        assert_eq!(
            isolated(RecursionMode::NonRecursive).1.recursion_mode(),
            RecursionMode::NonRecursive
        );
    }
}
