/*!
 * Coordinator
 *
 * Process-wide bookkeeping shared by every primitive:
 * - fault-injection delays per event type
 * - live managed threads, for self lookup
 * - monitored semaphores, for free mode draining
 * - blocked-thread count and the watchdog hook
 *
 * # Locking
 *
 * Coordinator state sits behind a single internal lock. Primitives may take
 * it while holding their own lock, but only for counter updates. The
 * coordinator never takes a primitive lock while holding its own: free mode
 * snapshots the semaphore list first, and the watchdog is always invoked with
 * no lock held.
 */

use super::config::DelayConfig;
use super::traits::FreeModeTarget;
use super::types::{CoordinatorStats, EventType, Mode};
use super::watchdog::Watchdog;
use crate::core::{Micros, SemaphoreId, ThreadKey};
use crate::monitoring::span_operation;
use crate::thread::{ThreadRef, ThreadShared};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Lazily created process-wide coordinator
static GLOBAL_COORDINATOR: OnceLock<Arc<Coordinator>> = OnceLock::new();

/// Mutable state guarded by the coordinator lock
struct CoordinatorState {
    semaphores: HashMap<SemaphoreId, Weak<dyn FreeModeTarget>, RandomState>,
    blocked: usize,
    mode: Mode,
    watchdog: Option<Arc<dyn Watchdog>>,
    violations: u64,
}

/// Registry and fault injector shared by the primitives
///
/// Most code uses [`Coordinator::global`]. Tests and embedders that need
/// isolation construct their own instance and hand it to the primitives'
/// `with_coordinator` constructors.
pub struct Coordinator {
    delays: RwLock<DelayConfig>,
    state: Mutex<CoordinatorState>,
    live_threads: DashMap<ThreadKey, Weak<ThreadShared>, RandomState>,
    next_semaphore_id: AtomicU64,
}

impl Coordinator {
    /// Coordinator with fault injection disabled
    pub fn new() -> Self {
        Self::with_config(DelayConfig::default())
    }

    pub fn with_config(config: DelayConfig) -> Self {
        Self {
            delays: RwLock::new(config),
            state: Mutex::new(CoordinatorState {
                semaphores: HashMap::with_hasher(RandomState::new()),
                blocked: 0,
                mode: Mode::Normal,
                watchdog: None,
                violations: 0,
            }),
            live_threads: DashMap::with_hasher(RandomState::new()),
            next_semaphore_id: AtomicU64::new(1),
        }
    }

    /// Process-wide coordinator, created on first use from the environment
    pub fn global() -> Arc<Coordinator> {
        GLOBAL_COORDINATOR
            .get_or_init(|| {
                let config = DelayConfig::from_env();
                info!(
                    standard_us = config.bound(EventType::Standard),
                    "global coordinator initialized"
                );
                Arc::new(Coordinator::with_config(config))
            })
            .clone()
    }

    // -------------------------------------------------------------------------
    // Fault injection
    // -------------------------------------------------------------------------

    /// Replace the whole delay configuration
    pub fn apply_config(&self, config: DelayConfig) {
        *self.delays.write() = config;
    }

    /// Current delay configuration
    pub fn config(&self) -> DelayConfig {
        self.delays.read().clone()
    }

    /// Set the maximum sleeping time of one event type
    pub fn set_max_delay(&self, micros: Micros, event: EventType) {
        self.delays.write().set(event, micros);
    }

    /// Effective maximum sleeping time of an event type
    pub fn max_delay(&self, event: EventType) -> Micros {
        self.delays.read().bound(event)
    }

    /// Sleep for a uniformly random duration in `[0, max_delay(event)]`
    pub fn random_delay(&self, event: EventType) {
        let bound = self.max_delay(event);
        if bound == 0 {
            return;
        }
        let micros = rand::thread_rng().gen_range(0..=bound);
        trace!(event = %event, micros, "injected delay");
        std::thread::sleep(Duration::from_micros(micros));
    }

    // -------------------------------------------------------------------------
    // Thread registry
    // -------------------------------------------------------------------------

    pub(crate) fn register_thread(&self, key: ThreadKey, thread: Weak<ThreadShared>) {
        if self.live_threads.insert(key, thread).is_some() {
            self.record_violation("thread registered twice");
        }
        debug!(thread = ?key, "thread registered");
    }

    pub(crate) fn unregister_thread(&self, key: ThreadKey) {
        if self.live_threads.remove(&key).is_some() {
            debug!(thread = ?key, "thread unregistered");
        }
    }

    /// Handle of the calling thread, `None` if it is not managed here
    pub fn current_thread(&self) -> Option<ThreadRef> {
        let key = std::thread::current().id();
        let shared = self.live_threads.get(&key)?.upgrade()?;
        Some(ThreadRef::new(key, shared))
    }

    /// Number of managed threads currently running
    pub fn live_threads(&self) -> usize {
        self.live_threads.len()
    }

    // -------------------------------------------------------------------------
    // Semaphore registry
    // -------------------------------------------------------------------------

    pub(crate) fn register_semaphore(&self, target: Weak<dyn FreeModeTarget>) -> SemaphoreId {
        let id = self.next_semaphore_id.fetch_add(1, Ordering::Relaxed);
        self.state.lock().semaphores.insert(id, target);
        trace!(semaphore = id, "semaphore registered");
        id
    }

    pub(crate) fn unregister_semaphore(&self, id: SemaphoreId) {
        if self.state.lock().semaphores.remove(&id).is_some() {
            trace!(semaphore = id, "semaphore unregistered");
        }
    }

    /// Number of registered monitored semaphores
    pub fn monitored_semaphores(&self) -> usize {
        self.state.lock().semaphores.len()
    }

    // -------------------------------------------------------------------------
    // Blocked threads and watchdog
    // -------------------------------------------------------------------------

    /// Count one more blocked thread and notify the watchdog
    ///
    /// Must not be called while holding a primitive lock, since the watchdog
    /// may call back into primitives.
    pub fn add_waiting_thread(&self) {
        let blocked = self.enter_blocked();
        self.notify_watchdog(blocked);
    }

    /// Count one thread leaving the blocked state
    pub fn remove_waiting_thread(&self) {
        self.leave_blocked(1);
    }

    /// Counter half of [`add_waiting_thread`](Self::add_waiting_thread),
    /// safe under a primitive lock
    pub(crate) fn enter_blocked(&self) -> usize {
        let mut state = self.state.lock();
        state.blocked += 1;
        state.blocked
    }

    pub(crate) fn leave_blocked(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut state = self.state.lock();
        if state.blocked < count {
            warn!(
                blocked = state.blocked,
                leaving = count,
                "blocked count would underflow"
            );
            state.violations += 1;
        }
        state.blocked = state.blocked.saturating_sub(count);
    }

    /// Watchdog half of [`add_waiting_thread`](Self::add_waiting_thread)
    pub(crate) fn notify_watchdog(&self, blocked: usize) {
        let watchdog = self.state.lock().watchdog.clone();
        if let Some(watchdog) = watchdog {
            watchdog.trigger(blocked);
        }
    }

    /// Threads currently blocked on monitored primitives
    pub fn blocked_threads(&self) -> usize {
        self.state.lock().blocked
    }

    /// Install the watchdog, replacing any previous one
    pub fn set_watchdog(&self, watchdog: Arc<dyn Watchdog>) {
        self.state.lock().watchdog = Some(watchdog);
    }

    /// Remove and return the installed watchdog
    pub fn clear_watchdog(&self) -> Option<Arc<dyn Watchdog>> {
        self.state.lock().watchdog.take()
    }

    // -------------------------------------------------------------------------
    // Modes
    // -------------------------------------------------------------------------

    pub fn mode(&self) -> Mode {
        self.state.lock().mode
    }

    pub fn is_free(&self) -> bool {
        self.mode() == Mode::Free
    }

    /// Return to normal blocking behavior; nobody is woken
    pub fn set_normal_mode(&self) {
        self.state.lock().mode = Mode::Normal;
        info!("coordinator switched to normal mode");
    }

    /// Enter free mode and open every registered semaphore
    ///
    /// Returns the number of forced releases. After this call no monitored
    /// semaphore blocks until [`set_normal_mode`](Self::set_normal_mode).
    pub fn set_free_mode(&self) -> usize {
        let span = span_operation("free_mode_drain");
        let targets: Vec<Arc<dyn FreeModeTarget>> = {
            let mut state = self.state.lock();
            state.mode = Mode::Free;
            state.semaphores.values().filter_map(Weak::upgrade).collect()
        };

        let released: usize = targets.iter().map(|target| target.open()).sum();
        span.record_items_processed(released);
        info!(
            semaphores = targets.len(),
            released, "coordinator switched to free mode"
        );
        released
    }

    // -------------------------------------------------------------------------
    // Diagnostics
    // -------------------------------------------------------------------------

    /// Log and count a usage-protocol violation
    pub(crate) fn record_violation(&self, what: &str) {
        self.state.lock().violations += 1;
        warn!(violation = what, "synchronization protocol violation");
    }

    /// Number of protocol violations observed so far
    pub fn protocol_violations(&self) -> u64 {
        self.state.lock().violations
    }

    pub fn stats(&self) -> CoordinatorStats {
        let live_threads = self.live_threads.len();
        let state = self.state.lock();
        CoordinatorStats {
            mode: state.mode,
            blocked_threads: state.blocked,
            live_threads,
            monitored_semaphores: state.semaphores.len(),
            protocol_violations: state.violations,
            watchdog_installed: state.watchdog.is_some(),
        }
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::watchdog::MockWatchdog;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct CountingTarget {
        opened: AtomicUsize,
    }

    impl FreeModeTarget for CountingTarget {
        fn open(&self) -> usize {
            self.opened.fetch_add(1, Ordering::SeqCst);
            2
        }
    }

    #[test]
    fn test_initial_state() {
        let coordinator = Coordinator::new();
        assert_eq!(
            coordinator.stats(),
            CoordinatorStats {
                mode: Mode::Normal,
                blocked_threads: 0,
                live_threads: 0,
                monitored_semaphores: 0,
                protocol_violations: 0,
                watchdog_installed: false,
            }
        );
    }

    #[test]
    fn test_zero_delay_does_not_sleep() {
        let coordinator = Coordinator::new();
        let start = Instant::now();
        for _ in 0..1000 {
            coordinator.random_delay(EventType::MutexLock);
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_delay_bounded() {
        let coordinator = Coordinator::new();
        coordinator.set_max_delay(2_000, EventType::SemaphoreAcquire);
        assert_eq!(coordinator.max_delay(EventType::SemaphoreAcquire), 2_000);
        assert_eq!(coordinator.max_delay(EventType::SemaphoreRelease), 0);

        let start = Instant::now();
        coordinator.random_delay(EventType::SemaphoreAcquire);
        // Upper bound plus scheduling slack
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_watchdog_receives_new_count() {
        let coordinator = Coordinator::new();
        let mut watchdog = MockWatchdog::new();
        watchdog.expect_trigger().with(eq(1)).times(1).return_const(());
        watchdog.expect_trigger().with(eq(2)).times(1).return_const(());
        coordinator.set_watchdog(Arc::new(watchdog));

        coordinator.add_waiting_thread();
        coordinator.add_waiting_thread();
        assert_eq!(coordinator.blocked_threads(), 2);

        coordinator.remove_waiting_thread();
        assert_eq!(coordinator.blocked_threads(), 1);

        // Dropping the mock verifies the expectations
        assert!(coordinator.clear_watchdog().is_some());
    }

    #[test]
    fn test_remove_waiting_thread_underflow_is_counted() {
        let coordinator = Coordinator::new();
        coordinator.remove_waiting_thread();
        assert_eq!(coordinator.blocked_threads(), 0);
        assert_eq!(coordinator.protocol_violations(), 1);
    }

    #[test]
    fn test_free_mode_opens_live_targets_only() {
        let coordinator = Coordinator::new();
        let alive = Arc::new(CountingTarget {
            opened: AtomicUsize::new(0),
        });
        let alive_weak: Weak<dyn FreeModeTarget> = Arc::downgrade(&alive) as Weak<dyn FreeModeTarget>;
        coordinator.register_semaphore(alive_weak);

        let gone = Arc::new(CountingTarget {
            opened: AtomicUsize::new(0),
        });
        let gone_weak: Weak<dyn FreeModeTarget> = Arc::downgrade(&gone) as Weak<dyn FreeModeTarget>;
        coordinator.register_semaphore(gone_weak);
        drop(gone);

        assert_eq!(coordinator.set_free_mode(), 2);
        assert_eq!(alive.opened.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.mode(), Mode::Free);

        coordinator.set_normal_mode();
        assert_eq!(coordinator.mode(), Mode::Normal);
        assert_eq!(alive.opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_semaphore_registry() {
        let coordinator = Coordinator::new();
        let target = Arc::new(CountingTarget {
            opened: AtomicUsize::new(0),
        });
        let weak: Weak<dyn FreeModeTarget> = Arc::downgrade(&target) as Weak<dyn FreeModeTarget>;
        let id = coordinator.register_semaphore(weak);
        assert_eq!(coordinator.monitored_semaphores(), 1);

        coordinator.unregister_semaphore(id);
        coordinator.unregister_semaphore(id);
        assert_eq!(coordinator.monitored_semaphores(), 0);
    }

    #[test]
    fn test_current_thread_unmanaged() {
        let coordinator = Coordinator::new();
        assert!(coordinator.current_thread().is_none());
        assert_eq!(coordinator.live_threads(), 0);
    }

    #[test]
    fn test_thread_registry() {
        let coordinator = Coordinator::new();
        let shared = Arc::new(ThreadShared::new("registry-test".to_string()));
        let key = std::thread::current().id();

        coordinator.register_thread(key, Arc::downgrade(&shared));
        let current = coordinator.current_thread().unwrap();
        assert_eq!(current.id(), key);
        assert_eq!(current.name(), "registry-test");

        coordinator.unregister_thread(key);
        assert!(coordinator.current_thread().is_none());
    }

    #[test]
    fn test_global_is_shared() {
        let a = Coordinator::global();
        let b = Coordinator::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
