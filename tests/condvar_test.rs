/*!
 * Condition Variable Integration Tests
 *
 * Timed waits, broadcast and the no-lost-wakeup guarantee
 */

use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use synchro::{ConditionVariable, Coordinator, Mutex, RecursionMode, WakeResult};

struct Shared<T> {
    coordinator: Arc<Coordinator>,
    mutex: Mutex,
    cond: ConditionVariable,
    data: parking_lot::Mutex<T>,
}

fn shared<T>(data: T) -> Arc<Shared<T>> {
    let coordinator = Arc::new(Coordinator::new());
    Arc::new(Shared {
        mutex: Mutex::with_coordinator(RecursionMode::NonRecursive, coordinator.clone()),
        cond: ConditionVariable::with_coordinator(true, coordinator.clone()),
        coordinator,
        data: parking_lot::Mutex::new(data),
    })
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_wait_for_seconds_notified_in_time() {
    let s = shared(());
    let remote = s.clone();
    let notifier = thread::spawn(move || {
        wait_until(|| remote.cond.waiters() == 1);
        thread::sleep(Duration::from_millis(100));
        remote.mutex.lock();
        let woken = remote.cond.notify_one();
        remote.mutex.unlock();
        woken
    });

    s.mutex.lock();
    let notified = s.cond.wait_for_seconds(&s.mutex, 1);
    assert!(s.mutex.is_held_by_current());
    s.mutex.unlock();

    assert!(notified);
    assert_eq!(notifier.join().unwrap(), WakeResult::Woken(1));
}

#[test]
fn test_wait_for_seconds_times_out() {
    let s = shared(());
    let remote = s.clone();
    let notifier = thread::spawn(move || {
        thread::sleep(Duration::from_secs(2));
        remote.mutex.lock();
        let woken = remote.cond.notify_one();
        remote.mutex.unlock();
        woken
    });

    s.mutex.lock();
    let start = Instant::now();
    let notified = s.cond.wait_for_seconds(&s.mutex, 1);
    let elapsed = start.elapsed();
    s.mutex.unlock();

    assert!(!notified);
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(2));
    assert_eq!(notifier.join().unwrap(), WakeResult::NoWaiters);
    assert_eq!(s.coordinator.blocked_threads(), 0);
}

#[test]
fn test_notify_all_wakes_k_waiters() {
    const K: usize = 6;
    let s = shared(false);

    let handles: Vec<_> = (0..K)
        .map(|_| {
            let s = s.clone();
            thread::spawn(move || {
                s.mutex.lock();
                while !*s.data.lock() {
                    s.cond.wait(&s.mutex);
                }
                s.mutex.unlock();
            })
        })
        .collect();

    wait_until(|| s.cond.waiters() == K);
    assert_eq!(s.coordinator.blocked_threads(), K);

    s.mutex.lock();
    *s.data.lock() = true;
    assert_eq!(s.cond.notify_all(), WakeResult::Woken(K));
    s.mutex.unlock();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(s.coordinator.blocked_threads(), 0);
}

#[test]
fn test_producer_consumer_no_lost_wakeup() {
    const ITEMS: usize = 500;
    let s = shared(VecDeque::new());

    let consumer = {
        let s = s.clone();
        thread::spawn(move || {
            let mut received = Vec::with_capacity(ITEMS);
            while received.len() < ITEMS {
                s.mutex.lock();
                loop {
                    let next = s.data.lock().pop_front();
                    match next {
                        Some(item) => {
                            received.push(item);
                            break;
                        }
                        None => s.cond.wait(&s.mutex),
                    }
                }
                s.mutex.unlock();
            }
            received
        })
    };

    for item in 0..ITEMS {
        s.mutex.lock();
        s.data.lock().push_back(item);
        s.cond.notify_one();
        s.mutex.unlock();
    }

    let received = consumer.join().unwrap();
    assert_eq!(received, (0..ITEMS).collect::<Vec<_>>());
    assert_eq!(s.coordinator.blocked_threads(), 0);
}

#[test]
fn test_free_mode_does_not_release_condition_waiters() {
    let s = shared(());
    s.mutex.lock();
    s.coordinator.set_free_mode();
    // Only semaphores are drained
    assert!(!s.cond.wait_timeout(&s.mutex, Duration::from_millis(20)));
    s.mutex.unlock();
}
