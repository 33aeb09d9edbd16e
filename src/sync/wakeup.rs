/*!
 * Wakeup Queue
 *
 * FIFO of per-waiter one-shot tokens. Each blocked thread owns the receiving
 * end of a single-slot channel; waking it means sending into exactly that
 * channel, so a wakeup always reaches the intended waiter.
 *
 * The queue itself is not synchronized: owners keep it behind their own lock
 * and block on the returned [`Waiter`] only after releasing that lock.
 */

use crate::core::limits::WAKEUP_QUEUE_CAPACITY;
use flume::{Receiver, Sender};
use std::collections::VecDeque;
use std::time::Duration;

/// Result of a wake operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeResult {
    /// Successfully woke N waiters (N >= 1)
    Woken(usize),
    /// No waiters were waiting
    NoWaiters,
}

impl WakeResult {
    fn from_count(count: usize) -> Self {
        if count == 0 {
            WakeResult::NoWaiters
        } else {
            WakeResult::Woken(count)
        }
    }

    /// Check if any waiters were woken
    #[inline(always)]
    pub fn is_woken(&self) -> bool {
        matches!(self, WakeResult::Woken(_))
    }

    /// Get number of woken waiters (0 if none)
    #[inline(always)]
    pub fn count(&self) -> usize {
        match self {
            WakeResult::Woken(n) => *n,
            WakeResult::NoWaiters => 0,
        }
    }
}

/// Receiving side of a queued wakeup token
pub(crate) struct Waiter {
    ticket: u64,
    token: Receiver<()>,
}

impl Waiter {
    pub(crate) fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Block until signaled
    ///
    /// Returns `false` when the queue was torn down without a signal.
    pub(crate) fn wait(&self) -> bool {
        self.token.recv().is_ok()
    }

    /// Block until signaled or the timeout elapses
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        self.token.recv_timeout(timeout).is_ok()
    }
}

/// FIFO of wakeup tokens
pub(crate) struct WakeupQueue {
    entries: VecDeque<(u64, Sender<()>)>,
    next_ticket: u64,
}

impl WakeupQueue {
    pub(crate) fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(WAKEUP_QUEUE_CAPACITY),
            next_ticket: 0,
        }
    }

    /// Append a waiter at the tail
    pub(crate) fn enqueue(&mut self) -> Waiter {
        let (tx, rx) = flume::bounded(1);
        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.entries.push_back((ticket, tx));
        Waiter { ticket, token: rx }
    }

    /// Signal and remove the head waiter
    pub(crate) fn wake_front(&mut self) -> WakeResult {
        match self.entries.pop_front() {
            Some((_, tx)) => {
                // Single send into an empty single-slot channel never blocks
                let _ = tx.try_send(());
                WakeResult::Woken(1)
            }
            None => WakeResult::NoWaiters,
        }
    }

    /// Signal and remove every waiter
    pub(crate) fn wake_all(&mut self) -> WakeResult {
        let count = self.entries.len();
        for (_, tx) in self.entries.drain(..) {
            let _ = tx.try_send(());
        }
        WakeResult::from_count(count)
    }

    /// Remove a waiter that gave up
    ///
    /// Returns `false` if it was already signaled.
    pub(crate) fn cancel(&mut self, ticket: u64) -> bool {
        match self.entries.iter().position(|(t, _)| *t == ticket) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
