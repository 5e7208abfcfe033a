//! One-shot completion signal shared by dispatch replies and blocking waits.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

enum Slot<T> {
    Empty,
    Released(T),
    Taken,
}

/// A value released at most once and consumed by at most one waiter.
///
/// This is the building block behind every blocking primitive in the
/// runtime: dispatch replies, `wait_for_*`, and Ask prompts all create one
/// signal, hand `release` to the side that will produce the result, and
/// block on `wait`. Repeated releases are rejected, which is what turns a
/// re-firing event handler into an exactly-once wakeup.
pub struct OneShot<T> {
    slot: Mutex<Slot<T>>,
    cond: Condvar,
}

impl<T> Default for OneShot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OneShot<T> {
    /// Create an empty signal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Empty),
            cond: Condvar::new(),
        }
    }

    /// Store the value and wake the waiter. Returns `false` if the signal
    /// was already released or consumed; the value is dropped in that case.
    pub fn release(&self, value: T) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match *slot {
            Slot::Empty => {
                *slot = Slot::Released(value);
                self.cond.notify_one();
                true
            }
            _ => false,
        }
    }

    /// Block until the signal is released and take the value.
    pub fn wait(&self) -> T {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match std::mem::replace(&mut *slot, Slot::Taken) {
                Slot::Released(value) => return value,
                other => {
                    *slot = other;
                    slot = self
                        .cond
                        .wait(slot)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    /// Block until the signal is released or the timeout elapses.
    pub fn wait_deadline(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match std::mem::replace(&mut *slot, Slot::Taken) {
                Slot::Released(value) => return Some(value),
                other => {
                    *slot = other;
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _timed_out) = self
                .cond
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            slot = guard;
        }
    }
}
