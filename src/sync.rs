//! Blocking primitives shared by tasks, sessions and receivers.
//!
//! Thin wrappers over `std::sync` shaped like the FreeRTOS objects they
//! stand in for on target: a binary semaphore and poison-tolerant locking.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Lock a mutex, recovering the guard if a panicking thread poisoned it.
///
/// Every structure guarded this way is left consistent between statements,
/// so a poisoned lock carries no torn state.
#[inline]
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Binary semaphore that can be closed to release every waiter.
///
/// Created empty. `give` saturates at one token.
pub struct Semaphore {
    state: Mutex<SemState>,
    cond: Condvar,
}

struct SemState {
    available: bool,
    closed: bool,
}

impl Semaphore {
    /// Create an empty semaphore.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(SemState { available: false, closed: false }),
            cond: Condvar::new(),
        }
    }

    /// Make one token available.
    pub fn give(&self) {
        let mut state = lock(&self.state);
        state.available = true;
        self.cond.notify_one();
    }

    /// Block until a token is available.
    ///
    /// Returns `false` if the semaphore was closed instead.
    pub fn take(&self) -> bool {
        let mut state = lock(&self.state);
        loop {
            if state.available {
                state.available = false;
                return true;
            }
            if state.closed {
                return false;
            }
            state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block for at most `timeout` waiting for a token.
    pub fn take_timeout(&self, timeout: Duration) -> bool {
        let state = lock(&self.state);
        let (mut state, _) = self
            .cond
            .wait_timeout_while(state, timeout, |s| !s.available && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        if state.available {
            state.available = false;
            true
        } else {
            false
        }
    }

    /// Release all current and future waiters with `false`.
    pub fn close(&self) {
        let mut state = lock(&self.state);
        state.closed = true;
        self.cond.notify_all();
    }

    /// Check whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}
