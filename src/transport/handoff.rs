//! Receive buffer passed back and forth between a receiver and its session.

use core::cell::UnsafeCell;

use crate::sync::Semaphore;

/// Default hand-off buffer size.
pub const HANDOFF_SIZE: usize = 512;

/// Single-writer/single-reader buffer guarded only by a semaphore.
///
/// The receiver fills it, queues `Recv(Shared(n))` and blocks in
/// `wait_returned`. The session reads it while decoding and calls
/// `give_back`. Ownership alternates; there is no lock.
pub struct Handoff {
    buf: UnsafeCell<Box<[u8]>>,
    len: usize,
    returned: Semaphore,
}

// SAFETY: Access alternates strictly. The receiver touches `buf` only
// between a successful `wait_returned` (or creation) and queueing the
// event; the session touches it only between dequeueing that event and
// `give_back`. The event queue's lock orders the two sides.
unsafe impl Sync for Handoff {}
unsafe impl Send for Handoff {}

impl Handoff {
    /// Create a buffer of `size` bytes, owned by the receiver.
    pub fn new(size: usize) -> Self {
        let len = size.max(1);
        Self {
            buf: UnsafeCell::new(vec![0u8; len].into_boxed_slice()),
            len,
            returned: Semaphore::new(),
        }
    }

    /// Receiver side: let `f` fill the buffer. Returns what `f` returns.
    ///
    /// Returns `None` once closed. Only the receiver task that owns the
    /// buffer may call this.
    pub(crate) fn fill<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Option<R> {
        if self.returned.is_closed() {
            return None;
        }
        // SAFETY: receiver holds the buffer (see type-level comment).
        let buf = unsafe { &mut *self.buf.get() };
        Some(f(buf))
    }

    /// Session side: read the first `len` bytes. Does not give it back.
    ///
    /// Only a transport's `decode` for a `Recv(Shared)` event may call this.
    pub(crate) fn read<R>(&self, len: usize, f: impl FnOnce(&[u8]) -> R) -> R {
        // SAFETY: session holds the buffer (see type-level comment).
        let buf = unsafe { &*self.buf.get() };
        f(&buf[..len.min(self.len)])
    }

    /// Session side: hand the buffer back to the receiver.
    pub fn give_back(&self) {
        self.returned.give();
    }

    /// Receiver side: block until the session is done with the buffer.
    ///
    /// Returns `false` if the hand-off was closed instead.
    pub fn wait_returned(&self) -> bool {
        self.returned.take() && !self.returned.is_closed()
    }

    /// Release a blocked receiver for good.
    pub fn close(&self) {
        self.returned.close();
    }

    /// Buffer size.
    pub fn capacity(&self) -> usize {
        self.len
    }
}

impl Default for Handoff {
    fn default() -> Self {
        Self::new(HANDOFF_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_alternating_ownership() {
        let h = Arc::new(Handoff::new(8));
        let n = h.fill(|buf| {
            buf[..3].copy_from_slice(b"abc");
            3
        });
        assert_eq!(n, Some(3));

        let waiter = {
            let h = Arc::clone(&h);
            thread::spawn(move || h.wait_returned())
        };
        assert_eq!(h.read(3, |b| b.to_vec()), b"abc");
        h.give_back();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_close_releases_receiver() {
        let h = Arc::new(Handoff::new(8));
        let waiter = {
            let h = Arc::clone(&h);
            thread::spawn(move || h.wait_returned())
        };
        h.close();
        assert!(!waiter.join().unwrap());
        assert!(h.fill(|_| ()).is_none());
    }

    #[test]
    fn test_capacity_is_at_least_one() {
        assert_eq!(Handoff::new(0).capacity(), 1);
        assert_eq!(Handoff::default().capacity(), HANDOFF_SIZE);
    }
}
