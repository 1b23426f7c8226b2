//! Bounded session event queue.
//!
//! Multiple producers (transport receivers, log router), one consumer (the
//! session task). Producers choose between a bounded wait and no wait at
//! all; the consumer waits bounded or forever.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::event::Event;
use crate::sync::lock;

/// How long the consumer is prepared to block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    /// Block until an event arrives or the queue closes.
    Forever,
    /// Block for at most this long.
    For(Duration),
}

/// Result of a receive.
#[derive(Debug)]
pub enum Received {
    Event(Event),
    Timeout,
    Closed,
}

/// Why an event was not queued. The event is handed back to the caller.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("event queue full")]
    Full(Event),
    #[error("event queue closed")]
    Closed(Event),
}

impl SendError {
    /// Recover the rejected event.
    pub fn into_event(self) -> Event {
        match self {
            Self::Full(e) | Self::Closed(e) => e,
        }
    }
}

/// Bounded FIFO of session events.
pub struct EventQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

struct QueueState {
    events: VecDeque<Event>,
    closed: bool,
}

impl EventQueue {
    /// Create a queue holding at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                events: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Queue an event without waiting.
    pub fn try_send(&self, event: Event) -> Result<(), SendError> {
        self.send_timeout(event, Duration::ZERO)
    }

    /// Queue an event, waiting at most `timeout` for space.
    pub fn send_timeout(&self, event: Event, timeout: Duration) -> Result<(), SendError> {
        let deadline = Instant::now() + timeout;
        let mut state = lock(&self.state);
        loop {
            if state.closed {
                return Err(SendError::Closed(event));
            }
            if state.events.len() < self.capacity {
                state.events.push_back(event);
                self.not_empty.notify_one();
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(SendError::Full(event));
            }
            state = self
                .not_full
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Take the oldest event.
    pub fn recv(&self, wait: Wait) -> Received {
        let deadline = match wait {
            Wait::Forever => None,
            Wait::For(d) => Some(Instant::now() + d),
        };
        let mut state = lock(&self.state);
        loop {
            if let Some(event) = state.events.pop_front() {
                self.not_full.notify_one();
                return Received::Event(event);
            }
            if state.closed {
                return Received::Closed;
            }
            state = match deadline {
                None => self.not_empty.wait(state).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Received::Timeout;
                    }
                    self.not_empty
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Close the queue and release every pending event.
    ///
    /// Wakes all waiters. Returns how many events were released.
    pub fn close(&self) -> usize {
        let pending: Vec<Event> = {
            let mut state = lock(&self.state);
            state.closed = true;
            self.not_empty.notify_all();
            self.not_full.notify_all();
            state.events.drain(..).collect()
        };
        // Dropped outside the lock: shared batches release here.
        pending.len()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        lock(&self.state).events.len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once `close` has been called.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Maximum number of queued events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
