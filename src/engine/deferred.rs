//! Bounded holding queue for alerts that arrive while a command owns input.

use std::collections::VecDeque;

use super::event::Event;

/// FIFO of diverted alerts. Overflow evicts the oldest entry and never
/// blocks.
pub struct DeferredQueue {
    entries: VecDeque<Event>,
    capacity: usize,
    /// Monotonic count of evictions.
    discarded: u32,
    /// Evictions already reported to the user.
    reported: u32,
}

impl DeferredQueue {
    /// Create a queue holding at most `capacity` alerts.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            discarded: 0,
            reported: 0,
        }
    }

    /// Hold an alert, evicting the oldest if full.
    ///
    /// The evicted alert is returned so the caller controls when it is
    /// released.
    pub fn push(&mut self, event: Event) -> Option<Event> {
        let evicted = if self.entries.len() >= self.capacity {
            self.discarded = self.discarded.wrapping_add(1);
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(event);
        evicted
    }

    /// Take the oldest held alert.
    pub fn pop(&mut self) -> Option<Event> {
        self.entries.pop_front()
    }

    /// Evictions not yet reported, marking them reported.
    pub fn take_unreported(&mut self) -> u32 {
        let count = self.discarded.wrapping_sub(self.reported);
        self.reported = self.discarded;
        count
    }

    /// Total evictions since creation.
    pub fn discarded(&self) -> u32 {
        self.discarded
    }

    /// Number of held alerts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of held alerts.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
