//! Command history ring
//!
//! Newest entry first. Repeating the previous command does not add an
//! entry.

use std::collections::VecDeque;

/// Number of history entries
pub const HISTORY_SIZE: usize = 8;

/// Command history ring buffer
pub struct History {
    /// Newest at the front
    entries: VecDeque<String>,
    /// Current navigation position (0 = newest)
    nav_pos: Option<usize>,
}

impl History {
    /// Create empty history
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(HISTORY_SIZE),
            nav_pos: None,
        }
    }

    /// Push a new command into history
    pub fn push(&mut self, line: &str) {
        self.nav_pos = None;
        if line.is_empty() || self.entries.front().is_some_and(|e| e == line) {
            return;
        }
        if self.entries.len() == HISTORY_SIZE {
            self.entries.pop_back();
        }
        self.entries.push_front(line.to_string());
    }

    /// Get previous (older) command
    pub fn get_prev(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let pos = match self.nav_pos {
            None => 0,
            Some(p) if p + 1 < self.entries.len() => p + 1,
            Some(p) => p,
        };
        self.nav_pos = Some(pos);
        self.entries.get(pos).map(String::as_str)
    }

    /// Get next (newer) command; `None` means back to an empty line
    pub fn get_next(&mut self) -> Option<&str> {
        match self.nav_pos {
            None | Some(0) => {
                self.nav_pos = None;
                None
            }
            Some(p) => {
                self.nav_pos = Some(p - 1);
                self.entries.get(p - 1).map(String::as_str)
            }
        }
    }

    /// Reset navigation (call when user types)
    pub fn reset_nav(&mut self) {
        self.nav_pos = None;
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing was ever entered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}
