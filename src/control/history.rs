//! Fixed-length, most-recent-first error history.
//!
//! Starts zero-filled, so it always holds exactly `depth` entries: the
//! first few control updates see zero padding instead of a short history.

use heapless::Deque;

/// Compile-time ceiling on `history_length`.
pub const MAX_HISTORY: usize = 64;

#[derive(Debug, Clone)]
pub struct ErrorHistory {
    entries: Deque<f64, MAX_HISTORY>,
    depth: usize,
}

impl ErrorHistory {
    /// `depth` is clamped to `1..=MAX_HISTORY`.
    pub fn new(depth: usize) -> Self {
        let depth = depth.clamp(1, MAX_HISTORY);
        let mut entries = Deque::new();
        for _ in 0..depth {
            let _ = entries.push_back(0.0);
        }
        Self { entries, depth }
    }

    /// Prepend the newest error, evicting the oldest.
    pub fn push(&mut self, error: f64) {
        self.entries.pop_back();
        let _ = self.entries.push_front(error);
    }

    /// Number of entries held; never zero.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Index 0 is the most recent entry.
    pub fn get(&self, i: usize) -> Option<f64> {
        self.iter().nth(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().copied()
    }

    pub fn clear(&mut self) {
        *self = Self::new(self.depth);
    }
}
