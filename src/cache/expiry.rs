//! Expiry Heap Module
//!
//! Min-heap of expiration deadlines used to find due entries in O(log n).
//!
//! The heap is only an index. Overwrites and removals leave old marks behind
//! rather than searching the heap for them; whoever pops a mark must check it
//! against the owning map (same key, same write generation) before acting.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ExpiryMark {
    expires_at: Instant,
    generation: u64,
    key: String,
}

// == Expiry Heap ==
#[derive(Debug, Default)]
pub struct ExpiryHeap {
    heap: BinaryHeap<Reverse<ExpiryMark>>,
}

impl ExpiryHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `key`, written at `generation`, expires at `expires_at`.
    pub fn push(&mut self, key: &str, generation: u64, expires_at: Instant) {
        self.heap.push(Reverse(ExpiryMark {
            expires_at,
            generation,
            key: key.to_string(),
        }));
    }

    /// Pops the earliest mark if it is due at `now`.
    ///
    /// Returns `(key, generation)`; the mark may be stale.
    pub fn pop_due(&mut self, now: Instant) -> Option<(String, u64)> {
        match self.heap.peek() {
            Some(Reverse(mark)) if mark.expires_at <= now => {}
            _ => return None,
        }
        self.heap
            .pop()
            .map(|Reverse(mark)| (mark.key, mark.generation))
    }

    /// Earliest recorded deadline, live or stale.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(mark)| mark.expires_at)
    }

    /// Rebuilds the heap from the marks that are still live.
    pub fn retain(&mut self, mut is_live: impl FnMut(&str, u64) -> bool) {
        let marks = std::mem::take(&mut self.heap).into_vec();
        self.heap = marks
            .into_iter()
            .filter(|Reverse(mark)| is_live(&mark.key, mark.generation))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
