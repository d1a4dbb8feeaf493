//! Fixed-capacity FIFO ring used for every capped history.
//!
//! Timestamp histories, logger errors, restarts, log-loss events and the
//! icebox itself all share the same discipline: inserting into a full ring
//! evicts the oldest entry first. Nothing is ever surfaced as an error.
//!
//! # Design
//!
//! - Backed by a `VecDeque` that grows on demand up to `capacity`; an unused
//!   ring costs nothing regardless of its configured capacity
//! - Iteration is oldest-first, matching the order entries are reported in
//! - A capacity of zero is legal and retains nothing

use std::collections::VecDeque;

/// A FIFO list with a fixed capacity that drops its oldest element on overflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Creates an empty ring holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Appends `value`, evicting and returning the oldest entry if the ring is full.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use guardrail::ring::RingBuffer;
    ///
    /// let mut ring = RingBuffer::new(2);
    /// assert_eq!(ring.push(1), None);
    /// assert_eq!(ring.push(2), None);
    /// assert_eq!(ring.push(3), Some(1));
    /// assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
    /// ```
    pub fn push(&mut self, value: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(value);
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(value);
        evicted
    }

    /// Iterates entries oldest-first.
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, T> {
        self.entries.iter()
    }

    /// Drops every entry, keeping the capacity.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ring holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<'a, T> IntoIterator for &'a RingBuffer<T> {
    type Item = &'a T;
    type IntoIter = std::collections::vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
