//! Recency list over buffer slot indices.
//!
//! Stands in for the sentinel-headed doubly linked list threaded through
//! the buffers themselves: links are arena indices, and the sentinel is the
//! extra index `capacity`.

use crate::common::BufId;

/// A doubly linked recency list.
///
/// The front is the most recently released buffer; the back is the first
/// candidate for recycling. Lookups scan from the front, the recycle scan
/// from the back.
pub struct MruList {
    next: Vec<usize>,
    prev: Vec<usize>,
}

impl MruList {
    /// Build a list holding every slot `0..capacity`.
    ///
    /// Slots are pushed to the front in index order, so slot `capacity - 1`
    /// starts most recently used and slot 0 is the first recycle candidate.
    pub fn new(capacity: usize) -> Self {
        let head = capacity;
        let mut list = Self {
            next: vec![head; capacity + 1],
            prev: vec![head; capacity + 1],
        };
        for i in 0..capacity {
            list.link_front(i);
        }
        list
    }

    #[inline]
    fn head(&self) -> usize {
        self.next.len() - 1
    }

    fn link_front(&mut self, i: usize) {
        let head = self.head();
        let first = self.next[head];
        self.next[i] = first;
        self.prev[i] = head;
        self.prev[first] = i;
        self.next[head] = i;
    }

    fn unlink(&mut self, i: usize) {
        let (prev, next) = (self.prev[i], self.next[i]);
        self.next[prev] = next;
        self.prev[next] = prev;
    }

    /// Move a slot to the most-recently-used end.
    pub fn move_to_front(&mut self, id: BufId) {
        debug_assert!(id.0 < self.head(), "buffer index out of range");
        self.unlink(id.0);
        self.link_front(id.0);
    }

    /// Slots from most to least recently used.
    pub fn iter_mru(&self) -> impl Iterator<Item = BufId> + '_ {
        let head = self.head();
        let mut cur = self.next[head];
        std::iter::from_fn(move || {
            if cur == head {
                return None;
            }
            let id = BufId::new(cur);
            cur = self.next[cur];
            Some(id)
        })
    }

    /// Slots from least to most recently used.
    pub fn iter_lru(&self) -> impl Iterator<Item = BufId> + '_ {
        let head = self.head();
        let mut cur = self.prev[head];
        std::iter::from_fn(move || {
            if cur == head {
                return None;
            }
            let id = BufId::new(cur);
            cur = self.prev[cur];
            Some(id)
        })
    }

    /// Number of slots in the list.
    pub fn len(&self) -> usize {
        self.head()
    }

    /// Whether the list has no slots.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
