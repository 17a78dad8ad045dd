//! O(1) LRU cache for store pages, with a dirty bit per page.
//!
//! Design:
//! - HashMap<page_id, Entry> stores page content and doubly-linked pointers (prev/next by page_id).
//! - head = MRU, tail = LRU.
//! - get()/get_mut() move the node to head.
//! - insert() adds a new head; if over capacity the tail is evicted and returned to the caller,
//!   who must write it back when it is dirty.
//!
//! Notes:
//! - No I/O and no metrics here (the store records hits/misses/evictions around these calls).
//! - Capacity=0 is not handled here; the store bypasses the cache entirely.

use std::collections::HashMap;

pub(crate) struct PageCache {
    cap: usize,
    map: HashMap<u64, Entry>,
    head: Option<u64>, // Most-recently used
    tail: Option<u64>, // Least-recently used
}

struct Entry {
    data: Vec<u8>,
    dirty: bool,
    prev: Option<u64>,
    next: Option<u64>,
}

/// Page pushed out of the cache by insert().
pub(crate) struct Evicted {
    pub page_id: u64,
    pub data: Vec<u8>,
    pub dirty: bool,
}

impl PageCache {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            map: HashMap::with_capacity(cap.max(1)),
            head: None,
            tail: None,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub(crate) fn contains(&self, page_id: u64) -> bool {
        self.map.contains_key(&page_id)
    }

    /// Page bytes if present; moves entry to MRU.
    pub(crate) fn get(&mut self, page_id: u64) -> Option<&[u8]> {
        if !self.map.contains_key(&page_id) {
            return None;
        }
        self.detach(page_id);
        self.attach_front(page_id);
        self.map.get(&page_id).map(|e| e.data.as_slice())
    }

    /// Mutable page bytes if present; moves entry to MRU and marks it dirty.
    pub(crate) fn get_mut(&mut self, page_id: u64) -> Option<&mut [u8]> {
        if !self.map.contains_key(&page_id) {
            return None;
        }
        self.detach(page_id);
        self.attach_front(page_id);
        self.map.get_mut(&page_id).map(|e| {
            e.dirty = true;
            e.data.as_mut_slice()
        })
    }

    /// Insert a page as MRU. Returns the LRU victim when capacity is exceeded.
    /// An existing entry with the same id is replaced (its dirty bit is OR-ed).
    pub(crate) fn insert(&mut self, page_id: u64, data: Vec<u8>, dirty: bool) -> Option<Evicted> {
        if let Some(e) = self.map.get_mut(&page_id) {
            e.data = data;
            e.dirty |= dirty;
            self.detach(page_id);
            self.attach_front(page_id);
            return None;
        }

        let mut victim = None;
        if self.map.len() >= self.cap {
            if let Some(v) = self.tail {
                self.detach(v);
                if let Some(e) = self.map.remove(&v) {
                    victim = Some(Evicted {
                        page_id: v,
                        data: e.data,
                        dirty: e.dirty,
                    });
                }
            }
        }

        self.map.insert(
            page_id,
            Entry {
                data,
                dirty,
                prev: None,
                next: None,
            },
        );
        self.attach_front(page_id);
        victim
    }

    /// Ids of dirty pages in ascending order (sequential write-back on flush).
    pub(crate) fn dirty_pages(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .map
            .iter()
            .filter(|(_, e)| e.dirty)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Page bytes without touching LRU order.
    pub(crate) fn peek(&self, page_id: u64) -> Option<&[u8]> {
        self.map.get(&page_id).map(|e| e.data.as_slice())
    }

    pub(crate) fn mark_clean(&mut self, page_id: u64) {
        if let Some(e) = self.map.get_mut(&page_id) {
            e.dirty = false;
        }
    }

    // ---------------- internal helpers ----------------

    fn detach(&mut self, page_id: u64) {
        let (prev, next) = match self.map.get(&page_id) {
            Some(e) => (e.prev, e.next),
            None => return,
        };

        if self.head == Some(page_id) {
            self.head = next;
        }
        if self.tail == Some(page_id) {
            self.tail = prev;
        }

        // Bridge neighbors.
        if let Some(p) = prev {
            if let Some(pe) = self.map.get_mut(&p) {
                pe.next = next;
            }
        }
        if let Some(n) = next {
            if let Some(ne) = self.map.get_mut(&n) {
                ne.prev = prev;
            }
        }

        if let Some(e) = self.map.get_mut(&page_id) {
            e.prev = None;
            e.next = None;
        }
    }

    fn attach_front(&mut self, page_id: u64) {
        if self.head == Some(page_id) {
            return;
        }

        if let Some(e) = self.map.get_mut(&page_id) {
            e.prev = None;
            e.next = self.head;
        }

        if let Some(old_head) = self.head {
            if let Some(he) = self.map.get_mut(&old_head) {
                he.prev = Some(page_id);
            }
        }

        self.head = Some(page_id);

        // if list was empty, tail also points to this node
        if self.tail.is_none() {
            self.tail = Some(page_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_lru_and_reports_dirty() {
        let mut c = PageCache::new(2);
        assert!(c.insert(1, vec![1; 4], false).is_none());
        assert!(c.insert(2, vec![2; 4], true).is_none());

        // touch 1 -> 2 becomes LRU
        assert_eq!(c.get(1), Some(&[1u8, 1, 1, 1][..]));

        let ev = c.insert(3, vec![3; 4], false).expect("must evict");
        assert_eq!(ev.page_id, 2);
        assert!(ev.dirty);
        assert_eq!(ev.data, vec![2; 4]);
        assert_eq!(c.len(), 2);
        assert!(c.contains(1) && c.contains(3));
    }

    #[test]
    fn get_mut_marks_dirty_and_flush_list_is_sorted() {
        let mut c = PageCache::new(8);
        for id in [5u64, 3, 9] {
            c.insert(id, vec![0; 2], false);
        }
        assert!(c.dirty_pages().is_empty());

        c.get_mut(9).unwrap()[0] = 7;
        c.get_mut(3).unwrap()[1] = 1;
        assert_eq!(c.dirty_pages(), vec![3, 9]);
        assert_eq!(c.peek(9), Some(&[7u8, 0][..]));

        c.mark_clean(3);
        assert_eq!(c.dirty_pages(), vec![9]);
    }

    #[test]
    fn reinsert_keeps_dirty_bit() {
        let mut c = PageCache::new(1);
        c.insert(1, vec![0], true);
        assert!(c.insert(1, vec![1], false).is_none());
        assert_eq!(c.dirty_pages(), vec![1]);
    }
}
