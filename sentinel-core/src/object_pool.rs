//! Bounded free-list of reusable event records.
//!
//! Grounded in the teacher's buffer-pool texture (pin/unpin-style
//! counters under `parking_lot::Mutex`): a fixed-size free-list that
//! falls back to fresh allocation once exhausted.

use parking_lot::Mutex;
use sentinel_model::Event;

pub struct ObjectPool {
    free_list: Mutex<Vec<Event>>,
    capacity: usize,
}

impl ObjectPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free_list: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Take a record from the free-list, or allocate fresh if empty.
    pub fn alloc(&self) -> Event {
        self.free_list
            .lock()
            .pop()
            .unwrap_or_else(Event::empty)
    }

    /// Zero the record and return it to the free-list; if the list is
    /// already at capacity the record is simply dropped.
    pub fn free(&self, mut record: Event) {
        record.clear();
        let mut guard = self.free_list.lock();
        if guard.len() < self.capacity {
            guard.push(record);
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records currently in flight (not sitting in the free-list).
    pub fn usage(&self) -> usize {
        self.capacity.saturating_sub(self.free_list.lock().len())
    }
}

impl std::fmt::Debug for ObjectPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("capacity", &self.capacity)
            .field("usage", &self.usage())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_reuses_freed_records() {
        let pool = ObjectPool::new(2);
        let a = pool.alloc();
        pool.free(a);
        assert_eq!(pool.usage(), 0);
        let _b = pool.alloc();
        assert_eq!(pool.usage(), 1);
    }

    #[test]
    fn exhaustion_falls_back_to_fresh_allocation() {
        let pool = ObjectPool::new(1);
        let a = pool.alloc();
        let b = pool.alloc(); // free list empty, fresh record
        assert_eq!(pool.usage(), 2);
        pool.free(a);
        pool.free(b);
        // capacity 1: only one of the two freed records is retained
        assert_eq!(pool.usage(), 0);
    }
}
