//! A fixed-capacity min-heap of `(priority, key, value)` entries paired
//! with a key -> heap-index map for O(1) lookup and O(log n) priority
//! fix-up. See spec section 4.2.

use std::collections::HashMap;
use std::hash::Hash;

use crate::cache_policy::CachePolicy;
use crate::errors::DatabaseError;

pub struct PriorityQueue<K: Eq + Hash + Clone, V> {
    capacity: usize,
    heap: Vec<(K, (i64, V))>,
    positions: HashMap<K, usize>,
    policy: CachePolicy,
}

impl<K: Eq + Hash + Clone, V> PriorityQueue<K, V> {
    pub fn new(capacity: usize, policy: CachePolicy) -> Result<Self, DatabaseError> {
        if capacity == 0 {
            return Err(DatabaseError::PriorityQueueCapacityOutOfBounds(0));
        }
        Ok(PriorityQueue {
            capacity,
            heap: Vec::with_capacity(capacity),
            positions: HashMap::new(),
            policy,
        })
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.positions.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.positions.clear();
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        self.positions.insert(self.heap[i].0.clone(), i);
        self.positions.insert(self.heap[j].0.clone(), j);
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[parent].1 .0 <= self.heap[i].1 .0 {
                break;
            }
            self.swap(parent, i);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut smallest = i;
            if left < len && self.heap[left].1 .0 < self.heap[smallest].1 .0 {
                smallest = left;
            }
            if right < len && self.heap[right].1 .0 < self.heap[smallest].1 .0 {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.swap(i, smallest);
            i = smallest;
        }
    }

    /// Restore the heap property around `i` after its priority changed to
    /// an arbitrary value (could have moved either up or down).
    fn reheap(&mut self, i: usize) {
        if i > 0 && self.heap[(i - 1) / 2].1 .0 > self.heap[i].1 .0 {
            self.sift_up(i);
        } else {
            self.sift_down(i);
        }
    }

    /// Bottom-up O(n) rebuild, used after a policy decays every entry's
    /// priority in one pass (the leaky-bucket family).
    fn heapify(&mut self) {
        let len = self.heap.len();
        for i in (0..len / 2).rev() {
            self.sift_down(i);
        }
    }

    /// Push `(key, value)` at `priority`. If `key` is already present, the
    /// policy's `update_priority` is applied to its current priority
    /// instead of inserting a new entry. The policy's `on_push` hook runs
    /// on every call regardless of key presence. When at capacity and
    /// inserting a brand new key, the lowest-priority entry (the heap root)
    /// is evicted and returned as `(key, priority, value)`.
    pub fn push(&mut self, key: K, value: V, priority: i64) -> Option<(K, i64, V)> {
        let snapshot: Vec<(i64, i64)> = self.heap.iter().enumerate().map(|(i, (_, (p, _)))| (i as i64, *p)).collect();
        let adjustments = self.policy.on_push_adjustments(&snapshot);
        if !adjustments.is_empty() {
            for (idx, new_priority) in adjustments {
                if let Some((_, (p, _))) = self.heap.get_mut(idx as usize) {
                    *p = new_priority;
                }
            }
            self.heapify();
        }

        if let Some(&i) = self.positions.get(&key) {
            let new_priority = self.policy.update_priority(self.heap[i].1 .0);
            self.heap[i].1 .0 = new_priority;
            self.reheap(i);
            return None;
        }

        if self.heap.len() < self.capacity {
            let i = self.heap.len();
            self.positions.insert(key.clone(), i);
            self.heap.push((key, (priority, value)));
            self.sift_up(i);
            return None;
        }

        // At capacity: the heap root is the lowest-priority entry.
        let (evict_key, (evict_priority, evict_value)) = std::mem::replace(&mut self.heap[0], (key.clone(), (priority, value)));
        self.positions.remove(&evict_key);
        self.positions.insert(key, 0);
        self.sift_down(0);
        Some((evict_key, evict_priority, evict_value))
    }

    /// Remove and return the lowest-priority entry.
    pub fn pop(&mut self) -> Option<(K, i64, V)> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.swap(0, last);
        let (key, (priority, value)) = self.heap.pop().unwrap();
        self.positions.remove(&key);
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some((key, priority, value))
    }

    pub fn remove(&mut self, key: &K) -> Option<(i64, V)> {
        let i = *self.positions.get(key)?;
        let last = self.heap.len() - 1;
        self.swap(i, last);
        let (removed_key, (priority, value)) = self.heap.pop().unwrap();
        self.positions.remove(&removed_key);
        if i < self.heap.len() {
            self.reheap(i);
        }
        Some((priority, value))
    }

    pub fn get(&self, key: &K) -> Option<&(i64, V)> {
        let i = *self.positions.get(key)?;
        Some(&self.heap[i].1)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut (i64, V)> {
        let i = *self.positions.get(key)?;
        Some(&mut self.heap[i].1)
    }

    pub fn set_priority(&mut self, key: &K, priority: i64) -> bool {
        if let Some(&i) = self.positions.get(key) {
            self.heap[i].1 .0 = priority;
            self.reheap(i);
            true
        } else {
            false
        }
    }

    /// Enumerate `(key, priority)` pairs. `ordered=true` sorts by ascending
    /// priority (cheapest-to-evict first); otherwise heap-array order.
    pub fn items(&self, ordered: bool) -> Vec<(K, i64)> {
        let mut out: Vec<(K, i64)> = self.heap.iter().map(|(k, (p, _))| (k.clone(), *p)).collect();
        if ordered {
            out.sort_by_key(|(_, p)| *p);
        }
        out
    }
}
