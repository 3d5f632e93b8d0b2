//! In-process memory tier: one bounded FIFO queue of items per key.
//!
//! Overflow silently drops the oldest item, so a queue never grows past
//! its capacity. Pops consume the oldest item.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tracing::debug;

use crate::cache::item::{Item, Key};
use crate::cache::lock::mutex_lock;

/// Per-key bounded FIFO buffers, safe to share between the foreground
/// consumer and prefetch workers.
#[derive(Debug)]
pub struct MemoryTier {
    queues: Mutex<HashMap<Key, VecDeque<Item>>>,
    capacity: usize,
}

impl MemoryTier {
    /// Create an empty tier holding at most `capacity` items per key.
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Maximum items per key.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an item, evicting the oldest one if the queue is full.
    ///
    /// Returns the evicted item, if any.
    pub fn push(&self, key: &Key, item: Item) -> Option<Item> {
        let mut queues = mutex_lock(&self.queues, "memory");
        let queue = queues
            .entry(key.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));

        let evicted = if queue.len() >= self.capacity {
            queue.pop_front()
        } else {
            None
        };
        queue.push_back(item);
        debug_assert!(queue.len() <= self.capacity);

        if evicted.is_some() {
            debug!(key = %key, capacity = self.capacity, "Memory tier full, dropped oldest item");
        }
        evicted
    }

    /// Remove and return the oldest item for `key`.
    pub fn pop(&self, key: &Key) -> Option<Item> {
        let mut queues = mutex_lock(&self.queues, "memory");
        queues.get_mut(key).and_then(VecDeque::pop_front)
    }

    /// Pop the oldest item together with the count left behind, atomically.
    pub fn pop_with_remaining(&self, key: &Key) -> Option<(Item, usize)> {
        let mut queues = mutex_lock(&self.queues, "memory");
        let queue = queues.get_mut(key)?;
        let item = queue.pop_front()?;
        Some((item, queue.len()))
    }

    /// Number of items queued for `key`.
    pub fn len(&self, key: &Key) -> usize {
        let queues = mutex_lock(&self.queues, "memory");
        queues.get(key).map(VecDeque::len).unwrap_or(0)
    }

    /// Whether no items are queued for `key`.
    pub fn is_empty(&self, key: &Key) -> bool {
        self.len(key) == 0
    }

    /// Item counts for every key currently known to the tier.
    pub fn counts(&self) -> HashMap<Key, usize> {
        let queues = mutex_lock(&self.queues, "memory");
        queues.iter().map(|(k, q)| (k.clone(), q.len())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::item::Category;

    fn item(n: usize) -> Item {
        Item::new(
            format!("question {n}"),
            vec!["yes".into(), "no".into()],
            "yes",
            "",
            Category::P,
            3,
        )
        .unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let tier = MemoryTier::new(10);
        let key = Key::new(Category::P, 3);
        for n in 0..3 {
            tier.push(&key, item(n));
        }

        assert_eq!(tier.pop(&key).unwrap().prompt(), "question 0");
        assert_eq!(tier.pop(&key).unwrap().prompt(), "question 1");
        assert_eq!(tier.pop(&key).unwrap().prompt(), "question 2");
        assert!(tier.pop(&key).is_none());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let tier = MemoryTier::new(3);
        let key = Key::new(Category::P, 3);
        for n in 0..5 {
            let evicted = tier.push(&key, item(n));
            assert_eq!(evicted.is_some(), n >= 3);
        }

        assert_eq!(tier.len(&key), 3);
        assert_eq!(tier.pop(&key).unwrap().prompt(), "question 2");
    }

    #[test]
    fn test_keys_are_independent() {
        let tier = MemoryTier::new(5);
        let p = Key::new(Category::P, 3);
        let np = Key::new(Category::Np, 3);
        tier.push(&p, item(0));

        assert_eq!(tier.len(&p), 1);
        assert!(tier.is_empty(&np));
        assert!(tier.pop(&np).is_none());
    }

    #[test]
    fn test_pop_with_remaining() {
        let tier = MemoryTier::new(5);
        let key = Key::new(Category::P, 3);
        tier.push(&key, item(0));
        tier.push(&key, item(1));

        let (_, remaining) = tier.pop_with_remaining(&key).unwrap();
        assert_eq!(remaining, 1);
    }
}
