use std::collections::HashMap;
use std::hash::Hash;

pub const DEFAULT_CAPACITY: usize = 10;

struct Slot<V> {
    value: V,
    last_used: u64,
}

/// Bounded key/value store with least-recently-used eviction.
///
/// Both `get` and `set` count as a use. There is no time-based expiry.
/// The cache has no internal lock; it lives inside the store and is
/// serialized by the store's owner.
pub struct LruCache<K, V> {
    capacity: usize,
    clock: u64,
    slots: HashMap<K, Slot<V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            clock: 0,
            slots: HashMap::with_capacity(capacity),
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = self.tick();
        let slot = self.slots.get_mut(key)?;
        slot.last_used = now;
        Some(slot.value.clone())
    }

    pub fn set(&mut self, key: K, value: V) {
        let now = self.tick();
        if let Some(slot) = self.slots.get_mut(&key) {
            slot.value = value;
            slot.last_used = now;
            return;
        }

        if self.slots.len() >= self.capacity {
            self.evict_least_recent();
        }
        self.slots.insert(key, Slot { value, last_used: now });
    }

    pub fn delete(&mut self, key: &K) -> Option<V> {
        self.slots.remove(key).map(|slot| slot.value)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    fn evict_least_recent(&mut self) {
        // Linear scan; capacities here are in the tens
        let oldest = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.slots.remove(&key);
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for LruCache<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_after_set() {
        let mut cache = LruCache::new(2);
        cache.set("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"missing"), None);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = LruCache::new(3);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);

        // Touch "a" so "b" becomes the oldest
        cache.get(&"a");
        cache.set("d", 4);

        assert_eq!(cache.size(), 3);
        assert!(!cache.contains(&"b"));
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"d"), Some(4));
    }

    #[test]
    fn test_capacity_plus_one_drops_first_key() {
        let mut cache = LruCache::default();
        for i in 0..=DEFAULT_CAPACITY {
            cache.set(i, i * 10);
        }
        assert_eq!(cache.size(), DEFAULT_CAPACITY);
        assert_eq!(cache.get(&0), None);
        assert_eq!(cache.get(&DEFAULT_CAPACITY), Some(DEFAULT_CAPACITY * 10));
    }

    #[test]
    fn test_set_existing_key_refreshes_without_eviction() {
        let mut cache = LruCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("a", 10);
        cache.set("c", 3);

        assert_eq!(cache.get(&"a"), Some(10));
        assert!(!cache.contains(&"b"));
    }

    #[test]
    fn test_delete_and_clear() {
        let mut cache = LruCache::new(4);
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.delete(&"a"), Some(1));
        assert_eq!(cache.size(), 1);
        cache.clear();
        assert_eq!(cache.size(), 0);
        assert_eq!(LruCache::<u8, u8>::new(0).capacity(), 1);
    }
}
