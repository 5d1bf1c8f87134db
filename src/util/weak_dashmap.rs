use std::hash::Hash;
use std::sync::{Arc, Weak};

use dashmap::DashMap;

/// A concurrent hash map that only holds [`Weak`] references to its values. An entry stays retrievable as long as
/// somebody else keeps the value's [`Arc`] alive, which makes it a side table for values that are owned elsewhere,
/// e.g. cache entries that were evicted but are still in use. Compare it to
/// https://docs.rs/weak-table/latest/weak_table/, but based on DashMap to allow for interior mutability. Expired
/// entries are pruned lazily when inserting.
pub struct WeakValueDashMap<K: Eq + Hash, V> {
    inner: DashMap<K, Weak<V>>,
}

impl<K: Eq + Hash, V> WeakValueDashMap<K, V> {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: DashMap::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn insert(&self, key: K, value: &Arc<V>) {
        self.try_prune();
        self.inner.insert(key, Arc::downgrade(value));
    }

    /// The value for `key`, if it is still alive. Expired entries are removed on the way.
    #[inline]
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let upgraded = self.inner.get(key)?.upgrade();
        if upgraded.is_none() {
            self.inner.remove_if(key, |_, weak| weak.strong_count() == 0);
        }
        upgraded
    }

    /// Number of entries, including expired ones that have not been pruned yet.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.inner.iter().filter(|entry| entry.strong_count() > 0).count()
    }

    #[inline]
    fn try_prune(&self) {
        // Would have to allocate after the next insert.
        if self.inner.capacity() == self.inner.len() {
            self.prune();
        }
    }

    pub fn prune(&self) {
        self.inner.retain(|_, weak| weak.strong_count() > 0);
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}

impl<K: Eq + Hash, V> Default for WeakValueDashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_live_as_long_as_their_owners() {
        let map = WeakValueDashMap::new();
        let kept = Arc::new("kept");
        let dropped = Arc::new("dropped");
        map.insert(1u32, &kept);
        map.insert(2u32, &dropped);
        drop(dropped);

        assert_eq!(map.get(&1).as_deref(), Some(&"kept"));
        assert_eq!(map.live_count(), 1);
        assert!(map.get(&2).is_none());
        // the expired entry was removed by the lookup
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn prune_drops_expired_entries() {
        let map = WeakValueDashMap::with_capacity(4);
        for key in 0u32..16 {
            map.insert(key, &Arc::new(key));
        }
        map.prune();
        assert!(map.is_empty());
    }
}
