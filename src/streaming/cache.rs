use std::num::NonZeroUsize;
use std::sync::Arc;

use log::trace;
use lru::LruCache;

use crate::streaming::GroupResult;
use crate::util::weak_dashmap::WeakValueDashMap;

pub const DEFAULT_CACHE_CAPACITY: usize = 5000;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// entries owned by the LRU
    pub strong: usize,
    /// entries that are still alive anywhere, owned by the LRU or not
    pub weak_alive: usize,
    /// lookups answered by either layer
    pub hits: u64,
    pub misses: u64,
}

/// Recency ordered store of resolved groups.
///
/// The LRU owns at most `capacity` groups. Every group that went through the cache is also tracked weakly, so a group
/// that was evicted while a caller still holds it is found again (and promoted back) instead of being materialized a
/// second time. Not synchronized, the reader guards it with a mutex.
pub struct GroupCache {
    strong: LruCache<u32, Arc<GroupResult>>,
    weak: WeakValueDashMap<u32, GroupResult>,
    hits: u64,
    misses: u64,
}

impl GroupCache {
    /// A `capacity` of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            strong: LruCache::new(capacity),
            weak: WeakValueDashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.strong.cap().get()
    }

    pub fn get(&mut self, group_id: u32) -> Option<Arc<GroupResult>> {
        if let Some(result) = self.strong.get(&group_id) {
            self.hits += 1;
            return Some(result.clone());
        }

        let Some(revived) = self.weak.get(&group_id) else {
            self.misses += 1;
            return None;
        };
        self.hits += 1;
        trace!("Reviving evicted group {}", group_id);
        self.strong.put(group_id, revived.clone());
        Some(revived)
    }

    /// Only checks for presence, without touching the recency order.
    pub fn contains(&self, group_id: u32) -> bool {
        self.strong.contains(&group_id)
    }

    pub fn put(&mut self, group_id: u32, result: Arc<GroupResult>) {
        self.weak.insert(group_id, &result);
        if let Some((evicted, _)) = self.strong.push(group_id, result) {
            if evicted != group_id {
                trace!("Evicted group {}", evicted);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.strong.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strong.is_empty()
    }

    pub fn clear(&mut self) {
        self.strong.clear();
        self.weak.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            strong: self.strong.len(),
            weak_alive: self.weak.live_count(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

impl Default for GroupCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(group_id: u32) -> Arc<GroupResult> {
        Arc::new(GroupResult::new(group_id, Vec::new()))
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = GroupCache::new(2);
        cache.put(1, group(1));
        cache.put(2, group(2));
        // touching 1 makes 2 the eviction candidate
        assert!(cache.get(1).is_some());
        cache.put(3, group(3));

        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert!(cache.contains(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn revives_evicted_groups_that_are_still_held() {
        let mut cache = GroupCache::new(1);
        let held = group(1);
        cache.put(1, held.clone());
        cache.put(2, group(2));
        assert!(!cache.contains(1));

        let revived = cache.get(1).expect("group 1 is still held");
        assert!(Arc::ptr_eq(&revived, &held));
        // revival promoted 1 and pushed 2 out
        assert!(cache.contains(1));
        assert!(!cache.contains(2));
    }

    #[test]
    fn forgets_evicted_groups_nobody_holds() {
        let mut cache = GroupCache::new(1);
        cache.put(1, group(1));
        cache.put(2, group(2));

        assert!(cache.get(1).is_none());
        assert_eq!(
            cache.stats(),
            CacheStats {
                strong: 1,
                weak_alive: 1,
                hits: 0,
                misses: 1,
            }
        );
    }

    #[test]
    fn zero_capacity_keeps_one_entry() {
        let mut cache = GroupCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put(4, group(4));
        assert!(cache.get(4).is_some());
    }
}
