// SPDX-License-Identifier: Apache-2.0
//! Last-known-good fallback cache.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Slot<V> {
    value: V,
    stored_at: Instant,
    touched_seq: u64,
}

struct Inner<K, V> {
    slots: HashMap<K, Slot<V>>,
    seq: u64,
}

/// A named, bounded cache of last-known-good values.
///
/// The cache is read-mostly: reads refresh recency under the same lock,
/// writes evict the least-recently-used entry when full, and every entry
/// expires `ttl` after it was stored (a fallback value older than the TTL
/// is worse than an honest failure). One mutex per cache; contention is
/// negligible because writes only happen on backend recovery paths.
///
/// Teardown is explicit: [`clear`](Self::clear) drops every entry.
pub struct FallbackCache<K, V> {
    name: &'static str,
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> FallbackCache<K, V> {
    /// Create a cache holding at most `capacity` entries for `ttl` each.
    #[must_use]
    pub fn new(name: &'static str, capacity: usize, ttl: Duration) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            ttl,
            inner: Mutex::new(Inner { slots: HashMap::new(), seq: 0 }),
        }
    }

    /// The cache name, for logs and metrics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fetch a live entry, refreshing its recency. Expired entries are
    /// removed on the way out and reported as a miss.
    pub fn get(&self, key: &K, now: Instant) -> Option<V> {
        let mut inner = self.inner.lock().ok()?;
        let expired = inner
            .slots
            .get(key)
            .is_some_and(|slot| now.duration_since(slot.stored_at) >= self.ttl);
        if expired {
            inner.slots.remove(key);
            return None;
        }
        inner.seq += 1;
        let seq = inner.seq;
        let slot = inner.slots.get_mut(key)?;
        slot.touched_seq = seq;
        Some(slot.value.clone())
    }

    /// Store a value, evicting the least-recently-used entry when full.
    pub fn put(&self, key: K, value: V, now: Instant) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.seq += 1;
        let seq = inner.seq;
        if !inner.slots.contains_key(&key) && inner.slots.len() >= self.capacity {
            if let Some(oldest) = inner
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.touched_seq)
                .map(|(k, _)| k.clone())
            {
                inner.slots.remove(&oldest);
            }
        }
        inner
            .slots
            .insert(key, Slot { value, stored_at: now, touched_seq: seq });
    }

    /// Drop entries stored longer than the TTL ago. Idempotent.
    pub fn purge_expired(&self, now: Instant) {
        if let Ok(mut inner) = self.inner.lock() {
            let ttl = self.ttl;
            inner
                .slots
                .retain(|_, slot| now.duration_since(slot.stored_at) < ttl);
        }
    }

    /// Number of entries currently held (including not-yet-purged expired ones).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map_or(0, |inner| inner.slots.len())
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Explicit teardown: drop every entry.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.slots.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize, ttl_ms: u64) -> FallbackCache<String, String> {
        FallbackCache::new("test", capacity, Duration::from_millis(ttl_ms))
    }

    #[test]
    fn entries_expire_after_ttl() {
        let c = cache(4, 100);
        let t0 = Instant::now();
        c.put("k".into(), "v".into(), t0);
        assert_eq!(c.get(&"k".into(), t0 + Duration::from_millis(99)), Some("v".into()));
        assert_eq!(c.get(&"k".into(), t0 + Duration::from_millis(100)), None);
    }

    #[test]
    fn lru_eviction_prefers_untouched_entries() {
        let c = cache(2, 10_000);
        let t0 = Instant::now();
        c.put("a".into(), "1".into(), t0);
        c.put("b".into(), "2".into(), t0);
        // Touch "a" so "b" becomes the eviction candidate.
        assert!(c.get(&"a".into(), t0).is_some());
        c.put("c".into(), "3".into(), t0);
        assert!(c.get(&"a".into(), t0).is_some());
        assert!(c.get(&"b".into(), t0).is_none());
        assert!(c.get(&"c".into(), t0).is_some());
    }

    #[test]
    fn overwrite_does_not_evict() {
        let c = cache(2, 10_000);
        let t0 = Instant::now();
        c.put("a".into(), "1".into(), t0);
        c.put("b".into(), "2".into(), t0);
        c.put("a".into(), "1b".into(), t0);
        assert_eq!(c.len(), 2);
        assert_eq!(c.get(&"a".into(), t0), Some("1b".into()));
    }

    #[test]
    fn purge_and_clear() {
        let c = cache(4, 100);
        let t0 = Instant::now();
        c.put("a".into(), "1".into(), t0);
        c.put("b".into(), "2".into(), t0 + Duration::from_millis(50));
        c.purge_expired(t0 + Duration::from_millis(120));
        assert_eq!(c.len(), 1);
        c.clear();
        assert!(c.is_empty());
    }
}
