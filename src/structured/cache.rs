//! Content-addressed parse result cache.
//!
//! Keys are SHA-256 digests of the dialect tag and statement text. Entries are
//! bounded by capacity (oldest insertion evicted first) and by a time-to-live
//! checked lazily on lookup. The clock is injectable so expiry can be tested
//! without sleeping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::parser::DialectOptions;

/// Time source for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

/// Cache key for a statement under a dialect.
pub fn cache_key(text: &str, dialect: DialectOptions) -> String {
    let mut hasher = Sha256::new();
    hasher.update(dialect.tag().as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

struct Entry<V> {
    value: V,
    inserted: Instant,
}

/// Capacity- and TTL-bounded map with FIFO eviction.
pub struct TtlCache<V> {
    entries: IndexMap<String, Entry<V>>,
    capacity: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_clock(capacity, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity.min(1024)),
            capacity,
            ttl,
            clock,
        }
    }

    /// Look up `key`; an expired entry is removed and reported absent.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let expired = {
            let entry = self.entries.get(key)?;
            self.clock.now().saturating_duration_since(entry.inserted) > self.ttl
        };
        if expired {
            self.entries.shift_remove(key);
            return None;
        }
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Insert or refresh `key`, evicting the oldest insertions beyond capacity.
    pub fn insert(&mut self, key: String, value: V) {
        if self.capacity == 0 {
            return;
        }
        // Re-insertion counts as a new insertion for eviction order
        self.entries.shift_remove(&key);
        self.entries.insert(
            key,
            Entry {
                value,
                inserted: self.clock.now(),
            },
        );
        while self.entries.len() > self.capacity {
            self.entries.shift_remove_index(0);
        }
    }

    pub fn contains(&mut self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize, ttl: Duration) -> (TtlCache<Option<u32>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (TtlCache::with_clock(capacity, ttl, clock.clone()), clock)
    }

    #[test]
    fn test_oldest_insertion_is_evicted() {
        let (mut cache, _) = cache(2, Duration::from_secs(60));
        cache.insert("a".into(), Some(1));
        cache.insert("b".into(), Some(2));
        cache.insert("c".into(), Some(3));
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn test_lookup_does_not_refresh_order() {
        let (mut cache, _) = cache(2, Duration::from_secs(60));
        cache.insert("a".into(), Some(1));
        cache.insert("b".into(), Some(2));
        assert_eq!(cache.get("a"), Some(Some(1)));
        cache.insert("c".into(), Some(3));
        assert!(!cache.contains("a"));
    }

    #[test]
    fn test_expired_entry_is_evicted_on_lookup() {
        let (mut cache, clock) = cache(4, Duration::from_secs(10));
        cache.insert("a".into(), Some(1));
        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.get("a"), Some(Some(1)));
        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cached_null_is_a_hit() {
        let (mut cache, _) = cache(2, Duration::from_secs(60));
        cache.insert("bad".into(), None);
        assert_eq!(cache.get("bad"), Some(None));
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let (mut cache, _) = cache(0, Duration::from_secs(60));
        cache.insert("a".into(), Some(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_key_depends_on_dialect_and_text() {
        let a = cache_key("SELECT 1", DialectOptions::TSql);
        assert_eq!(a.len(), 64);
        assert_eq!(a, cache_key("SELECT 1", DialectOptions::TSql));
        assert_ne!(a, cache_key("SELECT 1", DialectOptions::Generic));
        assert_ne!(a, cache_key("SELECT 2", DialectOptions::TSql));
    }
}
