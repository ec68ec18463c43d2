//! LRU cache with per-entry TTL.
//!
//! Successful lookups live for an hour, errors for five minutes, so a
//! transient upstream failure is retried soon without hammering the API.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

pub const SUCCESS_TTL: Duration = Duration::from_secs(3600);
pub const ERROR_TTL: Duration = Duration::from_secs(300);

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

pub struct TtlCache<K: Hash + Eq, V: Clone> {
    inner: Mutex<LruCache<K, Entry<V>>>,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self { inner: Mutex::new(LruCache::new(capacity)) }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut cache = self.inner.lock().ok()?;
        match cache.get(key) {
            Some(entry) if entry.inserted_at.elapsed() <= entry.ttl => Some(entry.value.clone()),
            Some(_) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: K, value: V, ttl: Duration) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(key, Entry { value, inserted_at: Instant::now(), ttl });
        }
    }

    pub fn put_ok(&self, key: K, value: V) {
        self.put(key, value, SUCCESS_TTL);
    }

    pub fn put_err(&self, key: K, value: V) {
        self.put(key, value, ERROR_TTL);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_within_ttl() {
        let cache: TtlCache<String, u32> = TtlCache::new(4);
        cache.put_ok("a".into(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
    }

    #[test]
    fn expired_entry_is_evicted() {
        let cache: TtlCache<String, u32> = TtlCache::new(4);
        cache.put("a".into(), 1, Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn lru_evicts_oldest() {
        let cache: TtlCache<u32, u32> = TtlCache::new(2);
        cache.put_ok(1, 1);
        cache.put_ok(2, 2);
        cache.put_ok(3, 3);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&3), Some(3));
    }
}
