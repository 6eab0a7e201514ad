//! Bounded TTL cache for upstream reads keyed by CPF or ticket id (§4.6).

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;

struct Entry {
    value: Value,
    expires_at: DateTime<Utc>,
}

pub struct TtlCache {
    max_size: usize,
    default_ttl: chrono::Duration,
    rows: Mutex<IndexMap<String, Entry>>,
}

impl TtlCache {
    pub fn new(max_size: usize, default_ttl: chrono::Duration) -> Self {
        Self {
            max_size,
            default_ttl,
            rows: Mutex::new(IndexMap::new()),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: Value, now: DateTime<Utc>) {
        let mut rows = self.rows.lock();
        let key = key.into();
        if !rows.contains_key(&key) && rows.len() >= self.max_size {
            rows.shift_remove_index(0);
        }
        rows.insert(
            key,
            Entry {
                value,
                expires_at: now + self.default_ttl,
            },
        );
    }

    pub fn get_cached(&self, key: &str, now: DateTime<Utc>) -> Option<Value> {
        let rows = self.rows.lock();
        let entry = rows.get(key)?;
        if entry.expires_at <= now {
            None
        } else {
            Some(entry.value.clone())
        }
    }

    pub fn invalidate(&self, key: &str) {
        self.rows.lock().shift_remove(key);
    }

    /// Scans and removes expired entries, returning the count removed.
    pub fn clear_expired(&self, now: DateTime<Utc>) -> usize {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|_, entry| entry.expires_at > now);
        before - rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_on_expiry() {
        let cache = TtlCache::new(10, chrono::Duration::seconds(1));
        let now = Utc::now();
        cache.set("cpf:52998224725", serde_json::json!({"nome": "Alice"}), now);
        assert!(cache.get_cached("cpf:52998224725", now).is_some());
        assert!(cache.get_cached("cpf:52998224725", now + chrono::Duration::seconds(2)).is_none());
    }

    #[test]
    fn eviction_on_set_at_capacity() {
        let cache = TtlCache::new(2, chrono::Duration::seconds(60));
        let now = Utc::now();
        cache.set("a", serde_json::json!(1), now);
        cache.set("b", serde_json::json!(2), now);
        cache.set("c", serde_json::json!(3), now);
        assert!(cache.get_cached("a", now).is_none());
        assert!(cache.get_cached("c", now).is_some());
    }

    #[test]
    fn clear_expired_returns_removed_count() {
        let cache = TtlCache::new(10, chrono::Duration::seconds(1));
        let now = Utc::now();
        cache.set("a", serde_json::json!(1), now);
        cache.set("b", serde_json::json!(2), now);
        let removed = cache.clear_expired(now + chrono::Duration::seconds(2));
        assert_eq!(removed, 2);
    }
}
