use std::collections::HashMap;
use std::sync::Arc;

use chrono::{ DateTime, Duration, Utc };
use serde_json::Value;
use tokio::sync::Mutex;

#[derive(Clone, Debug)]
struct CacheEntry {
    value: Value,
    expires_at: DateTime<Utc>,
}

/// Process-local TTL cache. Expiry is the only eviction: no size bound, no
/// LRU. Stale entries are purged lazily by the read that finds them.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: &str, value: Value, ttl_secs: i64) {
        let entry = CacheEntry {
            value,
            expires_at: Utc::now() + Duration::seconds(ttl_secs),
        };
        self.entries.lock().await.insert(key.to_string(), entry);
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if Utc::now() > entry.expires_at => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn get_before_expiry_returns_value() {
        let cache = MemoryCache::new();
        cache.set("k", json!({"n": 1}), 60).await;
        assert_eq!(cache.get("k").await, Some(json!({"n": 1})));
    }

    #[tokio::test]
    async fn get_after_expiry_is_absent_and_purges() {
        let cache = MemoryCache::new();
        cache.set("k", json!("v"), -1).await;
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn set_overwrites_existing_entry() {
        let cache = MemoryCache::new();
        cache.set("k", json!(1), 60).await;
        cache.set("k", json!(2), 60).await;
        assert_eq!(cache.get("k").await, Some(json!(2)));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_key_is_absent() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("missing").await, None);
    }
}
