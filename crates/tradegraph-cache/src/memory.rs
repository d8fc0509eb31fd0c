use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

/// Hot cache of already-parsed payloads, so repeated tool calls within and
/// across runs skip both SQLite and JSON parsing.
pub struct HotCache {
    inner: Cache<String, Arc<serde_json::Value>>,
}

impl HotCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Arc<serde_json::Value>> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: String, value: Arc<serde_json::Value>) {
        self.inner.insert(key, value).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn shares_parsed_value() {
        let cache = HotCache::new(100, Duration::from_secs(60));
        let value = Arc::new(json!({"pe_ratio": 71.2}));
        cache.insert("fundamentals:NVDA".to_string(), value.clone()).await;

        let hit = cache.get("fundamentals:NVDA").await.unwrap();
        assert!(Arc::ptr_eq(&hit, &value));
        assert!(cache.get("fundamentals:AAPL").await.is_none());
    }

    #[tokio::test]
    async fn entries_expire() {
        let cache = HotCache::new(100, Duration::from_millis(50));
        cache
            .insert("news:NVDA".to_string(), Arc::new(json!([])))
            .await;
        assert!(cache.get("news:NVDA").await.is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.get("news:NVDA").await.is_none());
    }
}
