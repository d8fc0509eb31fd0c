use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::error::CacheError;
use crate::memory::HotCache;
use crate::sqlite::SqliteCache;

/// Read-through cache: moka (parsed, hot) → SQLite → None.
///
/// SQLite hits are parsed once and promoted to the hot cache. `rusqlite::Connection`
/// is not `Sync`, so SQLite access goes through a `Mutex`.
pub struct CacheReader {
    hot: HotCache,
    sqlite: Mutex<SqliteCache>,
}

impl CacheReader {
    pub fn new(sqlite: SqliteCache, max_capacity: u64, hot_ttl: Duration) -> Self {
        Self {
            hot: HotCache::new(max_capacity, hot_ttl),
            sqlite: Mutex::new(sqlite),
        }
    }

    fn with_sqlite<T>(
        &self,
        f: impl FnOnce(&SqliteCache) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let sqlite = self
            .sqlite
            .lock()
            .map_err(|e| CacheError::Unavailable(format!("SQLite mutex poisoned: {e}")))?;
        f(&sqlite)
    }

    /// Parsed payload stored under `key`, if any.
    pub async fn get(&self, key: &str) -> Result<Option<Arc<serde_json::Value>>, CacheError> {
        if let Some(value) = self.hot.get(key).await {
            debug!(key, "hot cache hit");
            return Ok(Some(value));
        }

        let Some(row) = self.with_sqlite(|s| s.get(key))? else {
            return Ok(None);
        };

        let value = Arc::new(serde_json::from_str::<serde_json::Value>(&row.value_json)?);
        self.hot.insert(key.to_string(), value.clone()).await;
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tradegraph_models::cache_schema::CacheCategory;

    fn setup_reader() -> CacheReader {
        let sqlite = SqliteCache::open_in_memory().unwrap();
        sqlite
            .put(
                "fundamentals:NVDA",
                CacheCategory::Fundamentals,
                "NVDA",
                "finnhub",
                &json!({"peTTM": 71.2, "roeTTM": 91.5}),
            )
            .unwrap();
        sqlite
            .put(
                "news:NVDA",
                CacheCategory::News,
                "NVDA",
                "finnhub",
                &json!([{"date": "2024-05-08", "headline": "New GPU launch"}]),
            )
            .unwrap();
        CacheReader::new(sqlite, 100, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn read_through_sqlite_to_hot_cache() {
        let reader = setup_reader();

        let first = reader.get("fundamentals:NVDA").await.unwrap().unwrap();
        assert_eq!(first["peTTM"], json!(71.2));

        let second = reader.get("fundamentals:NVDA").await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(reader.hot.get("fundamentals:NVDA").await.is_some());
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let reader = setup_reader();
        assert!(reader.get("bars:NVDA:1d").await.unwrap().is_none());
    }
}
