use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use tradegraph_cache::{CacheError, CacheReader};
use tradegraph_models::cache_schema::key_patterns;
use tradegraph_models::dates::{parse_date, DEFAULT_DATE_FORMAT};

use super::{DataCollaborators, DataPayload, DateRange};
use crate::error::DataError;

const SOURCE: &str = "offline cache";

/// Serves data-source payloads previously stored in the SQLite cache.
///
/// Series payloads are JSON arrays of objects with a `date` field; rows
/// outside the requested window (or without a parseable date) are dropped.
pub struct CachedDataSource {
    cache: Arc<CacheReader>,
}

fn row_date(row: &Value) -> Option<NaiveDate> {
    row.get("date")
        .and_then(Value::as_str)
        .and_then(|d| parse_date(d.get(..10).unwrap_or(d), DEFAULT_DATE_FORMAT).ok())
}

impl CachedDataSource {
    pub fn new(cache: Arc<CacheReader>) -> Self {
        Self { cache }
    }

    async fn load(&self, key: &str) -> Result<Option<Arc<Value>>, DataError> {
        self.cache.get(key).await.map_err(|e| match e {
            // a bad row is bad data, not a dead source
            CacheError::Json(_) => DataError::Malformed {
                source_name: SOURCE.to_string(),
                message: format!("{key}: {e}"),
            },
            _ => DataError::Unreachable {
                source_name: SOURCE.to_string(),
                message: e.to_string(),
            },
        })
    }

    async fn series(&self, key: &str, range: DateRange) -> Result<DataPayload, DataError> {
        let Some(value) = self.load(key).await? else {
            return Ok(DataPayload::Empty);
        };
        let rows = value.as_array().ok_or_else(|| DataError::Malformed {
            source_name: SOURCE.to_string(),
            message: format!("{key} is not a list of rows"),
        })?;

        Ok(DataPayload::rows(
            rows.iter()
                .filter(|row| row_date(row).is_some_and(|d| range.contains(d)))
                .cloned()
                .collect(),
        ))
    }
}

#[async_trait]
impl DataCollaborators for CachedDataSource {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn fetch_market_data(&self, ticker: &str, range: DateRange) -> Result<DataPayload, DataError> {
        self.series(&key_patterns::bars(ticker, "1d"), range).await
    }

    /// Either a single snapshot object, or dated snapshots of which the latest
    /// one on or before `as_of` is returned.
    async fn fetch_fundamentals(&self, ticker: &str, as_of: NaiveDate) -> Result<DataPayload, DataError> {
        let Some(value) = self.load(&key_patterns::fundamentals(ticker)).await? else {
            return Ok(DataPayload::Empty);
        };
        match value.as_ref() {
            Value::Object(obj) if obj.is_empty() => Ok(DataPayload::Empty),
            Value::Object(_) => Ok(DataPayload::Rows(vec![value.as_ref().clone()])),
            Value::Array(snapshots) => Ok(DataPayload::rows(
                snapshots
                    .iter()
                    .filter_map(|row| row_date(row).filter(|d| *d <= as_of).map(|d| (d, row)))
                    .max_by_key(|(d, _)| *d)
                    .map(|(_, row)| row.clone())
                    .into_iter()
                    .collect(),
            )),
            _ => Err(DataError::Malformed {
                source_name: SOURCE.to_string(),
                message: format!("fundamentals for {ticker} are neither an object nor a list"),
            }),
        }
    }

    async fn fetch_news(&self, ticker: &str, range: DateRange) -> Result<DataPayload, DataError> {
        self.series(&key_patterns::news(ticker), range).await
    }

    async fn fetch_sentiment(&self, ticker: &str, range: DateRange) -> Result<DataPayload, DataError> {
        self.series(&key_patterns::sentiment(ticker), range).await
    }
}
