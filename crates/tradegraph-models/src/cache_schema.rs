use serde::{Deserialize, Serialize};

/// Categories of cached data-source payloads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    MarketData,
    Fundamentals,
    News,
    Sentiment,
}

impl CacheCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::MarketData => "market_data",
            CacheCategory::Fundamentals => "fundamentals",
            CacheCategory::News => "news",
            CacheCategory::Sentiment => "sentiment",
        }
    }
}

/// Table the offline data collaborators read from.
///
/// Entries hold historical data and do not expire. `value_json` is either a
/// JSON array of objects with a `date` field (`YYYY-MM-DD`) or a single JSON
/// object for point-in-time payloads such as fundamentals.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS cache_entries (
///     key         TEXT PRIMARY KEY,
///     category    TEXT NOT NULL,
///     value_json  TEXT NOT NULL,
///     source      TEXT NOT NULL,
///     symbol      TEXT,
///     fetched_at  TEXT NOT NULL
/// );
/// ```
pub const CACHE_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS cache_entries (
    key         TEXT PRIMARY KEY,
    category    TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    source      TEXT NOT NULL,
    symbol      TEXT,
    fetched_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_category ON cache_entries(category);
CREATE INDEX IF NOT EXISTS idx_cache_symbol ON cache_entries(symbol);
";

/// Lessons recorded by `reflect_and_remember`, one row per role per run.
pub const REFLECTIONS_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS reflections (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    ticker          TEXT NOT NULL,
    role            TEXT NOT NULL,
    trade_date      TEXT NOT NULL,
    record_json     TEXT NOT NULL,
    recorded_at     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_reflections_ticker_role ON reflections(ticker, role);
";

/// Key conventions for cache entries.
///
/// - Daily bars: `bars:{symbol}:{interval}` (e.g. `bars:NVDA:1d`)
/// - Fundamentals: `fundamentals:{symbol}`
/// - Company news: `news:{symbol}`
/// - Insider / social sentiment: `sentiment:{symbol}`
pub mod key_patterns {
    pub fn bars(symbol: &str, interval: &str) -> String {
        format!("bars:{symbol}:{interval}")
    }

    pub fn fundamentals(symbol: &str) -> String {
        format!("fundamentals:{symbol}")
    }

    pub fn news(symbol: &str) -> String {
        format!("news:{symbol}")
    }

    pub fn sentiment(symbol: &str) -> String {
        format!("sentiment:{symbol}")
    }
}

/// A raw cache row as read from SQLite.
#[derive(Debug, Clone)]
pub struct CacheRow {
    pub key: String,
    pub category: String,
    pub value_json: String,
    pub source: String,
    pub symbol: Option<String>,
    pub fetched_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_pattern_bars() {
        assert_eq!(key_patterns::bars("NVDA", "1d"), "bars:NVDA:1d");
    }

    #[test]
    fn key_patterns_per_symbol() {
        assert_eq!(key_patterns::fundamentals("AAPL"), "fundamentals:AAPL");
        assert_eq!(key_patterns::news("TSLA"), "news:TSLA");
        assert_eq!(key_patterns::sentiment("SPY"), "sentiment:SPY");
    }

    #[test]
    fn category_str_matches_serde() {
        for cat in [
            CacheCategory::MarketData,
            CacheCategory::Fundamentals,
            CacheCategory::News,
            CacheCategory::Sentiment,
        ] {
            let json = serde_json::to_string(&cat).unwrap();
            assert_eq!(json, format!("\"{}\"", cat.as_str()));
            let parsed: CacheCategory = serde_json::from_str(&json).unwrap();
            assert_eq!(cat, parsed);
        }
    }
}
