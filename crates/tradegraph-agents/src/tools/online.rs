use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{DataCollaborators, DataPayload, DateRange};
use crate::error::DataError;

const YAHOO: &str = "yahoo";
const FINNHUB: &str = "finnhub";

/// Live data: Yahoo Finance chart API for prices, Finnhub for fundamentals,
/// company news and insider sentiment.
///
/// The HTTP client is injected so a single pooled client can be shared by
/// every run in the process.
pub struct OnlineDataSource {
    client: Client,
    finnhub_key: String,
    yahoo_base: String,
    finnhub_base: String,
}

impl OnlineDataSource {
    pub fn new(client: Client, finnhub_key: impl Into<String>) -> Self {
        Self {
            client,
            finnhub_key: finnhub_key.into(),
            yahoo_base: "https://query1.finance.yahoo.com".to_string(),
            finnhub_base: "https://finnhub.io/api/v1".to_string(),
        }
    }

    /// Point at alternative endpoints (mirrors, proxies).
    pub fn with_base_urls(mut self, yahoo: &str, finnhub: &str) -> Self {
        self.yahoo_base = yahoo.trim_end_matches('/').to_string();
        self.finnhub_base = finnhub.trim_end_matches('/').to_string();
        self
    }

    /// Pooled client with the timeouts used for data requests.
    pub fn default_client() -> Result<Client, DataError> {
        Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .user_agent("tradegraph/0.1")
            .build()
            .map_err(|e| DataError::Unreachable {
                source_name: "http client".to_string(),
                message: e.to_string(),
            })
    }

    async fn get_json(&self, source: &str, url: &str, query: &[(&str, String)]) -> Result<Value, DataError> {
        debug!(source, url, "Fetching");
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| DataError::Unreachable {
                source_name: source.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DataError::Unauthorized {
                source_name: source.to_string(),
                message: format!("HTTP {status}"),
            });
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(Value::Null);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(source, %status, "Data source returned an error");
            return Err(DataError::Unreachable {
                source_name: source.to_string(),
                message: format!("HTTP {status}: {body}"),
            });
        }

        response.json::<Value>().await.map_err(|e| DataError::Malformed {
            source_name: source.to_string(),
            message: e.to_string(),
        })
    }

    fn finnhub_query(&self, ticker: &str) -> Vec<(&'static str, String)> {
        vec![
            ("symbol", ticker.to_string()),
            ("token", self.finnhub_key.clone()),
        ]
    }
}

fn unix_day(ts: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(ts, 0).map(|dt| dt.date_naive().to_string())
}

fn day_start(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// Flatten a Yahoo chart response into dated OHLCV rows.
pub(crate) fn chart_rows(body: &Value) -> Result<Vec<Value>, DataError> {
    let malformed = |message: &str| DataError::Malformed {
        source_name: YAHOO.to_string(),
        message: message.to_string(),
    };

    let Some(result) = body.pointer("/chart/result/0") else {
        return Ok(Vec::new());
    };
    let Some(timestamps) = result.get("timestamp").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    let quote = result
        .pointer("/indicators/quote/0")
        .ok_or_else(|| malformed("chart result has no quote block"))?;

    let column = |name: &str, i: usize| quote.get(name).and_then(|c| c.get(i)).cloned().unwrap_or(Value::Null);

    Ok(timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let date = unix_day(ts.as_i64()?)?;
            let close = column("close", i);
            (!close.is_null()).then(|| {
                json!({
                    "date": date,
                    "open": column("open", i),
                    "high": column("high", i),
                    "low": column("low", i),
                    "close": close,
                    "volume": column("volume", i),
                })
            })
        })
        .collect())
}

#[async_trait]
impl DataCollaborators for OnlineDataSource {
    fn name(&self) -> &str {
        "online"
    }

    async fn fetch_market_data(&self, ticker: &str, range: DateRange) -> Result<DataPayload, DataError> {
        let url = format!("{}/v8/finance/chart/{ticker}", self.yahoo_base);
        // period2 is exclusive
        let query = [
            ("period1", day_start(range.start).to_string()),
            ("period2", (day_start(range.end) + 86_400).to_string()),
            ("interval", "1d".to_string()),
        ];
        let body = self.get_json(YAHOO, &url, &query).await?;
        Ok(DataPayload::rows(chart_rows(&body)?))
    }

    async fn fetch_fundamentals(&self, ticker: &str, as_of: NaiveDate) -> Result<DataPayload, DataError> {
        let url = format!("{}/stock/metric", self.finnhub_base);
        let mut query = self.finnhub_query(ticker);
        query.push(("metric", "all".to_string()));
        let body = self.get_json(FINNHUB, &url, &query).await?;

        match body.get("metric").and_then(Value::as_object) {
            Some(metric) if !metric.is_empty() => {
                let mut row = metric.clone();
                row.insert("date".to_string(), json!(as_of.to_string()));
                Ok(DataPayload::Rows(vec![Value::Object(row)]))
            }
            _ => Ok(DataPayload::Empty),
        }
    }

    async fn fetch_news(&self, ticker: &str, range: DateRange) -> Result<DataPayload, DataError> {
        let url = format!("{}/company-news", self.finnhub_base);
        let mut query = self.finnhub_query(ticker);
        query.push(("from", range.start.to_string()));
        query.push(("to", range.end.to_string()));
        let body = self.get_json(FINNHUB, &url, &query).await?;

        let rows = body
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let date = unix_day(item.get("datetime")?.as_i64()?)?;
                        Some(json!({
                            "date": date,
                            "headline": item.get("headline").cloned().unwrap_or(Value::Null),
                            "summary": item.get("summary").cloned().unwrap_or(Value::Null),
                            "source": item.get("source").cloned().unwrap_or(Value::Null),
                        }))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(DataPayload::rows(rows))
    }

    async fn fetch_sentiment(&self, ticker: &str, range: DateRange) -> Result<DataPayload, DataError> {
        let url = format!("{}/stock/insider-sentiment", self.finnhub_base);
        let mut query = self.finnhub_query(ticker);
        query.push(("from", range.start.to_string()));
        query.push(("to", range.end.to_string()));
        let body = self.get_json(FINNHUB, &url, &query).await?;

        let rows = body
            .get("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let year = item.get("year")?.as_i64()?;
                        let month = item.get("month")?.as_i64()?;
                        Some(json!({
                            "date": format!("{year:04}-{month:02}-01"),
                            "change": item.get("change").cloned().unwrap_or(Value::Null),
                            "mspr": item.get("mspr").cloned().unwrap_or(Value::Null),
                        }))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(DataPayload::rows(rows))
    }
}
