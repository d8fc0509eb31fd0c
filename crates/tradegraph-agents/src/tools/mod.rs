//! Data collaborators and the tool surface analysts use to reach them.

pub mod offline;
pub mod online;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::{debug, warn};
use tradegraph_models::dates::{self, DateError, DEFAULT_DATE_FORMAT};
use tradegraph_models::{AnalystKind, ToolCall, ToolSpec};

use crate::error::DataError;

pub use offline::CachedDataSource;
pub use online::OnlineDataSource;

/// What a collaborator returned: rows, free text, or explicitly nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum DataPayload {
    Rows(Vec<Value>),
    Text(String),
    Empty,
}

impl DataPayload {
    /// Rows or text; an empty list or blank text collapses to `Empty`.
    pub fn rows(rows: Vec<Value>) -> Self {
        if rows.is_empty() {
            DataPayload::Empty
        } else {
            DataPayload::Rows(rows)
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.trim().is_empty() {
            DataPayload::Empty
        } else {
            DataPayload::Text(text)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, DataPayload::Empty)
    }

    /// Text fed back to the agent as the tool result.
    pub fn render(&self) -> String {
        match self {
            DataPayload::Rows(rows) => rows
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join("\n"),
            DataPayload::Text(text) => text.clone(),
            DataPayload::Empty => "NO DATA: the source returned no results for this request.".to_string(),
        }
    }
}

/// Inclusive calendar window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateError> {
        if start > end {
            return Err(DateError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// `days` calendar days ending on (and including) `end`.
    pub fn ending_at(end: NaiveDate, days: u32) -> Result<Self, DateError> {
        let start = dates::subtract_days(end, i64::from(days))?;
        Self::new(start, end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// The capability set analysts draw data from. Online and cached
/// implementations share this signature.
#[async_trait]
pub trait DataCollaborators: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_market_data(&self, ticker: &str, range: DateRange) -> Result<DataPayload, DataError>;

    async fn fetch_fundamentals(&self, ticker: &str, as_of: NaiveDate) -> Result<DataPayload, DataError>;

    async fn fetch_news(&self, ticker: &str, range: DateRange) -> Result<DataPayload, DataError>;

    async fn fetch_sentiment(&self, ticker: &str, range: DateRange) -> Result<DataPayload, DataError>;
}

/// Chooses live or cached collaborators once, from `online_tools`.
pub struct DataRouter {
    active: Arc<dyn DataCollaborators>,
}

impl DataRouter {
    pub fn new(
        online_tools: bool,
        online: Option<Arc<dyn DataCollaborators>>,
        offline: Arc<dyn DataCollaborators>,
    ) -> Self {
        let active = match (online_tools, online) {
            (true, Some(online)) => online,
            (true, None) => {
                warn!("online tools requested but no live source configured; using cached data");
                offline
            }
            (false, _) => offline,
        };
        Self { active }
    }
}

#[async_trait]
impl DataCollaborators for DataRouter {
    fn name(&self) -> &str {
        self.active.name()
    }

    async fn fetch_market_data(&self, ticker: &str, range: DateRange) -> Result<DataPayload, DataError> {
        self.active.fetch_market_data(ticker, range).await
    }

    async fn fetch_fundamentals(&self, ticker: &str, as_of: NaiveDate) -> Result<DataPayload, DataError> {
        self.active.fetch_fundamentals(ticker, as_of).await
    }

    async fn fetch_news(&self, ticker: &str, range: DateRange) -> Result<DataPayload, DataError> {
        self.active.fetch_news(ticker, range).await
    }

    async fn fetch_sentiment(&self, ticker: &str, range: DateRange) -> Result<DataPayload, DataError> {
        self.active.fetch_sentiment(ticker, range).await
    }
}

pub const GET_MARKET_DATA: &str = "get_market_data";
pub const GET_FUNDAMENTALS: &str = "get_fundamentals";
pub const GET_NEWS: &str = "get_news";
pub const GET_SENTIMENT: &str = "get_sentiment";

fn window_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "start_date": {"type": "string", "description": "First day, YYYY-MM-DD"},
            "end_date": {"type": "string", "description": "Last day, YYYY-MM-DD (defaults to the trade date)"},
            "look_back_days": {"type": "integer", "description": "Days before end_date when start_date is omitted"}
        }
    })
}

fn spec(name: &str, description: &str, parameters: Value) -> ToolSpec {
    ToolSpec {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
    }
}

/// Tools offered to each analyst.
pub fn tools_for(kind: AnalystKind) -> Vec<ToolSpec> {
    match kind {
        AnalystKind::Market => vec![spec(
            GET_MARKET_DATA,
            "Daily OHLCV price bars for the ticker",
            window_parameters(),
        )],
        AnalystKind::Fundamentals => vec![spec(
            GET_FUNDAMENTALS,
            "Latest fundamental metrics for the ticker as of the trade date",
            json!({"type": "object", "properties": {"as_of": {"type": "string"}}}),
        )],
        AnalystKind::News => vec![spec(
            GET_NEWS,
            "Company news headlines and summaries",
            window_parameters(),
        )],
        AnalystKind::Social => vec![
            spec(
                GET_SENTIMENT,
                "Insider and social sentiment readings",
                window_parameters(),
            ),
            spec(
                GET_NEWS,
                "Company news headlines and summaries",
                window_parameters(),
            ),
        ],
    }
}

/// Result of dispatching one tool call.
#[derive(Debug)]
pub enum ToolOutcome {
    Data(DataPayload),
    /// Reported back to the agent as text; the loop continues.
    Rejected(String),
    /// Connectivity or credential failure.
    Failed(DataError),
}

/// Maps tool calls to collaborator calls for one ticker and trade date.
#[derive(Clone)]
pub struct ToolDispatcher {
    data: Arc<dyn DataCollaborators>,
    ticker: String,
    trade_date: NaiveDate,
    look_back_days: u32,
    market_look_back_days: u32,
}

impl ToolDispatcher {
    pub fn new(
        data: Arc<dyn DataCollaborators>,
        ticker: impl Into<String>,
        trade_date: NaiveDate,
        look_back_days: u32,
        market_look_back_days: u32,
    ) -> Self {
        Self {
            data,
            ticker: ticker.into(),
            trade_date,
            look_back_days,
            market_look_back_days,
        }
    }

    fn date_arg(args: &Value, key: &str) -> Result<Option<NaiveDate>, String> {
        match args.get(key).and_then(Value::as_str) {
            None => Ok(None),
            Some(raw) => dates::parse_date(raw, DEFAULT_DATE_FORMAT)
                .map(Some)
                .map_err(|e| e.to_string()),
        }
    }

    fn range_from(&self, args: &Value, default_days: u32) -> Result<DateRange, String> {
        let end = Self::date_arg(args, "end_date")?.unwrap_or(self.trade_date);
        let range = match Self::date_arg(args, "start_date")? {
            Some(start) => DateRange::new(start, end),
            None => {
                let days = args
                    .get("look_back_days")
                    .and_then(Value::as_u64)
                    .and_then(|d| u32::try_from(d).ok())
                    .unwrap_or(default_days);
                DateRange::ending_at(end, days)
            }
        };
        range.map_err(|e| e.to_string())
    }

    pub async fn dispatch(&self, call: &ToolCall) -> ToolOutcome {
        let args = &call.arguments;
        let ticker = args
            .get("ticker")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(self.ticker.as_str());

        debug!(tool = %call.name, call_id = %call.id, ticker, "Dispatching tool call");

        let result = match call.name.as_str() {
            GET_MARKET_DATA => match self.range_from(args, self.market_look_back_days) {
                Ok(range) => self.data.fetch_market_data(ticker, range).await,
                Err(msg) => return ToolOutcome::Rejected(msg),
            },
            GET_FUNDAMENTALS => {
                let as_of = match Self::date_arg(args, "as_of") {
                    Ok(date) => date.unwrap_or(self.trade_date),
                    Err(msg) => return ToolOutcome::Rejected(msg),
                };
                self.data.fetch_fundamentals(ticker, as_of).await
            }
            GET_NEWS => match self.range_from(args, self.look_back_days) {
                Ok(range) => self.data.fetch_news(ticker, range).await,
                Err(msg) => return ToolOutcome::Rejected(msg),
            },
            GET_SENTIMENT => match self.range_from(args, self.look_back_days) {
                Ok(range) => self.data.fetch_sentiment(ticker, range).await,
                Err(msg) => return ToolOutcome::Rejected(msg),
            },
            other => return ToolOutcome::Rejected(format!("Unknown tool '{other}'")),
        };

        match result {
            Ok(payload) => ToolOutcome::Data(payload),
            Err(e) if e.is_connectivity() => ToolOutcome::Failed(e),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool returned malformed data");
                ToolOutcome::Rejected(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubData;

    fn date(s: &str) -> NaiveDate {
        dates::parse_date(s, DEFAULT_DATE_FORMAT).unwrap()
    }

    fn dispatcher(data: StubData) -> ToolDispatcher {
        ToolDispatcher::new(Arc::new(data), "NVDA", date("2024-05-10"), 7, 30)
    }

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: "call_0".to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    #[test]
    fn range_rejects_reversed_dates() {
        assert!(DateRange::new(date("2024-05-10"), date("2024-05-01")).is_err());
        let range = DateRange::ending_at(date("2024-05-10"), 7).unwrap();
        assert_eq!(range.start, date("2024-05-03"));
        assert!(range.contains(date("2024-05-10")));
        assert!(!range.contains(date("2024-05-02")));
    }

    #[test]
    fn payload_constructors_collapse_empty() {
        assert!(DataPayload::rows(vec![]).is_empty());
        assert!(DataPayload::text("  ").is_empty());
        assert!(DataPayload::Empty.render().starts_with("NO DATA"));
        assert_eq!(
            DataPayload::rows(vec![json!({"a": 1}), json!({"a": 2})]).render(),
            "{\"a\":1}\n{\"a\":2}"
        );
    }

    #[test]
    fn social_analyst_gets_two_tools() {
        let names: Vec<String> = tools_for(AnalystKind::Social)
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec![GET_SENTIMENT, GET_NEWS]);
    }

    #[tokio::test]
    async fn market_data_defaults_to_market_window() {
        let stub = StubData::nvda();
        let outcome = dispatcher(stub.clone())
            .dispatch(&call(GET_MARKET_DATA, json!({})))
            .await;
        assert!(matches!(outcome, ToolOutcome::Data(DataPayload::Rows(_))));
        let requested = stub.requests();
        assert_eq!(requested, vec!["market_data:NVDA:2024-04-10..2024-05-10".to_string()]);
    }

    #[tokio::test]
    async fn explicit_window_and_ticker() {
        let stub = StubData::nvda();
        dispatcher(stub.clone())
            .dispatch(&call(
                GET_NEWS,
                json!({"ticker": "AMD", "start_date": "2024-05-01", "end_date": "2024-05-05"}),
            ))
            .await;
        assert_eq!(stub.requests(), vec!["news:AMD:2024-05-01..2024-05-05".to_string()]);
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_dates_are_rejected() {
        let d = dispatcher(StubData::nvda());
        assert!(matches!(
            d.dispatch(&call("get_weather", json!({}))).await,
            ToolOutcome::Rejected(msg) if msg.contains("get_weather")
        ));
        assert!(matches!(
            d.dispatch(&call(GET_NEWS, json!({"start_date": "yesterday"}))).await,
            ToolOutcome::Rejected(_)
        ));
        assert!(matches!(
            d.dispatch(&call(GET_SENTIMENT, json!({"start_date": "2024-05-20"}))).await,
            ToolOutcome::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn connectivity_failures_surface() {
        let d = dispatcher(StubData::nvda().unreachable(AnalystKind::Fundamentals));
        assert!(matches!(
            d.dispatch(&call(GET_FUNDAMENTALS, json!({}))).await,
            ToolOutcome::Failed(DataError::Unreachable { .. })
        ));
    }

    #[tokio::test]
    async fn router_prefers_online_when_enabled() {
        let online: Arc<dyn DataCollaborators> = Arc::new(StubData::nvda().named("live"));
        let offline: Arc<dyn DataCollaborators> = Arc::new(StubData::nvda().named("cached"));

        assert_eq!(DataRouter::new(true, Some(online.clone()), offline.clone()).name(), "live");
        assert_eq!(DataRouter::new(false, Some(online), offline.clone()).name(), "cached");
        assert_eq!(DataRouter::new(true, None, offline).name(), "cached");
    }
}
