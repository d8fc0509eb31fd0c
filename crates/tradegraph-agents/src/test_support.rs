//! Deterministic collaborators for tests.
//!
//! `ScriptedLlm` plays every role the way a well-behaved model would: analysts
//! request their tools first and then write a report from the tool results,
//! debaters argue, judges and the trader commit to an action. Its answers
//! depend only on the request it receives, so identical runs produce identical
//! decisions. `StubData` serves a small fixed NVDA data set and logs every
//! request it receives.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Weekday};
use serde_json::{json, Value};
use tradegraph_models::{AgentRequest, AgentRole, AnalystKind, ChatRole, Speaker};

use crate::error::{AgentError, DataError};
use crate::llm::LlmClient;
use crate::parser::extract_action;
use crate::tools::{DataCollaborators, DataPayload, DateRange};

enum Scripted {
    Reply(Value),
    Fail(String),
}

#[derive(Default)]
struct Script {
    queued: HashMap<AgentRole, VecDeque<Scripted>>,
    requests: Vec<AgentRequest>,
}

/// Role-aware scripted model. Clones share the script and the request log.
#[derive(Clone, Default)]
pub struct ScriptedLlm {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue raw outputs for `role`; once used up the default behaviour resumes.
    pub fn respond(self, role: AgentRole, outputs: Vec<Value>) -> Self {
        self.queue(role, outputs.into_iter().map(Scripted::Reply))
    }

    /// Make the next invocation of `role` fail with a client error.
    pub fn fail(self, role: AgentRole, message: &str) -> Self {
        self.queue(role, std::iter::once(Scripted::Fail(message.to_string())))
    }

    /// Sleep this long before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn queue(self, role: AgentRole, items: impl Iterator<Item = Scripted>) -> Self {
        self.script
            .lock()
            .unwrap()
            .queued
            .entry(role)
            .or_default()
            .extend(items);
        self
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn requests_for(&self, role: AgentRole) -> Vec<AgentRequest> {
        self.requests().into_iter().filter(|r| r.role == role).collect()
    }

    pub fn call_count(&self) -> usize {
        self.script.lock().unwrap().requests.len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, request: &AgentRequest) -> Result<Value, AgentError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queued = {
            let mut script = self.script.lock().unwrap();
            script.requests.push(request.clone());
            script
                .queued
                .get_mut(&request.role)
                .and_then(VecDeque::pop_front)
        };
        match queued {
            Some(Scripted::Reply(value)) => Ok(value),
            Some(Scripted::Fail(message)) => Err(AgentError::Client(message)),
            None => Ok(default_reply(request)),
        }
    }
}

/// Text between `## {title}\n` and the next section heading.
fn section<'a>(text: &'a str, title: &str) -> Option<&'a str> {
    let marker = format!("## {title}\n");
    let start = text.find(&marker)? + marker.len();
    let rest = &text[start..];
    Some(rest.find("\n\n## ").map_or(rest, |end| &rest[..end]))
}

/// Count consecutive moves in the same direction at the end of the series.
/// Positive for higher closes, negative for lower.
pub fn consecutive_trend(values: &[f64]) -> i32 {
    let mut count = 0i32;
    for pair in values.windows(2).rev() {
        let step = if pair[1] > pair[0] {
            1
        } else if pair[1] < pair[0] {
            -1
        } else {
            0
        };
        if step == 0 || (count != 0 && step != count.signum()) {
            break;
        }
        count += step;
    }
    count
}

fn analyst_reply(request: &AgentRequest) -> Value {
    let results: Vec<&str> = request
        .messages
        .iter()
        .filter(|m| m.role == ChatRole::Tool)
        .map(|m| m.content.as_str())
        .collect();

    if results.is_empty() && !request.tools.is_empty() {
        return tool_request(request);
    }

    let rows: Vec<Value> = results
        .iter()
        .flat_map(|r| r.lines())
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .collect();

    let report = match request.role {
        AgentRole::MarketAnalyst => {
            let closes: Vec<f64> = rows.iter().filter_map(|r| r["close"].as_f64()).collect();
            let trend = consecutive_trend(&closes);
            let direction = match trend {
                t if t >= 3 => "an uptrend",
                t if t <= -3 => "a downtrend",
                _ => "a sideways range",
            };
            format!(
                "Market report: {} sessions reviewed, last close {}. Price is in {direction} \
                 with {} consecutive sessions in the same direction.",
                closes.len(),
                closes.last().copied().unwrap_or_default(),
                trend.abs()
            )
        }
        AgentRole::FundamentalsAnalyst => match rows.first().and_then(|r| r["peTTM"].as_f64()) {
            Some(pe) => format!("Fundamentals report: trailing P/E of {pe}; margins are expanding."),
            None => "Fundamentals report: no metrics were available.".to_string(),
        },
        AgentRole::NewsAnalyst => format!(
            "News report: {} articles in the window; coverage is broadly positive.",
            rows.len()
        ),
        _ => format!(
            "Sentiment report: {} readings across insider and news sources.",
            rows.len()
        ),
    };
    json!(report)
}

/// Each analyst asks for its tools in a different provider shape.
fn tool_request(request: &AgentRequest) -> Value {
    let names: Vec<&str> = request.tools.iter().map(|t| t.name.as_str()).collect();
    match request.role {
        AgentRole::MarketAnalyst => json!({
            "content": null,
            "tool_calls": names.iter().enumerate().map(|(i, name)| json!({
                "id": format!("call_mkt_{i}"),
                "type": "function",
                "function": {"name": name, "arguments": "{}"}
            })).collect::<Vec<_>>()
        }),
        AgentRole::FundamentalsAnalyst => Value::Array(
            std::iter::once(json!({"type": "text", "text": "Checking the latest metrics."}))
                .chain(names.iter().enumerate().map(|(i, name)| {
                    json!({"type": "tool_use", "id": format!("toolu_{i}"), "name": name, "input": {}})
                }))
                .collect(),
        ),
        _ => {
            let calls: Vec<Value> = names
                .iter()
                .map(|name| json!({"name": name, "arguments": {}}))
                .collect();
            json!(format!("```json\n{}\n```", json!({ "tool_calls": calls })))
        }
    }
}

fn debater_reply(speaker: Speaker, task: &str) -> String {
    let previous = task.matches(&format!("{}:", speaker.label())).count();
    let stance = match speaker {
        Speaker::Bull => "demand and pricing power support further upside",
        Speaker::Bear => "valuation already prices in the growth and leaves little margin of safety",
        Speaker::Aggressive => "the upside justifies a full position",
        Speaker::Conservative => "position size should be capped to protect capital",
        Speaker::Neutral => "a staged entry balances the two views",
    };
    format!("{} argument {}: {stance}.", speaker.label(), previous + 1)
}

fn default_reply(request: &AgentRequest) -> Value {
    let task = request
        .messages
        .first()
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    let text = match request.role {
        AgentRole::MarketAnalyst
        | AgentRole::FundamentalsAnalyst
        | AgentRole::NewsAnalyst
        | AgentRole::SocialAnalyst => return analyst_reply(request),
        AgentRole::BullResearcher => debater_reply(Speaker::Bull, task),
        AgentRole::BearResearcher => debater_reply(Speaker::Bear, task),
        AgentRole::AggressiveDebator => debater_reply(Speaker::Aggressive, task),
        AgentRole::ConservativeDebator => debater_reply(Speaker::Conservative, task),
        AgentRole::NeutralDebator => debater_reply(Speaker::Neutral, task),
        AgentRole::ResearchManager => {
            let action = if task.contains("uptrend") {
                "BUY"
            } else if task.contains("downtrend") {
                "SELL"
            } else {
                "HOLD"
            };
            format!("Recommendation: {action}. The stronger arguments follow the price trend.")
        }
        AgentRole::Trader => {
            let action = extract_action(section(task, "Proposed investment plan").unwrap_or_default());
            format!("Following the investment plan.\n\nFINAL TRANSACTION PROPOSAL: **{action}**")
        }
        AgentRole::RiskManager => {
            let action = extract_action(section(task, "Trader's proposal").unwrap_or_default());
            format!(
                "The trader proposed {action} and the risk debate supports it with a staged entry.\n\n\
                 FINAL TRANSACTION PROPOSAL: **{action}**"
            )
        }
    };
    json!(text)
}

/// In-memory data collaborators with request logging.
#[derive(Clone)]
pub struct StubData {
    name: String,
    bars: Vec<Value>,
    fundamentals: Vec<Value>,
    news: Vec<Value>,
    sentiment: Vec<Value>,
    unreachable: Vec<AnalystKind>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubData {
    /// Rising daily closes through 2024-05-10 with news and sentiment for the
    /// week before.
    pub fn nvda() -> Self {
        let start = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let bars = start
            .iter_days()
            .take_while(|d| *d <= NaiveDate::from_ymd_opt(2024, 5, 10).unwrap())
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .enumerate()
            .map(|(i, d)| {
                let close = 800.0 + 4.5 * i as f64;
                json!({
                    "date": d.to_string(),
                    "open": close - 2.0,
                    "high": close + 3.0,
                    "low": close - 4.0,
                    "close": close,
                    "volume": 40_000_000 + i * 100_000
                })
            })
            .collect();

        Self {
            name: "stub".to_string(),
            bars,
            fundamentals: vec![json!({"date": "2024-02-21", "peTTM": 65.1, "grossMarginTTM": 72.7})],
            news: vec![
                json!({"date": "2024-05-06", "headline": "Hyperscalers raise AI capex guidance"}),
                json!({"date": "2024-05-08", "headline": "New GPU platform ships to first customers"}),
                json!({"date": "2024-05-09", "headline": "Analysts lift price targets ahead of earnings"}),
            ],
            sentiment: vec![
                json!({"date": "2024-05-07", "mspr": 12.5, "change": 1500}),
                json!({"date": "2024-05-09", "mspr": 8.0, "change": 900}),
            ],
            unreachable: Vec::new(),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn empty_news(mut self) -> Self {
        self.news.clear();
        self
    }

    /// Fail the fetch backing `kind` (sentiment for the social analyst) as unreachable.
    pub fn unreachable(mut self, kind: AnalystKind) -> Self {
        self.unreachable.push(kind);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn log(&self, entry: String) {
        self.requests.lock().unwrap().push(entry);
    }

    fn check(&self, kind: AnalystKind) -> Result<(), DataError> {
        if self.unreachable.contains(&kind) {
            return Err(DataError::Unreachable {
                source_name: self.name.clone(),
                message: format!("connection refused while fetching {kind} data"),
            });
        }
        Ok(())
    }

    fn window(rows: &[Value], range: DateRange) -> DataPayload {
        DataPayload::rows(
            rows.iter()
                .filter(|r| {
                    r["date"]
                        .as_str()
                        .and_then(|d| d.parse::<NaiveDate>().ok())
                        .is_some_and(|d| range.contains(d))
                })
                .cloned()
                .collect(),
        )
    }
}

#[async_trait]
impl DataCollaborators for StubData {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_market_data(&self, ticker: &str, range: DateRange) -> Result<DataPayload, DataError> {
        self.log(format!("market_data:{ticker}:{}..{}", range.start, range.end));
        self.check(AnalystKind::Market)?;
        Ok(Self::window(&self.bars, range))
    }

    async fn fetch_fundamentals(&self, ticker: &str, as_of: NaiveDate) -> Result<DataPayload, DataError> {
        self.log(format!("fundamentals:{ticker}:{as_of}"));
        self.check(AnalystKind::Fundamentals)?;
        Ok(DataPayload::rows(self.fundamentals.clone()))
    }

    async fn fetch_news(&self, ticker: &str, range: DateRange) -> Result<DataPayload, DataError> {
        self.log(format!("news:{ticker}:{}..{}", range.start, range.end));
        self.check(AnalystKind::News)?;
        Ok(Self::window(&self.news, range))
    }

    async fn fetch_sentiment(&self, ticker: &str, range: DateRange) -> Result<DataPayload, DataError> {
        self.log(format!("sentiment:{ticker}:{}..{}", range.start, range.end));
        self.check(AnalystKind::Social)?;
        Ok(Self::window(&self.sentiment, range))
    }
}
