use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent_message::AgentRole;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("{0} has already been written for this run")]
    AlreadyFilled(String),
}

/// The four report-producing analysts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AnalystKind {
    Market,
    Fundamentals,
    News,
    Social,
}

impl AnalystKind {
    pub const ALL: [AnalystKind; 4] = [
        AnalystKind::Market,
        AnalystKind::Fundamentals,
        AnalystKind::News,
        AnalystKind::Social,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalystKind::Market => "market",
            AnalystKind::Fundamentals => "fundamentals",
            AnalystKind::News => "news",
            AnalystKind::Social => "social",
        }
    }

    pub fn role(&self) -> AgentRole {
        match self {
            AnalystKind::Market => AgentRole::MarketAnalyst,
            AnalystKind::Fundamentals => AgentRole::FundamentalsAnalyst,
            AnalystKind::News => AgentRole::NewsAnalyst,
            AnalystKind::Social => AgentRole::SocialAnalyst,
        }
    }

    pub fn report_title(&self) -> &'static str {
        match self {
            AnalystKind::Market => "Market report",
            AnalystKind::Fundamentals => "Fundamentals report",
            AnalystKind::News => "News report",
            AnalystKind::Social => "Social sentiment report",
        }
    }
}

impl fmt::Display for AnalystKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An analyst's output, or an explicit marker that it could not be produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalystReport {
    Available { content: String },
    Unavailable { reason: String },
}

impl AnalystReport {
    pub fn is_available(&self) -> bool {
        matches!(self, AnalystReport::Available { .. })
    }

    /// Text handed to downstream agents.
    pub fn render(&self) -> String {
        match self {
            AnalystReport::Available { content } => content.clone(),
            AnalystReport::Unavailable { reason } => format!("[UNAVAILABLE: {reason}]"),
        }
    }
}

/// Debate participants, in the order they are declared in their debate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Bull,
    Bear,
    Aggressive,
    Conservative,
    Neutral,
}

impl Speaker {
    pub fn role(&self) -> AgentRole {
        match self {
            Speaker::Bull => AgentRole::BullResearcher,
            Speaker::Bear => AgentRole::BearResearcher,
            Speaker::Aggressive => AgentRole::AggressiveDebator,
            Speaker::Conservative => AgentRole::ConservativeDebator,
            Speaker::Neutral => AgentRole::NeutralDebator,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Speaker::Bull => "Bull Analyst",
            Speaker::Bear => "Bear Analyst",
            Speaker::Aggressive => "Aggressive Analyst",
            Speaker::Conservative => "Conservative Analyst",
            Speaker::Neutral => "Neutral Analyst",
        }
    }
}

/// One statement in a debate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DebateTurn {
    /// Zero-based round the turn belongs to.
    pub round: u32,
    pub speaker: Speaker,
    pub content: String,
    /// Index in the same log of the most recent statement by another speaker.
    pub responding_to: Option<usize>,
}

/// Append-only transcript of one debate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DebateLog {
    turns: Vec<DebateTurn>,
    rounds_completed: u32,
}

impl DebateLog {
    pub fn turns(&self) -> &[DebateTurn] {
        &self.turns
    }

    pub fn rounds_completed(&self) -> u32 {
        self.rounds_completed
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Index of the latest statement not made by `speaker`.
    pub fn latest_opposing(&self, speaker: Speaker) -> Option<usize> {
        self.turns.iter().rposition(|t| t.speaker != speaker)
    }

    pub fn latest_by(&self, speaker: Speaker) -> Option<&DebateTurn> {
        self.turns.iter().rev().find(|t| t.speaker == speaker)
    }

    pub fn push(&mut self, round: u32, speaker: Speaker, content: String) -> usize {
        let responding_to = self.latest_opposing(speaker);
        self.turns.push(DebateTurn {
            round,
            speaker,
            content,
            responding_to,
        });
        self.turns.len() - 1
    }

    pub fn mark_round_completed(&mut self, rounds: u32) {
        self.rounds_completed = self.rounds_completed.max(rounds);
    }

    /// Full transcript, oldest first, as presented to debaters and judges.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.speaker.label(), t.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn fill(slot: &mut Option<String>, value: String, name: &str) -> Result<(), StateError> {
    if slot.is_some() {
        return Err(StateError::AlreadyFilled(name.to_string()));
    }
    *slot = Some(value);
    Ok(())
}

/// The single mutable object threaded through all stages of one run.
///
/// Stages only append to the debate logs or fill empty slots; nothing is ever
/// overwritten once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SharedState {
    ticker: String,
    trade_date: NaiveDate,
    reports: BTreeMap<AnalystKind, AnalystReport>,
    investment_debate: DebateLog,
    investment_plan: Option<String>,
    trader_plan: Option<String>,
    risk_debate: DebateLog,
    final_decision: Option<String>,
}

impl SharedState {
    pub fn new(ticker: impl Into<String>, trade_date: NaiveDate) -> Self {
        Self {
            ticker: ticker.into(),
            trade_date,
            reports: BTreeMap::new(),
            investment_debate: DebateLog::default(),
            investment_plan: None,
            trader_plan: None,
            risk_debate: DebateLog::default(),
            final_decision: None,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn trade_date(&self) -> NaiveDate {
        self.trade_date
    }

    pub fn report(&self, kind: AnalystKind) -> Option<&AnalystReport> {
        self.reports.get(&kind)
    }

    pub fn reports(&self) -> &BTreeMap<AnalystKind, AnalystReport> {
        &self.reports
    }

    pub fn set_report(&mut self, kind: AnalystKind, report: AnalystReport) -> Result<(), StateError> {
        if self.reports.contains_key(&kind) {
            return Err(StateError::AlreadyFilled(format!("{kind} report")));
        }
        self.reports.insert(kind, report);
        Ok(())
    }

    /// All analyst reports rendered as one labelled block.
    pub fn reports_digest(&self) -> String {
        if self.reports.is_empty() {
            return "No analyst reports are available.".to_string();
        }
        self.reports
            .iter()
            .map(|(kind, report)| format!("## {}\n{}", kind.report_title(), report.render()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn investment_debate(&self) -> &DebateLog {
        &self.investment_debate
    }

    pub fn investment_debate_mut(&mut self) -> &mut DebateLog {
        &mut self.investment_debate
    }

    pub fn investment_plan(&self) -> Option<&str> {
        self.investment_plan.as_deref()
    }

    pub fn set_investment_plan(&mut self, plan: String) -> Result<(), StateError> {
        fill(&mut self.investment_plan, plan, "investment plan")
    }

    pub fn trader_plan(&self) -> Option<&str> {
        self.trader_plan.as_deref()
    }

    pub fn set_trader_plan(&mut self, plan: String) -> Result<(), StateError> {
        fill(&mut self.trader_plan, plan, "trader plan")
    }

    pub fn risk_debate(&self) -> &DebateLog {
        &self.risk_debate
    }

    pub fn risk_debate_mut(&mut self) -> &mut DebateLog {
        &mut self.risk_debate
    }

    pub fn final_decision(&self) -> Option<&str> {
        self.final_decision.as_deref()
    }

    pub fn set_final_decision(&mut self, decision: String) -> Result<(), StateError> {
        fill(&mut self.final_decision, decision, "final decision")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SharedState {
        SharedState::new("NVDA", NaiveDate::from_ymd_opt(2024, 5, 10).unwrap())
    }

    #[test]
    fn slots_are_write_once() {
        let mut s = state();
        s.set_trader_plan("BUY".to_string()).unwrap();
        let err = s.set_trader_plan("SELL".to_string()).unwrap_err();
        assert_eq!(err, StateError::AlreadyFilled("trader plan".to_string()));
        assert_eq!(s.trader_plan(), Some("BUY"));
    }

    #[test]
    fn reports_are_write_once() {
        let mut s = state();
        s.set_report(
            AnalystKind::News,
            AnalystReport::Unavailable {
                reason: "no news".to_string(),
            },
        )
        .unwrap();
        assert!(s
            .set_report(
                AnalystKind::News,
                AnalystReport::Available {
                    content: "late".to_string()
                }
            )
            .is_err());
        assert!(!s.report(AnalystKind::News).unwrap().is_available());
    }

    #[test]
    fn digest_marks_unavailable_reports() {
        let mut s = state();
        s.set_report(
            AnalystKind::Market,
            AnalystReport::Available {
                content: "Uptrend".to_string(),
            },
        )
        .unwrap();
        s.set_report(
            AnalystKind::News,
            AnalystReport::Unavailable {
                reason: "news source returned no data".to_string(),
            },
        )
        .unwrap();

        let digest = s.reports_digest();
        assert!(digest.contains("## Market report\nUptrend"));
        assert!(digest.contains("[UNAVAILABLE: news source returned no data]"));
    }

    #[test]
    fn debate_turns_reference_previous_opponent() {
        let mut log = DebateLog::default();
        let bull = log.push(0, Speaker::Bull, "Growth".to_string());
        let bear = log.push(0, Speaker::Bear, "Valuation".to_string());
        let bull2 = log.push(1, Speaker::Bull, "Rebuttal".to_string());

        assert_eq!(log.turns()[bull].responding_to, None);
        assert_eq!(log.turns()[bear].responding_to, Some(bull));
        assert_eq!(log.turns()[bull2].responding_to, Some(bear));
        assert_eq!(log.latest_by(Speaker::Bull).unwrap().content, "Rebuttal");
        assert_eq!(
            log.transcript(),
            "Bull Analyst: Growth\n\nBear Analyst: Valuation\n\nBull Analyst: Rebuttal"
        );
    }

    #[test]
    fn rounds_completed_never_decreases() {
        let mut log = DebateLog::default();
        log.mark_round_completed(2);
        log.mark_round_completed(1);
        assert_eq!(log.rounds_completed(), 2);
    }

    #[test]
    fn state_roundtrip() {
        let mut s = state();
        s.set_report(
            AnalystKind::Fundamentals,
            AnalystReport::Available {
                content: "Strong margins".to_string(),
            },
        )
        .unwrap();
        s.investment_debate_mut().push(0, Speaker::Bull, "Buy".to_string());
        let json = serde_json::to_string(&s).unwrap();
        let parsed: SharedState = serde_json::from_str(&json).unwrap();
        assert_eq!(s, parsed);
    }
}
