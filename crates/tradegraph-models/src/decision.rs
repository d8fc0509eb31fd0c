use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent_message::AgentRole;
use crate::state::{DebateLog, SharedState};

/// The action a decision recommends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
    /// Free-form recommendation that names none of the standard actions.
    Other(String),
}

impl TradeAction {
    /// Match a single word against the standard actions, ignoring case.
    pub fn from_word(word: &str) -> Option<Self> {
        match word.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(TradeAction::Buy),
            "SELL" => Some(TradeAction::Sell),
            "HOLD" => Some(TradeAction::Hold),
            _ => None,
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => f.write_str("BUY"),
            TradeAction::Sell => f.write_str("SELL"),
            TradeAction::Hold => f.write_str("HOLD"),
            TradeAction::Other(text) => f.write_str(text),
        }
    }
}

/// Why a run stopped before the risk manager spoke.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HaltReason {
    RecursionLimit { limit: u32 },
    Cancelled,
    TimedOut { after_seconds: u64 },
    MalformedOutput { role: AgentRole, attempts: u32 },
    AgentFailed { role: AgentRole, message: String },
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::RecursionLimit { limit } => {
                write!(f, "recursion limit of {limit} steps reached")
            }
            HaltReason::Cancelled => f.write_str("run was cancelled"),
            HaltReason::TimedOut { after_seconds } => {
                write!(f, "run timed out after {after_seconds}s")
            }
            HaltReason::MalformedOutput { role, attempts } => {
                write!(f, "{role} returned no usable content after {attempts} attempts")
            }
            HaltReason::AgentFailed { role, message } => write!(f, "{role} failed: {message}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Completion {
    Complete,
    Halted { reason: HaltReason },
}

impl Completion {
    pub fn is_complete(&self) -> bool {
        matches!(self, Completion::Complete)
    }
}

/// Both debate transcripts a decision was derived from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DebateTrace {
    pub investment: DebateLog,
    pub risk: DebateLog,
}

/// Terminal artifact of a run. Carries no clock or run-id values, so identical
/// inputs against deterministic collaborators produce equal decisions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Decision {
    pub ticker: String,
    pub trade_date: NaiveDate,
    pub action: TradeAction,
    pub rationale: String,
    pub trader_proposal: Option<String>,
    pub debate: DebateTrace,
    pub completion: Completion,
}

/// Full record of one run, returned alongside the decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunTrace {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Agent invocations consumed against the recursion limit.
    pub steps_used: u32,
    pub state: SharedState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_from_word() {
        assert_eq!(TradeAction::from_word("buy"), Some(TradeAction::Buy));
        assert_eq!(TradeAction::from_word(" SELL "), Some(TradeAction::Sell));
        assert_eq!(TradeAction::from_word("Hold"), Some(TradeAction::Hold));
        assert_eq!(TradeAction::from_word("short"), None);
    }

    #[test]
    fn action_display() {
        assert_eq!(TradeAction::Buy.to_string(), "BUY");
        assert_eq!(
            TradeAction::Other("scale in slowly".to_string()).to_string(),
            "scale in slowly"
        );
    }

    #[test]
    fn halted_completion_serializes_reason() {
        let completion = Completion::Halted {
            reason: HaltReason::RecursionLimit { limit: 5 },
        };
        let json = serde_json::to_value(&completion).unwrap();
        assert_eq!(json["status"], "halted");
        assert_eq!(json["reason"]["kind"], "recursion_limit");
        assert_eq!(json["reason"]["limit"], 5);
        assert!(!completion.is_complete());
    }

    #[test]
    fn halt_reason_messages() {
        let reason = HaltReason::MalformedOutput {
            role: AgentRole::Trader,
            attempts: 3,
        };
        assert_eq!(
            reason.to_string(),
            "trader returned no usable content after 3 attempts"
        );
    }

    #[test]
    fn decision_roundtrip() {
        let decision = Decision {
            ticker: "NVDA".to_string(),
            trade_date: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
            action: TradeAction::Hold,
            rationale: "Wait for earnings".to_string(),
            trader_proposal: None,
            debate: DebateTrace::default(),
            completion: Completion::Complete,
        };
        let json = serde_json::to_string(&decision).unwrap();
        let parsed: Decision = serde_json::from_str(&json).unwrap();
        assert_eq!(decision, parsed);
    }
}
