use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::agent_message::AgentRole;
use crate::decision::TradeAction;

/// Direction of a realized return.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Gain,
    Loss,
    Flat,
}

impl Outcome {
    pub fn from_return(realized_return: Decimal) -> Self {
        if realized_return > Decimal::ZERO {
            Outcome::Gain
        } else if realized_return < Decimal::ZERO {
            Outcome::Loss
        } else {
            Outcome::Flat
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Gain => "gain",
            Outcome::Loss => "loss",
            Outcome::Flat => "flat",
        }
    }
}

/// A lesson recorded for one agent after a run's outcome is known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    pub role: AgentRole,
    pub ticker: String,
    pub trade_date: NaiveDate,
    /// Condensed market situation the agent faced.
    pub situation: String,
    /// What the agent argued or decided.
    pub statement: String,
    pub action: TradeAction,
    pub realized_return: Decimal,
    pub outcome: Outcome,
    pub recorded_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// One-paragraph lesson, as injected into a later run's context.
    pub fn lesson(&self) -> String {
        format!(
            "On {} for {} the final action was {} and the position returned {} ({}). You argued: {}",
            self.trade_date,
            self.ticker,
            self.action,
            self.realized_return,
            self.outcome.as_str(),
            self.statement
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn outcome_from_sign() {
        assert_eq!(Outcome::from_return(dec!(1000)), Outcome::Gain);
        assert_eq!(Outcome::from_return(dec!(-0.5)), Outcome::Loss);
        assert_eq!(Outcome::from_return(Decimal::ZERO), Outcome::Flat);
    }

    #[test]
    fn lesson_mentions_outcome() {
        let record = MemoryRecord {
            role: AgentRole::BullResearcher,
            ticker: "NVDA".to_string(),
            trade_date: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
            situation: "AI demand".to_string(),
            statement: "Data center growth".to_string(),
            action: TradeAction::Buy,
            realized_return: dec!(1000),
            outcome: Outcome::Gain,
            recorded_at: Utc::now(),
        };
        let lesson = record.lesson();
        assert!(lesson.contains("2024-05-10"));
        assert!(lesson.contains("BUY"));
        assert!(lesson.contains("1000 (gain)"));
    }
}
