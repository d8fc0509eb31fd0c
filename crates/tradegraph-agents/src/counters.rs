use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tradegraph_models::{HaltReason, Speaker};

/// Global cap on agent invocations for one run, shared by every stage
/// (including analysts running in parallel).
#[derive(Debug, Clone)]
pub struct StepBudget {
    used: Arc<AtomicU32>,
    limit: u32,
}

impl StepBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            used: Arc::new(AtomicU32::new(0)),
            limit,
        }
    }

    /// Claim one step. Fails once `limit` steps have been taken.
    pub fn consume(&self) -> Result<u32, HaltReason> {
        let limit = self.limit;
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < limit).then_some(used + 1)
            })
            .map(|previous| previous + 1)
            .map_err(|_| HaltReason::RecursionLimit { limit })
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

/// Monotonic per-stage round counter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RoundCounter(u32);

impl RoundCounter {
    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn increment(&mut self) {
        self.0 += 1;
    }
}

pub const INVESTMENT_ORDER: &[Speaker] = &[Speaker::Bull, Speaker::Bear];
pub const RISK_ORDER: &[Speaker] = &[Speaker::Aggressive, Speaker::Conservative, Speaker::Neutral];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebateStep {
    Speak { round: u32, speaker: Speaker },
    Judge,
}

/// Fixed-rotation debate state machine.
///
/// A round is one full pass through `order`; the round counter advances only
/// after the last speaker of the rotation has spoken. Once the counter reaches
/// `max_rounds` the only remaining step is [`DebateStep::Judge`].
#[derive(Debug, Clone)]
pub struct DebateMachine {
    order: &'static [Speaker],
    max_rounds: u32,
    rounds: RoundCounter,
    cursor: usize,
}

impl DebateMachine {
    pub fn new(order: &'static [Speaker], max_rounds: u32) -> Self {
        Self {
            order,
            max_rounds,
            rounds: RoundCounter::default(),
            cursor: 0,
        }
    }

    pub fn investment(max_rounds: u32) -> Self {
        Self::new(INVESTMENT_ORDER, max_rounds)
    }

    pub fn risk(max_rounds: u32) -> Self {
        Self::new(RISK_ORDER, max_rounds)
    }

    pub fn current(&self) -> DebateStep {
        if self.rounds.value() >= self.max_rounds || self.order.is_empty() {
            DebateStep::Judge
        } else {
            DebateStep::Speak {
                round: self.rounds.value(),
                speaker: self.order[self.cursor],
            }
        }
    }

    /// Record that the current speaker has finished their turn.
    pub fn advance(&mut self) {
        if matches!(self.current(), DebateStep::Judge) {
            return;
        }
        self.cursor += 1;
        if self.cursor == self.order.len() {
            self.cursor = 0;
            self.rounds.increment();
        }
    }

    pub fn rounds_completed(&self) -> u32 {
        self.rounds.value()
    }
}
