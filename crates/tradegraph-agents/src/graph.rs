//! The graph driver: one `propagate` call runs analysts, the investment
//! debate, the trader and the risk debate in order over a fresh
//! [`SharedState`], and always ends in a [`Decision`] unless a fatal
//! prerequisite is missing.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tradegraph_cache::MemoryStore;
use tradegraph_models::dates::{parse_date, DEFAULT_DATE_FORMAT};
use tradegraph_models::{
    AgentRole, Completion, DebateTrace, Decision, MemoryRecord, Outcome, RunTrace, SessionConfig,
    SharedState, Speaker, TradeAction,
};
use uuid::Uuid;

use crate::agent::{AgentEnv, Lessons};
use crate::analysts::run_analysts;
use crate::context::RunContext;
use crate::error::{GraphError, StageError};
use crate::llm::LlmClient;
use crate::parser::extract_action;
use crate::researchers::run_investment_debate;
use crate::risk::run_risk_debate;
use crate::tools::{DataCollaborators, ToolDispatcher};
use crate::trader::run_trader;

/// Roles whose statements are reflected on after a run and recalled in later runs.
pub const REFLECTIVE_ROLES: [AgentRole; 5] = [
    AgentRole::BullResearcher,
    AgentRole::BearResearcher,
    AgentRole::Trader,
    AgentRole::ResearchManager,
    AgentRole::RiskManager,
];

struct CompletedRun {
    state: SharedState,
    decision: Decision,
}

pub struct TradingGraph {
    config: Arc<SessionConfig>,
    llm: Arc<dyn LlmClient>,
    data: Arc<dyn DataCollaborators>,
    memory: Arc<dyn MemoryStore>,
    cancel: CancellationToken,
    last_run: Mutex<Option<CompletedRun>>,
}

impl TradingGraph {
    /// Validates the session config; nothing runs if it is invalid.
    pub fn new(
        config: SessionConfig,
        llm: Arc<dyn LlmClient>,
        data: Arc<dyn DataCollaborators>,
        memory: Arc<dyn MemoryStore>,
    ) -> Result<Self, GraphError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            llm,
            data,
            memory,
            cancel: CancellationToken::new(),
            last_run: Mutex::new(None),
        })
    }

    /// Use an external cancel signal. Cancelling it stops every in-flight and
    /// future run of this graph.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Lessons from runs on earlier trade dates only.
    fn recall_lessons(&self, ticker: &str, trade_date: NaiveDate) -> Lessons {
        let mut lessons = Lessons::default();
        let limit = self.config.run.memory_recall_limit;
        if limit == 0 {
            return lessons;
        }
        for role in REFLECTIVE_ROLES {
            match self.memory.recall(ticker, role, trade_date, limit) {
                Ok(records) => lessons.insert(role, records.iter().map(MemoryRecord::lesson).collect()),
                Err(e) => warn!(ticker, role = %role, error = %e, "Could not recall past lessons"),
            }
        }
        lessons
    }

    /// Run the full pipeline for `ticker` on `date` (`YYYY-MM-DD`).
    ///
    /// Recursion-limit exhaustion, cancellation, timeouts and agents that fail
    /// to produce content all end the run early with a best-effort decision
    /// marked as halted. Only invalid input and unreachable data sources for
    /// required analysts (or all analysts) are errors.
    pub async fn propagate(&self, ticker: &str, date: &str) -> Result<(RunTrace, Decision), GraphError> {
        let ticker = normalize_ticker(ticker)?;
        let trade_date = parse_date(date.trim(), DEFAULT_DATE_FORMAT)
            .map_err(|e| GraphError::InvalidInput(e.to_string()))?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        let run = &self.config.run;
        info!(%run_id, ticker = %ticker, %trade_date, llm = self.llm.name(), data = self.data.name(), "Starting run");

        let env = AgentEnv {
            llm: Arc::clone(&self.llm),
            llm_config: Arc::new(self.config.llm.clone()),
            ctx: RunContext::new(run.max_recursion_limit, self.cancel.child_token(), run.run_timeout()),
            lessons: Arc::new(self.recall_lessons(&ticker, trade_date)),
            max_output_retries: run.max_output_retries,
        };
        let dispatcher = ToolDispatcher::new(
            Arc::clone(&self.data),
            ticker.clone(),
            trade_date,
            run.look_back_days,
            run.market_look_back_days,
        );

        let mut state = SharedState::new(ticker.clone(), trade_date);
        let completion = match self.run_stages(&env, &dispatcher, &mut state).await {
            Ok(()) => Completion::Complete,
            Err(StageError::Halt(reason)) => {
                warn!(%run_id, ticker = %ticker, reason = %reason, steps = env.ctx.steps_used(), "Run halted");
                Completion::Halted { reason }
            }
            Err(StageError::Fatal(err)) => {
                error!(%run_id, ticker = %ticker, error = %err, "Run failed");
                return Err(err);
            }
        };

        let decision = synthesize_decision(&state, completion);
        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            %run_id,
            ticker = %ticker,
            action = %decision.action,
            complete = decision.completion.is_complete(),
            steps = env.ctx.steps_used(),
            elapsed_ms,
            "Run finished"
        );

        let trace = RunTrace {
            run_id,
            started_at,
            elapsed_ms,
            steps_used: env.ctx.steps_used(),
            state: state.clone(),
        };
        *self.last_run.lock().unwrap_or_else(|e| e.into_inner()) = Some(CompletedRun {
            state,
            decision: decision.clone(),
        });
        Ok((trace, decision))
    }

    async fn run_stages(
        &self,
        env: &AgentEnv,
        dispatcher: &ToolDispatcher,
        state: &mut SharedState,
    ) -> Result<(), StageError> {
        let run = &self.config.run;
        run_analysts(env, dispatcher, &run.analysts, &run.required_analysts, state).await?;
        run_investment_debate(env, run.max_debate_rounds, state).await?;
        run_trader(env, state).await?;
        run_risk_debate(env, run.max_risk_discuss_rounds, state).await?;
        Ok(())
    }

    /// Record the realized return of the most recent run against each
    /// reflective role's final statement. Returns the number of records stored.
    pub fn reflect_and_remember(&self, realized_return: Decimal) -> Result<usize, GraphError> {
        let guard = self.last_run.lock().unwrap_or_else(|e| e.into_inner());
        let run = guard.as_ref().ok_or(GraphError::NoCompletedRun)?;

        let situation = run.state.reports_digest();
        let outcome = Outcome::from_return(realized_return);
        let recorded_at = Utc::now();

        let records: Vec<MemoryRecord> = REFLECTIVE_ROLES
            .into_iter()
            .filter_map(|role| {
                let statement = final_statement(&run.state, role)?;
                Some(MemoryRecord {
                    role,
                    ticker: run.decision.ticker.clone(),
                    trade_date: run.decision.trade_date,
                    situation: situation.clone(),
                    statement,
                    action: run.decision.action.clone(),
                    realized_return,
                    outcome,
                    recorded_at,
                })
            })
            .collect();

        self.memory.record(&records)?;
        info!(
            ticker = %run.decision.ticker,
            realized_return = %realized_return,
            outcome = outcome.as_str(),
            records = records.len(),
            "Recorded reflections"
        );
        Ok(records.len())
    }
}

fn normalize_ticker(raw: &str) -> Result<String, GraphError> {
    let ticker = raw.trim();
    if ticker.is_empty() {
        return Err(GraphError::InvalidInput("ticker must not be empty".to_string()));
    }
    if !ticker
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='))
    {
        return Err(GraphError::InvalidInput(format!("'{ticker}' is not a valid ticker")));
    }
    Ok(ticker.to_ascii_uppercase())
}

fn final_statement(state: &SharedState, role: AgentRole) -> Option<String> {
    let text = match role {
        AgentRole::BullResearcher => state
            .investment_debate()
            .latest_by(Speaker::Bull)
            .map(|t| t.content.as_str()),
        AgentRole::BearResearcher => state
            .investment_debate()
            .latest_by(Speaker::Bear)
            .map(|t| t.content.as_str()),
        AgentRole::ResearchManager => state.investment_plan(),
        AgentRole::Trader => state.trader_plan(),
        AgentRole::RiskManager => state.final_decision(),
        _ => None,
    };
    text.map(str::to_string)
}

/// Build the decision from whatever the run produced. The risk manager's
/// statement wins; a halted run falls back to the trader's proposal, then the
/// investment plan, then HOLD.
pub fn synthesize_decision(state: &SharedState, completion: Completion) -> Decision {
    let halted = match &completion {
        Completion::Halted { reason } => reason.to_string(),
        Completion::Complete => "run ended early".to_string(),
    };

    let (action, rationale) = if let Some(text) = state.final_decision() {
        (extract_action(text), text.to_string())
    } else if let Some(plan) = state.trader_plan() {
        (
            extract_action(plan),
            format!("Run stopped before the risk review ({halted}); using the trader's proposal.\n\n{plan}"),
        )
    } else if let Some(plan) = state.investment_plan() {
        (
            extract_action(plan),
            format!("Run stopped before the trader decided ({halted}); using the research manager's plan.\n\n{plan}"),
        )
    } else {
        (
            TradeAction::Hold,
            format!("Run stopped before any plan was produced ({halted}); defaulting to HOLD."),
        )
    };

    Decision {
        ticker: state.ticker().to_string(),
        trade_date: state.trade_date(),
        action,
        rationale,
        trader_proposal: state.trader_plan().map(str::to_string),
        debate: DebateTrace {
            investment: state.investment_debate().clone(),
            risk: state.risk_debate().clone(),
        },
        completion,
    }
}
