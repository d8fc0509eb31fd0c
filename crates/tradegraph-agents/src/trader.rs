use tracing::info;
use tradegraph_models::{AgentRole, SharedState};

use crate::agent::{halt_for, AgentEnv};
use crate::error::StageError;
use crate::parser::extract_action;
use crate::prompts::trader_task;

/// Turn the investment plan into the trader's proposal. Exactly one proposal
/// is accepted; empty content after the retry budget halts the run.
pub async fn run_trader(env: &AgentEnv, state: &mut SharedState) -> Result<(), StageError> {
    let role = AgentRole::Trader;
    let task = trader_task(state, env.lessons.for_role(role));
    let reply = env
        .run(role, task, Vec::new(), None)
        .await
        .map_err(|e| halt_for(role, e))?;

    info!(
        ticker = %state.ticker(),
        action = %extract_action(&reply.content),
        "Trader proposal"
    );
    state.set_trader_plan(reply.content)?;
    Ok(())
}
