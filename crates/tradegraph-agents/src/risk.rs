use tracing::info;
use tradegraph_models::{AgentRole, SharedState};

use crate::agent::{halt_for, AgentEnv};
use crate::counters::{DebateMachine, DebateStep};
use crate::error::StageError;
use crate::prompts::{debater_task, risk_manager_task};

/// Aggressive, conservative and neutral debaters speak in that order for
/// `max_rounds` full passes; the risk manager then issues the final decision.
pub async fn run_risk_debate(
    env: &AgentEnv,
    max_rounds: u32,
    state: &mut SharedState,
) -> Result<(), StageError> {
    let mut machine = DebateMachine::risk(max_rounds);

    while let DebateStep::Speak { round, speaker } = machine.current() {
        let role = speaker.role();
        let task = debater_task(speaker, state, env.lessons.for_role(role));
        let reply = env
            .run(role, task, Vec::new(), None)
            .await
            .map_err(|e| halt_for(role, e))?;

        state.risk_debate_mut().push(round, speaker, reply.content);
        machine.advance();
        state
            .risk_debate_mut()
            .mark_round_completed(machine.rounds_completed());
        info!(ticker = %state.ticker(), role = %role, round, "Risk debate turn");
    }

    let role = AgentRole::RiskManager;
    let task = risk_manager_task(state, env.lessons.for_role(role));
    let reply = env
        .run(role, task, Vec::new(), None)
        .await
        .map_err(|e| halt_for(role, e))?;
    state.set_final_decision(reply.content)?;

    info!(
        ticker = %state.ticker(),
        rounds = machine.rounds_completed(),
        "Risk debate judged"
    );
    Ok(())
}
