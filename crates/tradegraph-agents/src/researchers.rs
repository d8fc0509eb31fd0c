use tracing::info;
use tradegraph_models::{AgentRole, SharedState};

use crate::agent::{halt_for, AgentEnv};
use crate::counters::{DebateMachine, DebateStep};
use crate::error::StageError;
use crate::prompts::{debater_task, research_manager_task};

/// Bull and bear alternate, bull first, for `max_rounds` rounds; then the
/// research manager judges the full history and writes the investment plan.
pub async fn run_investment_debate(
    env: &AgentEnv,
    max_rounds: u32,
    state: &mut SharedState,
) -> Result<(), StageError> {
    let mut machine = DebateMachine::investment(max_rounds);

    while let DebateStep::Speak { round, speaker } = machine.current() {
        let role = speaker.role();
        let task = debater_task(speaker, state, env.lessons.for_role(role));
        let reply = env
            .run(role, task, Vec::new(), None)
            .await
            .map_err(|e| halt_for(role, e))?;

        state.investment_debate_mut().push(round, speaker, reply.content);
        machine.advance();
        state
            .investment_debate_mut()
            .mark_round_completed(machine.rounds_completed());
        info!(ticker = %state.ticker(), role = %role, round, "Investment debate turn");
    }

    let role = AgentRole::ResearchManager;
    let task = research_manager_task(state, env.lessons.for_role(role));
    let reply = env
        .run(role, task, Vec::new(), None)
        .await
        .map_err(|e| halt_for(role, e))?;
    state.set_investment_plan(reply.content)?;

    info!(
        ticker = %state.ticker(),
        rounds = machine.rounds_completed(),
        "Investment debate judged"
    );
    Ok(())
}
