//! The inner loop shared by every agent: invoke the model, run any tool calls
//! it asks for, feed the results back, and stop at the first turn with content.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use tradegraph_models::{AgentRequest, AgentRole, ChatMessage, HaltReason, LlmConfig, ToolSpec};

use crate::context::RunContext;
use crate::error::TurnError;
use crate::llm::LlmClient;
use crate::prompts::{system_prompt, EMPTY_REPLY_NUDGE};
use crate::resolver::{resolve, AgentOutput};
use crate::tools::{ToolDispatcher, ToolOutcome};

/// Final content of an agent invocation plus what its tool calls yielded.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub content: String,
    pub tool_calls: u32,
    /// Tool calls that came back with at least one row or some text.
    pub tool_results_with_data: u32,
}

impl AgentReply {
    /// Tools were called but every one of them came back empty.
    pub fn saw_only_empty_data(&self) -> bool {
        self.tool_calls > 0 && self.tool_results_with_data == 0
    }
}

/// Past-decision lessons recalled at the start of a run, keyed by role.
#[derive(Debug, Clone, Default)]
pub struct Lessons(HashMap<AgentRole, Vec<String>>);

impl Lessons {
    pub fn insert(&mut self, role: AgentRole, lessons: Vec<String>) {
        if !lessons.is_empty() {
            self.0.insert(role, lessons);
        }
    }

    pub fn for_role(&self, role: AgentRole) -> &[String] {
        self.0.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Everything a stage needs to invoke agents within one run.
#[derive(Clone)]
pub struct AgentEnv {
    pub llm: Arc<dyn LlmClient>,
    pub llm_config: Arc<LlmConfig>,
    pub ctx: RunContext,
    pub lessons: Arc<Lessons>,
    pub max_output_retries: u32,
}

impl AgentEnv {
    fn request(&self, role: AgentRole, task: String, tools: Vec<ToolSpec>) -> AgentRequest {
        let tier = role.tier();
        AgentRequest {
            role,
            tier,
            model: self.llm_config.model_for(tier).to_string(),
            system_prompt: system_prompt(role),
            messages: vec![ChatMessage::user(task)],
            tools,
        }
    }

    /// Run one agent to completion.
    ///
    /// Each model call claims one step of the run budget. A final turn with no
    /// text is retried with a nudge up to `max_output_retries` times.
    pub async fn run(
        &self,
        role: AgentRole,
        task: String,
        tools: Vec<ToolSpec>,
        dispatcher: Option<&ToolDispatcher>,
    ) -> Result<AgentReply, TurnError> {
        let start = Instant::now();
        let mut request = self.request(role, task, tools);
        let mut empty_replies = 0u32;
        let mut tool_calls = 0u32;
        let mut tool_results_with_data = 0u32;

        loop {
            let step = self.ctx.begin_step()?;
            debug!(role = %role, step, model = %request.model, "Invoking agent");

            let raw = self
                .ctx
                .guard(self.llm.invoke(&request))
                .await?
                .map_err(TurnError::Llm)?;

            match resolve(&raw) {
                AgentOutput::Final(Some(content)) => {
                    info!(
                        role = %role,
                        step,
                        tool_calls,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Agent finished"
                    );
                    return Ok(AgentReply {
                        content,
                        tool_calls,
                        tool_results_with_data,
                    });
                }
                AgentOutput::Final(None) => {
                    empty_replies += 1;
                    if empty_replies > self.max_output_retries {
                        warn!(role = %role, attempts = empty_replies, "Agent gave no usable content");
                        return Err(TurnError::Malformed {
                            attempts: empty_replies,
                        });
                    }
                    warn!(role = %role, attempt = empty_replies, "Empty agent reply, retrying");
                    request.messages.push(ChatMessage::user(EMPTY_REPLY_NUDGE));
                }
                AgentOutput::ToolCalls(calls) => {
                    request
                        .messages
                        .push(ChatMessage::assistant_tool_calls(calls.clone()));
                    for call in &calls {
                        self.ctx.checkpoint()?;
                        tool_calls += 1;
                        let outcome = match dispatcher {
                            Some(d) => self.ctx.guard(d.dispatch(call)).await?,
                            None => ToolOutcome::Rejected(format!("{role} has no tools available")),
                        };
                        let result = match outcome {
                            ToolOutcome::Data(payload) => {
                                if !payload.is_empty() {
                                    tool_results_with_data += 1;
                                }
                                payload.render()
                            }
                            ToolOutcome::Rejected(message) => format!("ERROR: {message}"),
                            ToolOutcome::Failed(err) => {
                                warn!(role = %role, tool = %call.name, error = %err, "Data source failed");
                                return Err(TurnError::Data(err));
                            }
                        };
                        request
                            .messages
                            .push(ChatMessage::tool_result(call.id.clone(), result));
                    }
                }
            }
        }
    }
}

/// Turn errors outside the analyst stage become halts for `role`.
pub fn halt_for(role: AgentRole, err: TurnError) -> HaltReason {
    match err {
        TurnError::Halt(reason) => reason,
        TurnError::Malformed { attempts } => HaltReason::MalformedOutput { role, attempts },
        TurnError::Llm(e) => HaltReason::AgentFailed {
            role,
            message: e.to_string(),
        },
        TurnError::Data(e) => HaltReason::AgentFailed {
            role,
            message: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedLlm, StubData};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use tradegraph_models::AnalystKind;

    fn env(llm: ScriptedLlm, steps: u32, retries: u32) -> AgentEnv {
        AgentEnv {
            llm: Arc::new(llm),
            llm_config: Arc::new(LlmConfig::default()),
            ctx: RunContext::new(steps, CancellationToken::new(), None),
            lessons: Arc::new(Lessons::default()),
            max_output_retries: retries,
        }
    }

    fn dispatcher(data: StubData) -> ToolDispatcher {
        ToolDispatcher::new(
            Arc::new(data),
            "NVDA",
            chrono::NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
            7,
            30,
        )
    }

    #[tokio::test]
    async fn plain_answer_takes_one_step() {
        let env = env(
            ScriptedLlm::new().respond(AgentRole::BullResearcher, vec![json!("Buy the dip")]),
            10,
            2,
        );
        let reply = env
            .run(AgentRole::BullResearcher, "argue".to_string(), vec![], None)
            .await
            .unwrap();
        assert_eq!(reply.content, "Buy the dip");
        assert_eq!(reply.tool_calls, 0);
        assert_eq!(env.ctx.steps_used(), 1);
    }

    #[tokio::test]
    async fn tool_round_trip_counts_steps_and_data() {
        let llm = ScriptedLlm::new();
        let calls = llm.clone();
        let env = env(llm, 10, 2);
        let d = dispatcher(StubData::nvda());
        let reply = env
            .run(
                AgentRole::MarketAnalyst,
                "analyze".to_string(),
                crate::tools::tools_for(AnalystKind::Market),
                Some(&d),
            )
            .await
            .unwrap();
        assert!(reply.content.contains("uptrend"), "{}", reply.content);
        assert_eq!(reply.tool_calls, 1);
        assert_eq!(reply.tool_results_with_data, 1);
        assert_eq!(env.ctx.steps_used(), 2);

        // the second request carried the tool result back to the model
        let requests = calls.requests_for(AgentRole::MarketAnalyst);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn empty_replies_are_retried_then_malformed() {
        let env = env(
            ScriptedLlm::new().respond(AgentRole::Trader, vec![json!(""), json!({"content": "  "}), json!(null)]),
            10,
            2,
        );
        let err = env
            .run(AgentRole::Trader, "trade".to_string(), vec![], None)
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Malformed { attempts: 3 }));
        assert_eq!(env.ctx.steps_used(), 3);
        assert_eq!(
            halt_for(AgentRole::Trader, err),
            HaltReason::MalformedOutput {
                role: AgentRole::Trader,
                attempts: 3
            }
        );
    }

    #[tokio::test]
    async fn retry_recovers_when_content_arrives() {
        let env = env(
            ScriptedLlm::new().respond(AgentRole::Trader, vec![json!(""), json!("HOLD for now")]),
            10,
            1,
        );
        let reply = env
            .run(AgentRole::Trader, "trade".to_string(), vec![], None)
            .await
            .unwrap();
        assert_eq!(reply.content, "HOLD for now");
    }

    #[tokio::test]
    async fn budget_exhaustion_halts() {
        let env = env(ScriptedLlm::new(), 1, 2);
        let d = dispatcher(StubData::nvda());
        let err = env
            .run(
                AgentRole::MarketAnalyst,
                "analyze".to_string(),
                crate::tools::tools_for(AnalystKind::Market),
                Some(&d),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TurnError::Halt(HaltReason::RecursionLimit { limit: 1 })
        ));
    }

    #[tokio::test]
    async fn unreachable_source_is_data_error() {
        let env = env(ScriptedLlm::new(), 10, 2);
        let d = dispatcher(StubData::nvda().unreachable(AnalystKind::News));
        let err = env
            .run(
                AgentRole::NewsAnalyst,
                "analyze".to_string(),
                crate::tools::tools_for(AnalystKind::News),
                Some(&d),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Data(_)));
    }

    #[test]
    fn lessons_default_to_empty() {
        let mut lessons = Lessons::default();
        lessons.insert(AgentRole::Trader, vec!["Sold too early".to_string()]);
        lessons.insert(AgentRole::BullResearcher, vec![]);
        assert_eq!(lessons.for_role(AgentRole::Trader).len(), 1);
        assert!(lessons.for_role(AgentRole::BullResearcher).is_empty());
    }
}
