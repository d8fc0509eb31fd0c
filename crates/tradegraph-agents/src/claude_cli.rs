use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};
use tradegraph_models::{AgentRequest, ChatRole};

use crate::error::AgentError;
use crate::llm::LlmClient;

/// Configuration for Claude CLI invocations.
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    /// Executable to run; `claude` on PATH by default.
    pub program: String,
    pub timeout: Duration,
    /// Passed to the CLI as `ANTHROPIC_BASE_URL` when set.
    pub base_url: Option<String>,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            timeout: Duration::from_secs(120),
            base_url: None,
        }
    }
}

fn command(system_prompt: &str, user_prompt: &str, model: &str, config: &ClaudeCliConfig) -> Command {
    let mut cmd = Command::new(&config.program);
    cmd.args([
        "-p",
        user_prompt,
        "--system-prompt",
        system_prompt,
        "--model",
        model,
        "--output-format",
        "text",
    ])
    .kill_on_drop(true);
    if let Some(url) = &config.base_url {
        cmd.env("ANTHROPIC_BASE_URL", url);
    }
    cmd
}

/// Invoke the `claude` CLI with a system prompt and user prompt.
/// Returns the raw stdout text.
pub async fn invoke_claude(
    system_prompt: &str,
    user_prompt: &str,
    model: &str,
    config: &ClaudeCliConfig,
) -> Result<String, AgentError> {
    debug!(model, "Invoking claude CLI");

    let mut cmd = command(system_prompt, user_prompt, model, config);
    let result = tokio::time::timeout(config.timeout, cmd.output())
        .await
        .map_err(|_| AgentError::Timeout(config.timeout.as_secs()))?
        .map_err(|e| AgentError::Cli(format!("Failed to spawn {}: {e}", config.program)))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        warn!(status = %result.status, stderr = %stderr, "Claude CLI failed");
        return Err(AgentError::Cli(format!(
            "claude exited {}: {}",
            result.status, stderr
        )));
    }

    Ok(String::from_utf8_lossy(&result.stdout).to_string())
}

/// Check if the `claude` CLI is available on the system.
pub async fn check_cli_available(program: &str) -> bool {
    match Command::new(program).arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Tool-use instructions appended to the system prompt, since the CLI has no
/// native function-calling channel for our tools.
fn tool_instructions(request: &AgentRequest) -> Option<String> {
    if request.tools.is_empty() {
        return None;
    }
    let catalogue = request
        .tools
        .iter()
        .map(|t| format!("- {}: {}\n  parameters: {}", t.name, t.description, t.parameters))
        .collect::<Vec<_>>()
        .join("\n");

    Some(format!(
        "## TOOLS\n\n\
         You can request data with these tools:\n{catalogue}\n\n\
         To call tools, reply with ONLY a JSON object and nothing else:\n\
         {{\"tool_calls\": [{{\"name\": \"<tool>\", \"arguments\": {{...}}}}]}}\n\
         Tool results will be sent back to you. When you have enough information, \
         reply with your final report as plain text and no JSON."
    ))
}

/// Flatten the conversation into a single prompt for `claude -p`.
pub fn render_transcript(request: &AgentRequest) -> String {
    request
        .messages
        .iter()
        .map(|m| match m.role {
            ChatRole::User => m.content.clone(),
            ChatRole::Assistant if !m.tool_calls.is_empty() => {
                let calls = serde_json::json!({ "tool_calls": m.tool_calls });
                format!("[Your previous reply]\n{calls}")
            }
            ChatRole::Assistant => format!("[Your previous reply]\n{}", m.content),
            ChatRole::Tool => format!(
                "[Tool result {}]\n{}",
                m.tool_call_id.as_deref().unwrap_or("?"),
                m.content
            ),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// [`LlmClient`] backed by the local Claude CLI.
pub struct ClaudeCliClient {
    config: ClaudeCliConfig,
}

impl ClaudeCliClient {
    pub fn new(config: ClaudeCliConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LlmClient for ClaudeCliClient {
    fn name(&self) -> &str {
        "claude_cli"
    }

    async fn invoke(&self, request: &AgentRequest) -> Result<serde_json::Value, AgentError> {
        let system_prompt = match tool_instructions(request) {
            Some(tools) => format!("{}\n\n{tools}", request.system_prompt),
            None => request.system_prompt.clone(),
        };
        let user_prompt = render_transcript(request);

        let raw = invoke_claude(&system_prompt, &user_prompt, &request.model, &self.config).await?;
        Ok(serde_json::Value::String(raw))
    }
}
