//! Tests that drive the real Claude CLI.
//!
//! Ignored by default. They need the `claude` CLI on PATH with working
//! credentials. Run explicitly with:
//! ```bash
//! cargo test -p tradegraph-agents --test cli_integration -- --ignored
//! ```

use std::time::Duration;

use tradegraph_agents::claude_cli::{check_cli_available, invoke_claude, ClaudeCliClient, ClaudeCliConfig};
use tradegraph_agents::resolver::{resolve, AgentOutput};
use tradegraph_agents::tools::{tools_for, GET_NEWS};
use tradegraph_agents::LlmClient;
use tradegraph_models::{AgentRequest, AgentRole, AnalystKind, ChatMessage, ModelTier};

const MODEL: &str = "claude-3-5-haiku-latest";

fn config(timeout_secs: u64) -> ClaudeCliConfig {
    ClaudeCliConfig {
        timeout: Duration::from_secs(timeout_secs),
        ..ClaudeCliConfig::default()
    }
}

#[tokio::test]
#[ignore]
async fn cli_is_available() {
    assert!(
        check_cli_available("claude").await,
        "claude CLI not found on PATH"
    );
}

/// A plain prompt comes back as a final answer with content.
#[tokio::test]
#[ignore]
async fn plain_answer_resolves_to_final() {
    if !check_cli_available("claude").await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let raw = invoke_claude(
        "You are a terse assistant. Answer with one word.",
        "Is the sky usually blue on a clear day? Answer yes or no.",
        MODEL,
        &config(30),
    )
    .await
    .expect("Claude CLI invocation failed");

    let output = resolve(&serde_json::Value::String(raw.clone()));
    assert!(
        matches!(output, AgentOutput::Final(Some(_))),
        "unexpected output shape:\n---\n{raw}\n---"
    );
}

/// With tools offered and no results yet, the model should ask for data in
/// the JSON shape the resolver understands.
#[tokio::test]
#[ignore]
async fn analyst_requests_tools_in_resolvable_shape() {
    if !check_cli_available("claude").await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let client = ClaudeCliClient::new(config(60));
    let request = AgentRequest {
        role: AgentRole::NewsAnalyst,
        tier: ModelTier::QuickThink,
        model: MODEL.to_string(),
        system_prompt: "You are a news analyst. Always fetch news with your tools before writing."
            .to_string(),
        messages: vec![ChatMessage::user(
            "Write the news report for NVDA as of 2024-05-10. Request the news first.",
        )],
        tools: tools_for(AnalystKind::News),
    };

    let raw = client.invoke(&request).await.expect("Claude CLI invocation failed");
    match resolve(&raw) {
        AgentOutput::ToolCalls(calls) => assert!(calls.iter().any(|c| c.name == GET_NEWS)),
        AgentOutput::Final(content) => panic!("expected a tool request, got final: {content:?}"),
    }
}

/// A nonexistent model makes the CLI exit non-zero, which must surface as an error.
#[tokio::test]
#[ignore]
async fn cli_reports_errors_for_invalid_model() {
    if !check_cli_available("claude").await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let result = invoke_claude("You are a test.", "hello", "nonexistent-model-12345", &config(15)).await;
    assert!(result.is_err(), "expected an error, got: {:?}", result.unwrap());
}
