use async_trait::async_trait;
use tradegraph_models::AgentRequest;

use crate::error::AgentError;

/// Capability to run one agent turn on a language model.
///
/// Implementations return the model's raw output in whatever shape the
/// provider produces; [`crate::resolver::resolve`] classifies it.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, request: &AgentRequest) -> Result<serde_json::Value, AgentError>;
}
