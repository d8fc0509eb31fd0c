use std::fmt;

use serde::{Deserialize, Serialize};

/// Which configured model an agent runs on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    DeepThink,
    QuickThink,
}

/// Every agent that takes part in a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    MarketAnalyst,
    FundamentalsAnalyst,
    NewsAnalyst,
    SocialAnalyst,
    BullResearcher,
    BearResearcher,
    ResearchManager,
    Trader,
    AggressiveDebator,
    ConservativeDebator,
    NeutralDebator,
    RiskManager,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::MarketAnalyst => "market_analyst",
            AgentRole::FundamentalsAnalyst => "fundamentals_analyst",
            AgentRole::NewsAnalyst => "news_analyst",
            AgentRole::SocialAnalyst => "social_analyst",
            AgentRole::BullResearcher => "bull_researcher",
            AgentRole::BearResearcher => "bear_researcher",
            AgentRole::ResearchManager => "research_manager",
            AgentRole::Trader => "trader",
            AgentRole::AggressiveDebator => "aggressive_debator",
            AgentRole::ConservativeDebator => "conservative_debator",
            AgentRole::NeutralDebator => "neutral_debator",
            AgentRole::RiskManager => "risk_manager",
        }
    }

    /// Judges reason on the deep-think model; everyone else on quick-think.
    pub fn tier(&self) -> ModelTier {
        match self {
            AgentRole::ResearchManager | AgentRole::RiskManager => ModelTier::DeepThink,
            _ => ModelTier::QuickThink,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by an agent turn. Lives only inside one agent's inner loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One entry of an agent's working context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: String::new(),
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// Description of a tool offered to an agent, in JSON-schema form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Everything an LLM client needs for a single agent turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRequest {
    pub role: AgentRole,
    pub tier: ModelTier,
    /// Model name resolved from the tier.
    pub model: String,
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn judges_use_deep_tier() {
        assert_eq!(AgentRole::ResearchManager.tier(), ModelTier::DeepThink);
        assert_eq!(AgentRole::RiskManager.tier(), ModelTier::DeepThink);
        assert_eq!(AgentRole::Trader.tier(), ModelTier::QuickThink);
        assert_eq!(AgentRole::BullResearcher.tier(), ModelTier::QuickThink);
    }

    #[test]
    fn role_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&AgentRole::AggressiveDebator).unwrap(),
            "\"aggressive_debator\""
        );
        assert_eq!(AgentRole::AggressiveDebator.to_string(), "aggressive_debator");
    }

    #[test]
    fn tool_result_message_skips_empty_calls() {
        let msg = ChatMessage::tool_result("call_0", "rows");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_0");
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn request_roundtrip_with_tools() {
        let request = AgentRequest {
            role: AgentRole::NewsAnalyst,
            tier: ModelTier::QuickThink,
            model: "quick".to_string(),
            system_prompt: "You are a news analyst".to_string(),
            messages: vec![
                ChatMessage::user("Analyze NVDA"),
                ChatMessage::assistant_tool_calls(vec![ToolCall {
                    id: "call_0".to_string(),
                    name: "get_news".to_string(),
                    arguments: serde_json::json!({"ticker": "NVDA"}),
                }]),
            ],
            tools: vec![ToolSpec {
                name: "get_news".to_string(),
                description: "Company news".to_string(),
                parameters: serde_json::json!({"type": "object"}),
            }],
        };

        let json = serde_json::to_string(&request).unwrap();
        let parsed: AgentRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(request, parsed);
    }
}
