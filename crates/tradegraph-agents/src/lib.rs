pub mod agent;
pub mod analysts;
pub mod claude_cli;
pub mod context;
pub mod counters;
pub mod error;
pub mod graph;
pub mod llm;
pub mod parser;
pub mod prompts;
pub mod researchers;
pub mod resolver;
pub mod risk;
pub mod tools;
pub mod trader;

pub mod test_support;

pub use claude_cli::{ClaudeCliClient, ClaudeCliConfig};
pub use context::RunContext;
pub use error::{AgentError, DataError, GraphError};
pub use graph::{synthesize_decision, TradingGraph};
pub use llm::LlmClient;
pub use resolver::{resolve, AgentOutput};
pub use tools::{
    CachedDataSource, DataCollaborators, DataPayload, DataRouter, DateRange, OnlineDataSource,
};
