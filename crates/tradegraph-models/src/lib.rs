pub mod agent_message;
pub mod cache_schema;
pub mod config;
pub mod credentials;
pub mod dates;
pub mod decision;
pub mod memory;
pub mod state;

pub use agent_message::{
    AgentRequest, AgentRole, ChatMessage, ChatRole, ModelTier, ToolCall, ToolSpec,
};
pub use cache_schema::{CacheCategory, CacheRow};
pub use config::{
    CacheConfig, ConfigError, LlmConfig, LlmProvider, PathsConfig, RunConfig, SessionConfig,
};
pub use credentials::{ApiKeys, KeyStatus};
pub use dates::{DateError, DateInput, DEFAULT_DATE_FORMAT};
pub use decision::{Completion, DebateTrace, Decision, HaltReason, RunTrace, TradeAction};
pub use memory::{MemoryRecord, Outcome};
pub use state::{AnalystKind, AnalystReport, DebateLog, DebateTurn, SharedState, Speaker, StateError};
