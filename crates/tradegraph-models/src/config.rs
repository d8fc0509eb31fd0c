use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent_message::ModelTier;
use crate::state::AnalystKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment variable {key}='{value}' cannot be converted to {expected}")]
    Env {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("Unsupported LLM provider: {0}")]
    UnsupportedProvider(String),

    #[error("Missing required credential(s): {}", .0.join(", "))]
    MissingCredentials(Vec<String>),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Top-level session configuration. Validated once, then shared read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub paths: PathsConfig,
    pub llm: LlmConfig,
    pub run: RunConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub results_dir: String,
    /// Root for persisted data; the cache and reflection stores live here
    /// unless their paths are set in `[cache]`.
    pub data_dir: String,
    /// Defaults to `{data_dir}/cache`.
    pub data_cache_dir: Option<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            results_dir: "./results".to_string(),
            data_dir: "data".to_string(),
            data_cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LlmProvider {
    #[serde(rename = "claude_cli")]
    ClaudeCli,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "google")]
    Google,
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "openrouter")]
    OpenRouter,
}

impl LlmProvider {
    pub const ALL: [LlmProvider; 6] = [
        LlmProvider::ClaudeCli,
        LlmProvider::OpenAi,
        LlmProvider::Anthropic,
        LlmProvider::Google,
        LlmProvider::Ollama,
        LlmProvider::OpenRouter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::ClaudeCli => "claude_cli",
            LlmProvider::OpenAi => "openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Google => "google",
            LlmProvider::Ollama => "ollama",
            LlmProvider::OpenRouter => "openrouter",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        LlmProvider::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnsupportedProvider(s.to_string()))
    }
}

/// LLM endpoint selection for the two model tiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Model for judge roles (research manager, risk manager).
    pub deep_think_model: String,
    /// Model for analysts, researchers, trader and risk debaters.
    pub quick_think_model: String,
    /// API endpoint override handed to the model client, if any.
    pub backend_url: Option<String>,
    /// Per-invocation timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::ClaudeCli,
            deep_think_model: "claude-sonnet-4-5-20250929".to_string(),
            quick_think_model: "claude-3-5-haiku-latest".to_string(),
            backend_url: None,
            timeout_seconds: 120,
        }
    }
}

impl LlmConfig {
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::DeepThink => &self.deep_think_model,
            ModelTier::QuickThink => &self.quick_think_model,
        }
    }
}

/// Round limits and run-level controls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    pub max_debate_rounds: u32,
    pub max_risk_discuss_rounds: u32,
    /// Global cap on agent invocations across the whole run.
    pub max_recursion_limit: u32,
    /// Live data collaborators when true, the cached equivalents otherwise.
    pub online_tools: bool,
    /// Re-asks allowed when an agent's final content is empty.
    pub max_output_retries: u32,
    pub run_timeout_seconds: Option<u64>,
    pub analysts: Vec<AnalystKind>,
    /// Analysts whose data-source connectivity failure aborts the run.
    pub required_analysts: Vec<AnalystKind>,
    pub look_back_days: u32,
    pub market_look_back_days: u32,
    pub memory_recall_limit: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_debate_rounds: 1,
            max_risk_discuss_rounds: 1,
            max_recursion_limit: 100,
            online_tools: true,
            max_output_retries: 2,
            run_timeout_seconds: None,
            analysts: AnalystKind::ALL.to_vec(),
            required_analysts: Vec::new(),
            look_back_days: 7,
            market_look_back_days: 30,
            memory_recall_limit: 2,
        }
    }
}

impl RunConfig {
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_seconds.map(Duration::from_secs)
    }
}

/// Configuration for the offline cache and the reflection store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// SQLite file holding cached data-source payloads.
    /// Defaults to `tradegraph_cache.db` in the data cache directory.
    pub sqlite_path: Option<String>,
    /// Maximum number of entries in the in-memory moka cache.
    pub memory_max_capacity: u64,
    /// How long a read stays in the moka cache, in seconds.
    pub memory_ttl_seconds: u64,
    /// SQLite file for reflections recorded after a run.
    /// Defaults to `tradegraph_memory.db` in the data directory.
    pub reflections_path: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sqlite_path: None,
            memory_max_capacity: 10_000,
            memory_ttl_seconds: 300,
            reflections_path: None,
        }
    }
}

pub mod env_keys {
    pub const RESULTS_DIR: &str = "TRADINGAGENTS_RESULTS_DIR";
    pub const DATA_DIR: &str = "TRADINGAGENTS_DATA_DIR";
    pub const LLM_PROVIDER: &str = "TRADINGAGENTS_LLM_PROVIDER";
    pub const DEEP_THINK_LLM: &str = "TRADINGAGENTS_DEEP_THINK_LLM";
    pub const QUICK_THINK_LLM: &str = "TRADINGAGENTS_QUICK_THINK_LLM";
    pub const BACKEND_URL: &str = "TRADINGAGENTS_BACKEND_URL";
    pub const MAX_DEBATE_ROUNDS: &str = "TRADINGAGENTS_MAX_DEBATE_ROUNDS";
    pub const MAX_RISK_DISCUSS_ROUNDS: &str = "TRADINGAGENTS_MAX_RISK_DISCUSS_ROUNDS";
    pub const MAX_RECUR_LIMIT: &str = "TRADINGAGENTS_MAX_RECUR_LIMIT";
    pub const ONLINE_TOOLS: &str = "TRADINGAGENTS_ONLINE_TOOLS";
}

fn env_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn env_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value: value.to_string(),
        expected: "a non-negative integer",
    })
}

impl SessionConfig {
    /// Overlay `TRADINGAGENTS_*` variables. `lookup` is usually `std::env::var(..).ok()`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get(env_keys::RESULTS_DIR) {
            self.paths.results_dir = v;
        }
        if let Some(v) = get(env_keys::DATA_DIR) {
            self.paths.data_dir = v;
        }
        if let Some(v) = get(env_keys::LLM_PROVIDER) {
            self.llm.provider = v.parse()?;
        }
        if let Some(v) = get(env_keys::DEEP_THINK_LLM) {
            self.llm.deep_think_model = v;
        }
        if let Some(v) = get(env_keys::QUICK_THINK_LLM) {
            self.llm.quick_think_model = v;
        }
        if let Some(v) = get(env_keys::BACKEND_URL) {
            self.llm.backend_url = Some(v);
        }
        if let Some(v) = get(env_keys::MAX_DEBATE_ROUNDS) {
            self.run.max_debate_rounds = env_u32(env_keys::MAX_DEBATE_ROUNDS, &v)?;
        }
        if let Some(v) = get(env_keys::MAX_RISK_DISCUSS_ROUNDS) {
            self.run.max_risk_discuss_rounds = env_u32(env_keys::MAX_RISK_DISCUSS_ROUNDS, &v)?;
        }
        if let Some(v) = get(env_keys::MAX_RECUR_LIMIT) {
            self.run.max_recursion_limit = env_u32(env_keys::MAX_RECUR_LIMIT, &v)?;
        }
        if let Some(v) = get(env_keys::ONLINE_TOOLS) {
            self.run.online_tools = env_bool(&v);
        }
        Ok(())
    }

    pub fn data_cache_dir(&self) -> PathBuf {
        match &self.paths.data_cache_dir {
            Some(dir) => PathBuf::from(dir),
            None => Path::new(&self.paths.data_dir).join("cache"),
        }
    }

    /// SQLite file read by the offline data collaborators.
    pub fn cache_db_path(&self) -> PathBuf {
        match &self.cache.sqlite_path {
            Some(path) => PathBuf::from(path),
            None => self.data_cache_dir().join("tradegraph_cache.db"),
        }
    }

    /// SQLite file of the reflection store.
    pub fn reflections_db_path(&self) -> PathBuf {
        match &self.cache.reflections_path {
            Some(path) => PathBuf::from(path),
            None => Path::new(&self.paths.data_dir).join("tradegraph_memory.db"),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, message: &str| ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.to_string(),
        };

        if self.run.max_recursion_limit == 0 {
            return Err(invalid("run.max_recursion_limit", "must be positive"));
        }
        if self.llm.deep_think_model.trim().is_empty() {
            return Err(invalid("llm.deep_think_model", "must not be empty"));
        }
        if self.llm.quick_think_model.trim().is_empty() {
            return Err(invalid("llm.quick_think_model", "must not be empty"));
        }
        if self.llm.timeout_seconds == 0 {
            return Err(invalid("llm.timeout_seconds", "must be positive"));
        }
        if self.run.analysts.is_empty() {
            return Err(invalid("run.analysts", "at least one analyst is required"));
        }
        if let Some(missing) = self
            .run
            .required_analysts
            .iter()
            .find(|a| !self.run.analysts.contains(a))
        {
            return Err(invalid(
                "run.required_analysts",
                &format!("'{missing}' is required but not enabled in run.analysts"),
            ));
        }
        if self.run.look_back_days == 0 || self.run.market_look_back_days == 0 {
            return Err(invalid("run.look_back_days", "look-back windows must be positive"));
        }
        if self.run.run_timeout_seconds == Some(0) {
            return Err(invalid("run.run_timeout_seconds", "must be positive when set"));
        }
        Ok(())
    }
}
