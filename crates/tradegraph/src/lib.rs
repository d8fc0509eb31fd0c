//! TradeGraph - multi-agent trading decisions
//!
//! Analyst agents gather market, fundamentals, news and sentiment data; bull
//! and bear researchers debate the case; a trader proposes a transaction; and
//! a three-way risk debate ends in a judged final decision.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use tradegraph::models::ApiKeys;
//! use tradegraph::{build_graph, load_config, ConfigOverrides};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = load_config(None, &ConfigOverrides::default())?;
//! let graph = build_graph(config, &ApiKeys::from_env())?;
//! let (_trace, decision) = graph.propagate("NVDA", "2024-05-10").await?;
//! println!("{}", decision.action);
//! # Ok(())
//! # }
//! ```

pub use tradegraph_agents as agents;
pub use tradegraph_cache as cache;
pub use tradegraph_models as models;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tradegraph_agents::{
    CachedDataSource, ClaudeCliClient, ClaudeCliConfig, DataCollaborators, DataRouter, LlmClient,
    OnlineDataSource, TradingGraph,
};
use tradegraph_cache::{CacheReader, SqliteCache, SqliteReflectionStore};
use tradegraph_models::credentials::FINNHUB_API_KEY;
use tradegraph_models::{ApiKeys, ConfigError, Decision, LlmProvider, RunTrace, SessionConfig};

/// Command-line level settings applied after the config file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub max_debate_rounds: Option<u32>,
    pub max_risk_discuss_rounds: Option<u32>,
    pub online_tools: Option<bool>,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut SessionConfig) {
        if let Some(n) = self.max_debate_rounds {
            config.run.max_debate_rounds = n;
        }
        if let Some(n) = self.max_risk_discuss_rounds {
            config.run.max_risk_discuss_rounds = n;
        }
        if let Some(online) = self.online_tools {
            config.run.online_tools = online;
        }
    }
}

/// Layer defaults, the TOML file, `TRADINGAGENTS_*` variables from `lookup`
/// and `overrides`, in that order, then validate.
pub fn load_config_with<F>(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
    lookup: F,
) -> anyhow::Result<SessionConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            toml::from_str::<SessionConfig>(&text)
                .map_err(|e| ConfigError::Parse(e.to_string()))
                .with_context(|| format!("Invalid config file: {}", path.display()))?
        }
        None => SessionConfig::default(),
    };
    config.apply_env(lookup)?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// [`load_config_with`] over the process environment, after loading `.env`.
pub fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> anyhow::Result<SessionConfig> {
    dotenv::dotenv().ok();
    load_config_with(path, overrides, |key| std::env::var(key).ok())
}

/// The built-in model client for the configured provider.
pub fn default_llm(config: &SessionConfig) -> Result<Arc<dyn LlmClient>, ConfigError> {
    match config.llm.provider {
        LlmProvider::ClaudeCli => Ok(Arc::new(ClaudeCliClient::new(ClaudeCliConfig {
            timeout: Duration::from_secs(config.llm.timeout_seconds),
            base_url: config.llm.backend_url.clone(),
            ..ClaudeCliConfig::default()
        }))),
        other => Err(ConfigError::UnsupportedProvider(format!(
            "{other} has no built-in client; supply an LlmClient with build_graph_with"
        ))),
    }
}

fn offline_source(config: &SessionConfig) -> anyhow::Result<CachedDataSource> {
    let path = config.cache_db_path();
    let sqlite = if path.exists() {
        info!(path = %path.display(), "Opening data cache");
        SqliteCache::open(&path)
            .with_context(|| format!("Failed to open data cache: {}", path.display()))?
    } else {
        if !config.run.online_tools {
            warn!(path = %path.display(), "Data cache not found; offline tools will return no data");
        }
        SqliteCache::open_in_memory()?
    };
    let reader = CacheReader::new(
        sqlite,
        config.cache.memory_max_capacity,
        Duration::from_secs(config.cache.memory_ttl_seconds),
    );
    Ok(CachedDataSource::new(Arc::new(reader)))
}

/// Wire data collaborators and the reflection store around `llm`.
pub fn build_graph_with(
    config: SessionConfig,
    keys: &ApiKeys,
    llm: Arc<dyn LlmClient>,
) -> anyhow::Result<TradingGraph> {
    keys.validate(config.llm.provider, config.run.online_tools)?;

    let offline: Arc<dyn DataCollaborators> = Arc::new(offline_source(&config)?);
    let online: Option<Arc<dyn DataCollaborators>> = match keys.get(FINNHUB_API_KEY) {
        Some(key) if config.run.online_tools => {
            let client = OnlineDataSource::default_client()?;
            Some(Arc::new(OnlineDataSource::new(client, key)))
        }
        _ => None,
    };
    let data = Arc::new(DataRouter::new(config.run.online_tools, online, offline));

    let memory_path = config.reflections_db_path();
    let memory = Arc::new(
        SqliteReflectionStore::open(&memory_path).with_context(|| {
            format!("Failed to open reflection store: {}", memory_path.display())
        })?,
    );

    info!(
        provider = %config.llm.provider,
        data = data.name(),
        "Trading graph ready"
    );
    Ok(TradingGraph::new(config, llm, data, memory)?)
}

/// Build a graph with the built-in client for the configured provider.
pub fn build_graph(config: SessionConfig, keys: &ApiKeys) -> anyhow::Result<TradingGraph> {
    let llm = default_llm(&config)?;
    build_graph_with(config, keys, llm)
}

/// Write the decision and trace under `results_dir/{ticker}/{date}.json`.
pub fn save_result(
    config: &SessionConfig,
    trace: &RunTrace,
    decision: &Decision,
) -> anyhow::Result<PathBuf> {
    let dir = Path::new(&config.paths.results_dir).join(&decision.ticker);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create results directory: {}", dir.display()))?;
    let path = dir.join(format!("{}.json", decision.trade_date));
    let body = serde_json::json!({ "decision": decision, "trace": trace });
    std::fs::write(&path, serde_json::to_string_pretty(&body)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tradegraph_agents::test_support::ScriptedLlm;
    use tradegraph_models::{AnalystKind, CacheCategory};

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let config = load_config_with(None, &ConfigOverrides::default(), env(&[])).unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn layers_apply_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tradegraph.toml");
        std::fs::write(
            &path,
            "[run]\nmax_debate_rounds = 3\nmax_risk_discuss_rounds = 2\nonline_tools = false\n\n\
             [llm]\nquick_think_model = \"from-file\"\n",
        )
        .unwrap();

        let overrides = ConfigOverrides {
            max_risk_discuss_rounds: Some(4),
            ..ConfigOverrides::default()
        };
        let config = load_config_with(
            Some(&path),
            &overrides,
            env(&[
                ("TRADINGAGENTS_MAX_DEBATE_ROUNDS", "5"),
                ("TRADINGAGENTS_MAX_RISK_DISCUSS_ROUNDS", "1"),
            ]),
        )
        .unwrap();

        assert_eq!(config.run.max_debate_rounds, 5);
        assert_eq!(config.run.max_risk_discuss_rounds, 4);
        assert!(!config.run.online_tools);
        assert_eq!(config.llm.quick_think_model, "from-file");
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/tradegraph.toml");
        let config = load_config_with(Some(&path), &ConfigOverrides::default(), env(&[])).unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn bad_inputs_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[run]\nmax_debate_rounds = \"many\"\n").unwrap();
        let err = load_config_with(Some(&path), &ConfigOverrides::default(), env(&[])).unwrap_err();
        assert!(err.to_string().contains("bad.toml"), "{err}");

        let err = load_config_with(
            None,
            &ConfigOverrides::default(),
            env(&[("TRADINGAGENTS_MAX_RECUR_LIMIT", "lots")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("TRADINGAGENTS_MAX_RECUR_LIMIT"), "{err}");

        let missing = dir.path().join("missing.toml");
        assert!(load_config_with(Some(&missing), &ConfigOverrides::default(), env(&[])).is_err());
    }

    #[test]
    fn non_cli_providers_need_an_injected_client() {
        let mut config = SessionConfig::default();
        assert!(default_llm(&config).is_ok());
        config.llm.provider = LlmProvider::OpenAi;
        assert!(matches!(
            default_llm(&config),
            Err(ConfigError::UnsupportedProvider(_))
        ));
    }

    fn offline_config(dir: &Path) -> SessionConfig {
        let mut config = SessionConfig::default();
        config.run.online_tools = false;
        config.cache.sqlite_path = Some(dir.join("cache.db").display().to_string());
        config.cache.reflections_path = Some(dir.join("memory/reflections.db").display().to_string());
        config.paths.results_dir = dir.join("results").display().to_string();
        config
    }

    #[tokio::test]
    async fn data_dir_locates_the_stores() {
        let dir = tempfile::tempdir().unwrap();
        let cache_file = dir.path().join("cache/tradegraph_cache.db");
        let writer = SqliteCache::open_writable(&cache_file).unwrap();
        writer
            .put(
                "fundamentals:NVDA",
                CacheCategory::Fundamentals,
                "NVDA",
                "finnhub",
                &serde_json::json!({"peTTM": 72.4}),
            )
            .unwrap();
        drop(writer);

        let data_dir = dir.path().display().to_string();
        let config = load_config_with(
            None,
            &ConfigOverrides::default(),
            env(&[
                ("TRADINGAGENTS_DATA_DIR", data_dir.as_str()),
                ("TRADINGAGENTS_ONLINE_TOOLS", "false"),
            ]),
        )
        .unwrap();
        assert_eq!(config.cache_db_path(), cache_file);

        let graph = build_graph_with(config, &ApiKeys::default(), Arc::new(ScriptedLlm::new()))
            .unwrap();
        assert!(dir.path().join("tradegraph_memory.db").exists());

        let (trace, _) = graph.propagate("NVDA", "2024-05-10").await.unwrap();
        let fundamentals = trace.state.report(AnalystKind::Fundamentals).unwrap();
        assert!(fundamentals.is_available(), "{}", fundamentals.render());
        assert!(!trace.state.report(AnalystKind::News).unwrap().is_available());
    }

    #[test]
    fn missing_credentials_are_named() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = offline_config(dir.path());
        config.run.online_tools = true;
        let err = build_graph_with(config, &ApiKeys::default(), Arc::new(ScriptedLlm::new()))
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Missing required credential(s): FINNHUB_API_KEY");
    }

    #[tokio::test]
    async fn offline_graph_runs_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let config = offline_config(dir.path());
        let graph = build_graph_with(config.clone(), &ApiKeys::default(), Arc::new(ScriptedLlm::new()))
            .unwrap();

        // no cache file: every report is unavailable but the run completes
        let (trace, decision) = graph.propagate("NVDA", "2024-05-10").await.unwrap();
        assert!(decision.completion.is_complete());
        assert!(trace.state.reports().values().all(|r| !r.is_available()));
        assert!(dir.path().join("memory/reflections.db").exists());

        let path = save_result(&config, &trace, &decision).unwrap();
        assert!(path.ends_with("results/NVDA/2024-05-10.json"));
        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(saved["decision"]["ticker"], "NVDA");
        assert_eq!(saved["trace"]["steps_used"], trace.steps_used);
    }
}
