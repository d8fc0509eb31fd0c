use thiserror::Error;
use tradegraph_models::{AnalystKind, ConfigError, HaltReason, StateError};

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("Agent timed out after {0} seconds")]
    Timeout(u64),

    #[error("LLM client error: {0}")]
    Client(String),
}

/// Failure of a data collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    #[error("{source_name} is unreachable: {message}")]
    Unreachable { source_name: String, message: String },

    #[error("{source_name} rejected the credentials: {message}")]
    Unauthorized { source_name: String, message: String },

    #[error("{source_name} returned malformed data: {message}")]
    Malformed { source_name: String, message: String },
}

impl DataError {
    /// Connectivity and authentication failures; these can abort a run.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            DataError::Unreachable { .. } | DataError::Unauthorized { .. }
        )
    }
}

/// Failures that abort `propagate` without a decision.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid run input: {0}")]
    InvalidInput(String),

    #[error("Data source unavailable for {}: {message}", join_kinds(.analysts))]
    DataUnreachable {
        analysts: Vec<AnalystKind>,
        message: String,
    },

    #[error("Memory store error: {0}")]
    Memory(#[from] tradegraph_cache::CacheError),

    #[error("No completed run to reflect on")]
    NoCompletedRun,

    #[error(transparent)]
    State(#[from] StateError),
}

fn join_kinds(kinds: &[AnalystKind]) -> String {
    kinds
        .iter()
        .map(|k| format!("{k} analyst"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Why a single agent turn loop stopped without content.
#[derive(Debug)]
pub enum TurnError {
    Halt(HaltReason),
    Llm(AgentError),
    Data(DataError),
    Malformed { attempts: u32 },
}

impl From<HaltReason> for TurnError {
    fn from(reason: HaltReason) -> Self {
        TurnError::Halt(reason)
    }
}

/// Outcome of a stage that did not finish: either a halt, which still yields
/// a best-effort decision, or a fatal error.
#[derive(Debug)]
pub enum StageError {
    Halt(HaltReason),
    Fatal(GraphError),
}

impl From<HaltReason> for StageError {
    fn from(reason: HaltReason) -> Self {
        StageError::Halt(reason)
    }
}

impl From<GraphError> for StageError {
    fn from(err: GraphError) -> Self {
        StageError::Fatal(err)
    }
}

impl From<StateError> for StageError {
    fn from(err: StateError) -> Self {
        StageError::Fatal(GraphError::State(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_names_the_analysts() {
        let err = GraphError::DataUnreachable {
            analysts: vec![AnalystKind::Market, AnalystKind::News],
            message: "finnhub is unreachable: connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Data source unavailable for market analyst, news analyst: finnhub is unreachable: connection refused"
        );
    }

    #[test]
    fn connectivity_classification() {
        let unreachable = DataError::Unreachable {
            source_name: "yahoo".to_string(),
            message: "timeout".to_string(),
        };
        let malformed = DataError::Malformed {
            source_name: "yahoo".to_string(),
            message: "bad json".to_string(),
        };
        assert!(unreachable.is_connectivity());
        assert!(!malformed.is_connectivity());
    }

    #[test]
    fn config_error_is_transparent() {
        let err: GraphError = ConfigError::MissingCredentials(vec!["FINNHUB_API_KEY".to_string()]).into();
        assert_eq!(err.to_string(), "Missing required credential(s): FINNHUB_API_KEY");
    }
}
