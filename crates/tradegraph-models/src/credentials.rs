use std::collections::BTreeMap;

use crate::config::{ConfigError, LlmProvider};

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const GOOGLE_API_KEY: &str = "GOOGLE_API_KEY";
pub const FINNHUB_API_KEY: &str = "FINNHUB_API_KEY";

const KNOWN_KEYS: [(&str, &str); 4] = [
    (OPENAI_API_KEY, "OpenAI API"),
    (ANTHROPIC_API_KEY, "Anthropic API"),
    (GOOGLE_API_KEY, "Google Generative AI API"),
    (FINNHUB_API_KEY, "Finnhub API"),
];

/// Credentials needed to reach a provider.
pub fn provider_keys(provider: LlmProvider) -> &'static [&'static str] {
    match provider {
        LlmProvider::OpenAi | LlmProvider::OpenRouter => &[OPENAI_API_KEY],
        LlmProvider::Anthropic => &[ANTHROPIC_API_KEY],
        LlmProvider::Google => &[GOOGLE_API_KEY],
        // local model server / CLI-managed login
        LlmProvider::Ollama | LlmProvider::ClaudeCli => &[],
    }
}

/// API keys captured from the environment at session start.
#[derive(Clone, Default)]
pub struct ApiKeys {
    keys: BTreeMap<String, String>,
}

// Keys never appear in debug output.
impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeys")
            .field("present", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// One line of the credential report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStatus {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
    pub present: bool,
}

impl ApiKeys {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let keys = KNOWN_KEYS
            .iter()
            .filter_map(|&(name, _)| {
                lookup(name)
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| (name.to_string(), v))
            })
            .collect();
        Self { keys }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.keys.get(name).map(String::as_str)
    }

    pub fn provider_key(&self, provider: LlmProvider) -> Option<&str> {
        provider_keys(provider).iter().find_map(|k| self.get(k))
    }

    fn required_for(provider: LlmProvider, online_tools: bool) -> Vec<&'static str> {
        let mut required: Vec<&'static str> = provider_keys(provider).to_vec();
        if online_tools {
            required.push(FINNHUB_API_KEY);
        }
        required
    }

    pub fn missing(&self, provider: LlmProvider, online_tools: bool) -> Vec<String> {
        Self::required_for(provider, online_tools)
            .into_iter()
            .filter(|k| self.get(k).is_none())
            .map(str::to_string)
            .collect()
    }

    /// Fails with the names of every missing required key.
    pub fn validate(&self, provider: LlmProvider, online_tools: bool) -> Result<(), ConfigError> {
        let missing = self.missing(provider, online_tools);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingCredentials(missing))
        }
    }

    pub fn report(&self, provider: LlmProvider, online_tools: bool) -> Vec<KeyStatus> {
        let required = Self::required_for(provider, online_tools);
        KNOWN_KEYS
            .iter()
            .map(|&(name, description)| KeyStatus {
                name,
                description,
                required: required.contains(&name),
                present: self.get(name).is_some(),
            })
            .collect()
    }
}
