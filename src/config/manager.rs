use crate::domain::agent::AgentOptions;
use crate::domain::models::ModelId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Default model to use
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://ai.gateway.lovable.dev/v1";
pub const DEFAULT_BIND: &str = "127.0.0.1:8787";

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Connect timeout in seconds.
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: Option<String>,
    /// Adds the full error chain as `details` in HTTP error bodies.
    pub expose_error_details: Option<bool>,
}

/// Tool loop tuning
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub max_turns: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub stream_timeout_secs: Option<u64>,
    pub parallel_tool_calls: Option<bool>,
    pub max_tool_result_chars: Option<usize>,
    pub temperature: Option<f32>,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub model: Option<String>,
    pub provider: ProviderConfig,
    pub server: ServerConfig,
    pub agent: AgentConfig,
    /// Extra system prompt paragraphs, placed before the user's own instructions.
    pub instructions: Vec<String>,
    pub database: Option<PathBuf>,
}

fn overlay<T: Clone>(base: &mut Option<T>, over: &Option<T>) {
    if over.is_some() {
        base.clone_from(over);
    }
}

impl Config {
    /// Applies `local` on top of `self` field by field. Instructions add up.
    fn merge(&mut self, local: &Config) {
        overlay(&mut self.model, &local.model);

        overlay(&mut self.provider.api_key, &local.provider.api_key);
        overlay(&mut self.provider.base_url, &local.provider.base_url);
        overlay(&mut self.provider.timeout, &local.provider.timeout);

        overlay(&mut self.server.bind, &local.server.bind);
        overlay(&mut self.server.expose_error_details, &local.server.expose_error_details);

        let agent = &local.agent;
        overlay(&mut self.agent.max_turns, &agent.max_turns);
        overlay(&mut self.agent.request_timeout_secs, &agent.request_timeout_secs);
        overlay(&mut self.agent.stream_timeout_secs, &agent.stream_timeout_secs);
        overlay(&mut self.agent.parallel_tool_calls, &agent.parallel_tool_calls);
        overlay(&mut self.agent.max_tool_result_chars, &agent.max_tool_result_chars);
        overlay(&mut self.agent.temperature, &agent.temperature);

        self.instructions.extend(local.instructions.iter().cloned());
        overlay(&mut self.database, &local.database);
    }

    /// Environment variables win over both files.
    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("TRAINER_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = lookup("TRAINER_BASE_URL") {
            self.provider.base_url = Some(url);
        }
        if let Some(model) = lookup("TRAINER_MODEL") {
            self.model = Some(model);
        }
        if let Some(bind) = lookup("TRAINER_BIND") {
            self.server.bind = Some(bind);
        }
        if let Some(db) = lookup("TRAINER_DB") {
            self.database = Some(PathBuf::from(db));
        }
    }

    fn resolve_placeholders<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for value in [&mut self.provider.api_key, &mut self.provider.base_url]
            .into_iter()
            .flatten()
        {
            *value = resolve_env_var(value, &lookup);
        }
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn api_key(&self) -> Option<&str> {
        self.provider.api_key.as_deref().filter(|key| !key.is_empty())
    }

    pub fn base_url(&self) -> &str {
        self.provider.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn bind(&self) -> &str {
        self.server.bind.as_deref().unwrap_or(DEFAULT_BIND)
    }

    pub fn expose_error_details(&self) -> bool {
        self.server.expose_error_details.unwrap_or(false)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("ai-trainer")
                .join("trainer.db")
        })
    }

    pub fn agent_options(&self) -> AgentOptions {
        let defaults = AgentOptions::default();
        let agent = &self.agent;
        AgentOptions {
            model: ModelId(self.model().to_string()),
            max_turns: agent.max_turns.unwrap_or(defaults.max_turns).max(1),
            request_timeout: agent
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            stream_timeout: agent
                .stream_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.stream_timeout),
            parallel_tool_calls: agent
                .parallel_tool_calls
                .unwrap_or(defaults.parallel_tool_calls),
            max_tool_result_chars: agent
                .max_tool_result_chars
                .unwrap_or(defaults.max_tool_result_chars),
            temperature: agent.temperature.or(defaults.temperature),
        }
    }
}

/// Resolve environment variable placeholders like {env:VAR_NAME}
fn resolve_env_var<F>(value: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match value.strip_prefix("{env:").and_then(|rest| rest.strip_suffix('}')) {
        Some(var_name) => lookup(var_name).unwrap_or_else(|| value.to_string()),
        None => value.to_string(),
    }
}

/// Configuration manager that handles loading and merging configs
pub struct ConfigManager {
    global_config: Option<Config>,
    local_config: Option<Config>,
    merged_config: Config,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            global_config: None,
            local_config: None,
            merged_config: Config::default(),
        }
    }

    /// Load configuration from both global and local sources
    pub fn load(&mut self, workspace_path: Option<&Path>) -> Result<(), ConfigError> {
        self.global_config = match Self::global_config_path() {
            Some(path) => Self::read_config(&path)?,
            None => None,
        };

        self.local_config = match workspace_path {
            Some(path) => Self::read_config(&Self::local_config_path(path))?,
            None => None,
        };

        self.merged_config = self.merge_configs(|name| std::env::var(name).ok());
        info!(
            model = self.merged_config.model(),
            global = self.global_config.is_some(),
            local = self.local_config.is_some(),
            "Configuration loaded"
        );
        Ok(())
    }

    /// Get the merged configuration
    pub fn config(&self) -> &Config {
        &self.merged_config
    }

    /// ~/.config/ai-trainer/trainer.json
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ai-trainer").join("trainer.json"))
    }

    /// .trainer/trainer.json
    fn local_config_path(workspace: &Path) -> PathBuf {
        workspace.join(".trainer").join("trainer.json")
    }

    fn read_config(path: &Path) -> Result<Option<Config>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        debug!(path = %path.display(), "Reading config file");
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(config))
    }

    /// Global, then local, then environment.
    fn merge_configs<F>(&self, lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut merged = self.global_config.clone().unwrap_or_default();
        if let Some(ref local) = self.local_config {
            merged.merge(local);
        }
        merged.resolve_placeholders(&lookup);
        merged.apply_env(&lookup);
        merged
    }

    pub fn save_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(config).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.model(), "google/gemini-2.5-flash");
        assert_eq!(config.base_url(), "https://ai.gateway.lovable.dev/v1");
        assert_eq!(config.bind(), "127.0.0.1:8787");
        assert!(!config.expose_error_details());
        assert!(config.database_path().ends_with("ai-trainer/trainer.db"));

        let options = config.agent_options();
        assert_eq!(options.max_turns, 6);
        assert_eq!(options.request_timeout, Duration::from_secs(30));
        assert_eq!(options.stream_timeout, Duration::from_secs(120));
        assert_eq!(options.max_tool_result_chars, 50_000);
        assert!(options.parallel_tool_calls);
    }

    #[test]
    fn test_config_parse() {
        let json = r#"{
            "model": "openai/gpt-4o-mini",
            "provider": { "api_key": "test-key" },
            "agent": { "max_turns": 3, "parallel_tool_calls": false },
            "instructions": ["Prefer kilograms."]
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.model(), "openai/gpt-4o-mini");
        assert_eq!(config.api_key(), Some("test-key"));
        let options = config.agent_options();
        assert_eq!(options.max_turns, 3);
        assert!(!options.parallel_tool_calls);
        assert_eq!(config.instructions, vec!["Prefer kilograms."]);
    }

    #[test]
    fn test_merge_configs() {
        let mut manager = ConfigManager::new();

        let mut global = Config::default();
        global.model = Some("global-model".to_string());
        global.provider.api_key = Some("global-key".to_string());
        global.agent.max_turns = Some(4);
        global.instructions = vec!["Global rule.".to_string()];

        let mut local = Config::default();
        local.model = Some("local-model".to_string());
        local.agent.request_timeout_secs = Some(10);
        local.instructions = vec!["Local rule.".to_string()];

        manager.global_config = Some(global);
        manager.local_config = Some(local);

        let merged = manager.merge_configs(env(&[]));
        assert_eq!(merged.model(), "local-model");
        assert_eq!(merged.api_key(), Some("global-key"));
        assert_eq!(merged.agent.max_turns, Some(4));
        assert_eq!(merged.agent.request_timeout_secs, Some(10));
        assert_eq!(merged.instructions, vec!["Global rule.", "Local rule."]);
    }

    #[test]
    fn test_env_placeholders_and_overrides() {
        let mut manager = ConfigManager::new();
        let mut global = Config::default();
        global.provider.api_key = Some("{env:GATEWAY_KEY}".to_string());
        global.provider.base_url = Some("{env:MISSING_VAR}".to_string());
        manager.global_config = Some(global);

        let merged = manager.merge_configs(env(&[
            ("GATEWAY_KEY", "sk-from-env"),
            ("TRAINER_MODEL", "env-model"),
            ("TRAINER_DB", "/tmp/trainer-test.db"),
        ]));

        assert_eq!(merged.api_key(), Some("sk-from-env"));
        assert_eq!(merged.base_url(), "{env:MISSING_VAR}");
        assert_eq!(merged.model(), "env-model");
        assert_eq!(merged.database_path(), PathBuf::from("/tmp/trainer-test.db"));
    }

    #[test]
    fn test_save_and_load_from_workspace() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".trainer").join("trainer.json");

        let mut config = Config::default();
        config.server.bind = Some("0.0.0.0:9000".to_string());
        config.server.expose_error_details = Some(true);
        ConfigManager::save_config(&config, &path).unwrap();

        let loaded = ConfigManager::read_config(&path).unwrap().unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.bind(), "0.0.0.0:9000");
        assert!(loaded.expose_error_details());
    }

    #[test]
    fn test_invalid_json_is_a_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("trainer.json");
        fs::write(&path, "{ not json").unwrap();

        let err = ConfigManager::read_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().starts_with("Invalid config in"));
    }

    #[test]
    fn test_missing_file_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.json");
        assert!(ConfigManager::read_config(&missing).unwrap().is_none());
    }
}
