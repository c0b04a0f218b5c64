//! Configuration loading, validation, and management for Stepwise.
//!
//! Loads configuration from `~/.stepwise/config.toml` with environment
//! variable overrides. This is the only place process state is read;
//! the engine receives the resulting structs explicitly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.stepwise/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model-call collaborator settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Step loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Built-in action settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Cost accounting settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier, also used for pricing lookups
    #[serde(default = "default_model")]
    pub name: String,

    /// API key handed to the model adapter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_model() -> String {
    "openai/gpt-4o".into()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            api_key: None,
            base_url: None,
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("name", &self.name)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Which serialization format the model must answer in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionFormatKind {
    /// Exactly one JSON object
    #[default]
    Json,
    /// Free text ending in a JSON object
    FlexibleJson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Stop after this many steps
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Consecutive validation failures tolerated before the run stops
    #[serde(default = "default_max_invalid")]
    pub max_consecutive_invalid_responses: u32,

    /// Extra attempts after a failed model call (0 = fail immediately)
    #[serde(default)]
    pub model_call_retries: u32,

    /// Delay between model call attempts
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// How many recent steps the prompt shows
    #[serde(default = "default_recent_steps")]
    pub recent_steps: usize,

    /// Response format
    #[serde(default)]
    pub action_format: ActionFormatKind,

    /// Role text placed at the top of every prompt
    #[serde(default = "default_role")]
    pub role: String,

    /// Extra constraints section, omitted when empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<String>,
}

fn default_max_steps() -> usize {
    20
}
fn default_max_invalid() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_recent_steps() -> usize {
    10
}
fn default_role() -> String {
    "You are an autonomous agent that completes tasks by choosing one action at a time.".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_consecutive_invalid_responses: default_max_invalid(),
            model_call_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
            recent_steps: default_recent_steps(),
            action_format: ActionFormatKind::default(),
            role: default_role(),
            constraints: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Root directory file actions are confined to
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Commands `run-command` may start. Empty = all commands allowed.
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    /// Kill commands that run longer than this
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Register the `ask-user` action
    #[serde(default = "default_true")]
    pub enable_ask_user: bool,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_allowed_commands() -> Vec<String> {
    ["ls", "cat", "echo", "pwd", "grep", "find", "wc", "git", "cargo"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_command_timeout() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            allowed_commands: default_allowed_commands(),
            command_timeout_secs: default_command_timeout(),
            enable_ask_user: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Per-model pricing overrides, keyed by model name
    #[serde(default)]
    pub pricing: HashMap<String, PricingOverrideConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingOverrideConfig {
    /// Price per 1M input tokens in USD
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD
    pub output_per_m: f64,
}

impl AppConfig {
    /// Load configuration from the default path (~/.stepwise/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `STEPWISE_API_KEY`
    /// - `STEPWISE_MODEL`
    /// - `STEPWISE_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("STEPWISE_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(model) = lookup("STEPWISE_MODEL") {
            self.model.name = model;
        }
        if let Some(url) = lookup("STEPWISE_BASE_URL") {
            self.model.base_url = Some(url);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stepwise")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_steps must be at least 1".into(),
            ));
        }

        if self.agent.max_consecutive_invalid_responses == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_consecutive_invalid_responses must be at least 1".into(),
            ));
        }

        if self.tools.command_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools.command_timeout_secs must be > 0".into(),
            ));
        }

        for (model, price) in &self.telemetry.pricing {
            if price.input_per_m < 0.0 || price.output_per_m < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "telemetry.pricing.{model}: prices must not be negative"
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
