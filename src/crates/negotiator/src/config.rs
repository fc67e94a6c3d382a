//! Negotiator configuration
//!
//! Settings come from an optional YAML, TOML or JSON file (format picked by
//! extension) and are then overridden by environment variables:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `NEGOTIATOR_AGENCY_LEVEL` | `agency_level` (`STRICT`, `MEDIUM`, `AUTONOMOUS`) |
//! | `NEGOTIATOR_CHECKPOINT_DIR` | `checkpoint_dir` |
//! | `NEGOTIATOR_MAX_STEPS` | `max_steps` |
//! | `NEGOTIATOR_POLICY_FILE` | `policy_file` |
//! | `NEGOTIATOR_REVIEW_KEYWORDS` | `review_keywords` (comma separated) |
//! | `NEGOTIATOR_IN_MEMORY` | `in_memory` |
//!
//! ```yaml
//! agency_level: AUTONOMOUS
//! checkpoint_dir: /var/lib/negotiator/checkpoints
//! policy_file: policies/payment-terms.yaml
//! review_keywords: [indemnity, liability]
//! ```

use crate::compliance::Policy;
use crate::nodes::keyword_review_trigger;
use crate::state::AgencyLevel;
use crate::workflow::WorkflowOptions;
use gategraph_core::DEFAULT_MAX_STEPS;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_AGENCY_LEVEL: &str = "NEGOTIATOR_AGENCY_LEVEL";
pub const ENV_CHECKPOINT_DIR: &str = "NEGOTIATOR_CHECKPOINT_DIR";
pub const ENV_MAX_STEPS: &str = "NEGOTIATOR_MAX_STEPS";
pub const ENV_POLICY_FILE: &str = "NEGOTIATOR_POLICY_FILE";
pub const ENV_REVIEW_KEYWORDS: &str = "NEGOTIATOR_REVIEW_KEYWORDS";
pub const ENV_IN_MEMORY: &str = "NEGOTIATOR_IN_MEMORY";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable '{0}' not found")]
    Missing(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Get an environment variable as a string.
pub fn get_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ConfigError::Missing(key.to_string()))
}

/// Get an environment variable and parse it to the specified type.
pub fn get_env_parse<T: std::str::FromStr>(key: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let value = get_env(key)?;
    value.parse::<T>().map_err(|e| {
        ConfigError::Invalid(format!(
            "Failed to parse environment variable '{}': {}",
            key, e
        ))
    })
}

/// Get an environment variable with a default value.
pub fn get_env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an environment variable and parse it, or use a default value.
pub fn get_env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    get_env_parse(key).unwrap_or(default)
}

/// Get a boolean environment variable.
pub fn get_env_bool(key: &str) -> Result<bool> {
    let value = get_env(key)?;
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid(format!(
            "Invalid boolean value for '{}': {}",
            key, value
        ))),
    }
}

/// Get a boolean environment variable with a default.
pub fn get_env_bool_or(key: &str, default: bool) -> bool {
    get_env_bool(key).unwrap_or(default)
}

/// Load a file, picking YAML, TOML or JSON from its extension
pub fn load_config_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .ok_or_else(|| {
            ConfigError::Invalid(format!("Unable to determine file extension for {:?}", path))
        })?;

    let content = std::fs::read_to_string(path)?;
    let parse_error = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string())),
        "toml" => toml::from_str(&content).map_err(|e| parse_error(e.to_string())),
        "json" => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string())),
        other => Err(ConfigError::Invalid(format!(
            "Unsupported config file extension: {}",
            other
        ))),
    }
}

/// Runtime settings of the negotiator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiatorConfig {
    /// Level applied to requests that do not name one
    pub agency_level: AgencyLevel,
    /// Root of the file checkpoint store
    pub checkpoint_dir: PathBuf,
    pub max_steps: u32,
    /// Policy document; structured (yaml/toml/json) or plain text
    pub policy_file: Option<PathBuf>,
    /// Clause keywords that make an `AUTONOMOUS` thread ask for review
    pub review_keywords: Vec<String>,
    /// Keep checkpoints in memory instead of on disk
    pub in_memory: bool,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            agency_level: AgencyLevel::default(),
            checkpoint_dir: PathBuf::from(".negotiator/checkpoints"),
            max_steps: DEFAULT_MAX_STEPS,
            policy_file: None,
            review_keywords: Vec::new(),
            in_memory: false,
        }
    }
}

impl NegotiatorConfig {
    /// File (if any), then environment overrides, then validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_config_file(path.as_ref())?;
        tracing::debug!(path = ?path.as_ref(), "loaded configuration file");
        Ok(config)
    }

    /// Override fields from `NEGOTIATOR_*` variables
    pub fn apply_env(&mut self) -> Result<()> {
        match get_env_parse::<AgencyLevel>(ENV_AGENCY_LEVEL) {
            Ok(level) => self.agency_level = level,
            Err(ConfigError::Missing(_)) => {}
            Err(e) => return Err(e),
        }

        let default_dir = self.checkpoint_dir.to_string_lossy().into_owned();
        self.checkpoint_dir = PathBuf::from(get_env_or(ENV_CHECKPOINT_DIR, &default_dir));
        self.max_steps = get_env_parse_or(ENV_MAX_STEPS, self.max_steps);

        if let Ok(policy_file) = get_env(ENV_POLICY_FILE) {
            self.policy_file = Some(PathBuf::from(policy_file));
        }
        if let Ok(keywords) = get_env(ENV_REVIEW_KEYWORDS) {
            self.review_keywords = keywords
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }
        self.in_memory = get_env_bool_or(ENV_IN_MEMORY, self.in_memory);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(ConfigError::Invalid("max_steps must be at least 1".to_string()));
        }
        if !self.in_memory && self.checkpoint_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "checkpoint_dir must be set unless in_memory is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Read the configured policy document
    ///
    /// Structured files decode into a [`Policy`]; any other extension is
    /// taken as the policy text, named after the file stem.
    pub fn load_policy(&self) -> Result<Option<Policy>> {
        let Some(path) = &self.policy_file else {
            return Ok(None);
        };
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let policy = match extension.as_str() {
            "yaml" | "yml" | "toml" | "json" => load_config_file::<Policy>(path)?,
            _ => {
                let text = std::fs::read_to_string(path)?;
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "policy".to_string());
                Policy::new(name, text)
            }
        };
        tracing::info!(policy = %policy.name, version = %policy.version, "policy loaded");
        Ok(Some(policy))
    }

    /// Workflow options derived from this configuration
    pub fn workflow_options(&self) -> Result<WorkflowOptions> {
        let review_trigger = if self.review_keywords.is_empty() {
            None
        } else {
            Some(keyword_review_trigger(&self.review_keywords))
        };
        Ok(WorkflowOptions {
            agency_level: self.agency_level,
            policy: self.load_policy()?,
            review_trigger,
            max_steps: self.max_steps,
        })
    }
}
