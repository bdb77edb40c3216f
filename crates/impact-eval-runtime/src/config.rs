//! Evaluation configuration.
//!
//! Resolution order, highest first:
//! 1. `REVIEW_BACKEND_*` environment variables
//! 2. explicit config (YAML file or in-memory JSON)
//! 3. built-in defaults
//!
//! ```yaml
//! backend:
//!   type: anthropic
//!   model: claude-sonnet-4-5-20250929
//!   temperature: 0.0
//!   max_tokens: 4096
//!   timeout: 60s
//!   api_key: ...          # unknown keys are passed to the backend factory
//! methods:
//!   experiment:
//!     prompt: experiment_review
//!     knowledge_base: experiment
//! knowledge:
//!   top_k: 4
//! ```

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::providers::CompletionConfig;

pub const DEFAULT_BACKEND: &str = "anthropic";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const DEFAULT_TEMPERATURE: f32 = 0.0;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub const ENV_BACKEND_TYPE: &str = "REVIEW_BACKEND_TYPE";
pub const ENV_BACKEND_MODEL: &str = "REVIEW_BACKEND_MODEL";
pub const ENV_BACKEND_TEMPERATURE: &str = "REVIEW_BACKEND_TEMPERATURE";
pub const ENV_BACKEND_MAX_TOKENS: &str = "REVIEW_BACKEND_MAX_TOKENS";
pub const ENV_BACKEND_TIMEOUT: &str = "REVIEW_BACKEND_TIMEOUT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: {value} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: impl ToString, reason: impl ToString) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Review backend selection and request settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub backend_type: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    /// Passed through to the backend factory
    pub extra: Map<String, JsonValue>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend_type: DEFAULT_BACKEND.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
            extra: Map::new(),
        }
    }
}

impl BackendConfig {
    /// The JSON handed to a provider factory: `extra` plus `model`.
    pub fn provider_config(&self) -> JsonValue {
        let mut config = self.extra.clone();
        config.insert("model".to_string(), JsonValue::String(self.model.clone()));
        JsonValue::Object(config)
    }

    pub fn completion_config(&self, response_schema: Option<JsonValue>) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
            response_schema,
        }
    }

    fn apply(&mut self, section: &Map<String, JsonValue>) -> Result<(), ConfigError> {
        for (key, value) in section {
            match key.as_str() {
                "type" => self.backend_type = string_value("backend.type", value)?,
                "model" => self.model = string_value("backend.model", value)?,
                "temperature" => {
                    self.temperature = value
                        .as_f64()
                        .ok_or_else(|| ConfigError::invalid("backend.temperature", value, "expected a number"))?
                        as f32
                }
                "max_tokens" => {
                    self.max_tokens = value
                        .as_u64()
                        .and_then(|v| u32::try_from(v).ok())
                        .ok_or_else(|| {
                            ConfigError::invalid("backend.max_tokens", value, "expected a positive integer")
                        })?
                }
                "timeout" => self.timeout = timeout_value(value)?,
                "extra" => match value {
                    JsonValue::Object(map) => self.extra.extend(map.clone()),
                    JsonValue::Null => {}
                    other => return Err(ConfigError::invalid("backend.extra", other, "expected a mapping")),
                },
                _ => {
                    self.extra.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }
}

fn string_value(key: &str, value: &JsonValue) -> Result<String, ConfigError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ConfigError::invalid(key, value, "expected a string"))
}

/// Seconds as a number, or a humantime string such as "30s" or "2m".
fn timeout_value(value: &JsonValue) -> Result<Duration, ConfigError> {
    let timeout = match value {
        JsonValue::Number(n) => n
            .as_f64()
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
            .ok_or_else(|| ConfigError::invalid("backend.timeout", value, "expected non-negative seconds"))?,
        JsonValue::String(s) => parse_timeout(s)?,
        other => return Err(ConfigError::invalid("backend.timeout", other, "expected a duration")),
    };
    Ok(timeout)
}

fn parse_timeout(raw: &str) -> Result<Duration, ConfigError> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw).map_err(|e| ConfigError::invalid("backend.timeout", raw, e))
}

/// Per-methodology prompt and knowledge selection, by catalog name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodOverride {
    pub prompt: Option<String>,
    pub knowledge_base: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KnowledgeConfig {
    /// Retrieve this many chunks instead of passing every document
    pub top_k: Option<usize>,
}

/// Complete evaluation configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluateConfig {
    pub backend: BackendConfig,
    pub methods: BTreeMap<String, MethodOverride>,
    pub knowledge: KnowledgeConfig,
}

impl EvaluateConfig {
    /// Layer an in-memory config over the defaults.
    pub fn from_value(value: &JsonValue) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let root = match value {
            JsonValue::Null => return Ok(config),
            JsonValue::Object(map) => map,
            other => return Err(ConfigError::invalid("(root)", other, "expected a mapping")),
        };

        for (key, section) in root {
            match key.as_str() {
                "backend" => match section {
                    JsonValue::Object(map) => config.backend.apply(map)?,
                    JsonValue::Null => {}
                    other => return Err(ConfigError::invalid("backend", other, "expected a mapping")),
                },
                "methods" => {
                    config.methods = serde_json::from_value(section.clone())
                        .map_err(|e| ConfigError::invalid("methods", section, e))?;
                }
                "knowledge" => {
                    config.knowledge = serde_json::from_value(section.clone())
                        .map_err(|e| ConfigError::invalid("knowledge", section, e))?;
                }
                other => {
                    tracing::warn!(key = other, "Ignoring unknown config section");
                }
            }
        }

        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        Self::from_value(&value)
    }

    /// Load a YAML config file. Does not apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Loaded evaluation config");
        Self::from_yaml_str(&yaml)
    }

    /// File (when given) over defaults, then the process environment on top.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `REVIEW_BACKEND_*` overrides read through `lookup`.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_BACKEND_TYPE) {
            self.backend.backend_type = v;
        }
        if let Some(v) = get(ENV_BACKEND_MODEL) {
            self.backend.model = v;
        }
        if let Some(v) = get(ENV_BACKEND_TEMPERATURE) {
            self.backend.temperature = v
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(ENV_BACKEND_TEMPERATURE, &v, e))?;
        }
        if let Some(v) = get(ENV_BACKEND_MAX_TOKENS) {
            self.backend.max_tokens = v
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(ENV_BACKEND_MAX_TOKENS, &v, e))?;
        }
        if let Some(v) = get(ENV_BACKEND_TIMEOUT) {
            self.backend.timeout = parse_timeout(&v)?;
        }

        Ok(self)
    }

    pub fn method_override(&self, method: &str) -> Option<&MethodOverride> {
        self.methods.get(method)
    }
}
