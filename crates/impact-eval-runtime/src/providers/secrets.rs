//! API credentials for review backends.
//!
//! Keys are wrapped in [`SecretString`] the moment they are read so they
//! cannot reach logs, `Debug` output, or persisted evaluation results.
//! They are exposed only when an HTTP header is built.

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// `api_key` in the backend section of the evaluation config
    Config,
    Environment,
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A backend API key. `Debug` and `Display` show `[REDACTED]`.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Read `config_key` from the backend config, falling back to `env_var`.
    pub fn from_config_or_env(
        config: &JsonValue,
        config_key: &str,
        env_var: &str,
        name: &'static str,
    ) -> Result<Self, ProviderError> {
        Self::from_config_or_lookup(config, config_key, env_var, name, |var| {
            std::env::var(var).ok()
        })
    }

    /// Same as [`from_config_or_env`](Self::from_config_or_env) with an
    /// injectable environment, so tests never touch process state.
    pub fn from_config_or_lookup(
        config: &JsonValue,
        config_key: &str,
        env_var: &str,
        name: &'static str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ProviderError> {
        if let Some(value) = config[config_key].as_str().filter(|v| !v.is_empty()) {
            return Ok(Self::new(value, CredentialSource::Config, name));
        }

        if let Some(value) = lookup(env_var).filter(|v| !v.is_empty()) {
            return Ok(Self::new(value, CredentialSource::Environment, name));
        }

        Err(ProviderError::NotConfigured(format!(
            "{} required: set '{}' in the backend config or the {} environment variable",
            name, config_key, env_var
        )))
    }

    /// Whether a key could be loaded, without loading it.
    pub fn is_available(config: &JsonValue, config_key: &str, env_var: &str) -> bool {
        config[config_key].as_str().is_some() || std::env::var(env_var).is_ok()
    }

    /// The raw key. Call only where the request header is built.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_debug_and_display_redact() {
        let cred = ApiCredential::new("sk-ant-secret", CredentialSource::Programmatic, "Anthropic API key");
        let debug = format!("{:?}", cred);
        let display = format!("{}", cred);
        assert!(!debug.contains("sk-ant-secret"));
        assert!(!display.contains("sk-ant-secret"));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(display, "Anthropic API key from programmatic [REDACTED]");
        assert_eq!(cred.expose(), "sk-ant-secret");
    }

    #[test]
    fn test_config_wins_over_environment() {
        let config = json!({"api_key": "from-config"});
        let cred = ApiCredential::from_config_or_lookup(&config, "api_key", "KEY", "key", |_| {
            Some("from-env".into())
        })
        .unwrap();
        assert_eq!(cred.expose(), "from-config");
        assert_eq!(cred.source(), CredentialSource::Config);
    }

    #[test]
    fn test_environment_fallback() {
        let cred = ApiCredential::from_config_or_lookup(&json!({}), "api_key", "KEY", "key", |var| {
            (var == "KEY").then(|| "from-env".to_string())
        })
        .unwrap();
        assert_eq!(cred.source(), CredentialSource::Environment);
        assert!(!cred.is_empty());
    }

    #[test]
    fn test_missing_credential_names_both_sources() {
        let err = ApiCredential::from_config_or_lookup(&json!({}), "api_key", "OPENAI_API_KEY", "OpenAI API key", |_| None)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("api_key"));
        assert!(msg.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_empty_values_are_ignored() {
        let config = json!({"api_key": ""});
        let result = ApiCredential::from_config_or_lookup(&config, "api_key", "KEY", "key", |_| Some(String::new()));
        assert!(result.is_err());
    }
}
