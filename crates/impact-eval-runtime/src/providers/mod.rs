//! Completion providers for the review strategy.
//!
//! The review engine talks to a language model only through [`LlmProvider`].
//! A provider declares whether it can honor a JSON schema for its output;
//! the engine uses that flag to decide how the response is parsed.
//!
//! Shipped implementations:
//! - [`StubProvider`]: deterministic canned responses, always available
//! - `AnthropicProvider` (feature `anthropic`): free-text Messages API
//! - `OpenAiProvider` (feature `openai`): schema-constrained Chat Completions
//!
//! ## Security
//!
//! API keys are held in [`ApiCredential`] and never appear in `Debug` or
//! `Display` output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

mod factory;
mod retry;
pub mod secrets;
mod stub;

#[cfg(feature = "anthropic")]
mod anthropic;

#[cfg(feature = "openai")]
mod openai;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use retry::{RetryPolicy, RetryingProvider};
pub use secrets::{ApiCredential, CredentialSource};
pub use stub::{StubProvider, StubProviderFactory};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicProvider, AnthropicProviderFactory};

#[cfg(feature = "openai")]
pub use openai::{OpenAiProvider, OpenAiProviderFactory};

/// Errors from completion providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Malformed provider response: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Whether the failure is transient and worth retrying at the boundary.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::HttpError(_) | ProviderError::RateLimited { .. } | ProviderError::Timeout(_)
        )
    }
}

/// Settings for a single completion request.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub model: String,
    pub max_tokens: u32,
    /// 0.0 for the most repeatable output the provider offers
    pub temperature: f32,
    pub timeout: Duration,
    /// JSON schema the output must follow, for structured-output providers
    pub response_schema: Option<serde_json::Value>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: crate::config::DEFAULT_MODEL.to_string(),
            max_tokens: crate::config::DEFAULT_MAX_TOKENS,
            temperature: 0.0,
            timeout: crate::config::DEFAULT_TIMEOUT,
            response_schema: None,
        }
    }
}

/// Who a chat message is from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message for completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Response from a completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    /// Model that actually served the request
    pub model: String,
    pub stop_reason: Option<String>,
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// A language-model completion backend.
///
/// Implementations must not retry internally; wrap them in
/// [`RetryingProvider`] when transient failures should be retried.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a chat completion.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Registered name, recorded in review reports.
    fn name(&self) -> &str;

    /// Whether the provider constrains its output to
    /// [`CompletionConfig::response_schema`].
    fn supports_structured_output(&self) -> bool {
        false
    }
}
