//! Retry decorator for providers.
//!
//! Retrying is a boundary policy: the review engine makes exactly one call
//! per run. Wrap a provider in [`RetryingProvider`] to retry rate limits,
//! timeouts, and transport errors with exponential backoff.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::time::Duration;

use super::{ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError};

/// Backoff settings for [`RetryingProvider`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);
        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}

/// Retries transient failures of the wrapped provider.
pub struct RetryingProvider {
    inner: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl LlmProvider for RetryingProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let attempt = || {
            let messages = messages.clone();
            async move { self.inner.complete(messages, config).await }
        };

        attempt
            .retry(self.policy.backoff())
            .when(ProviderError::is_transient)
            .notify(|err: &ProviderError, delay: Duration| {
                tracing::warn!(
                    provider = self.inner.name(),
                    error = %err,
                    delay = ?delay,
                    "Retrying completion after transient failure"
                );
            })
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn supports_structured_output(&self) -> bool {
        self.inner.supports_structured_output()
    }
}
