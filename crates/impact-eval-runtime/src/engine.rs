//! Review engine: render, complete, parse.
//!
//! One completion call per review, bounded by the backend timeout. The
//! response is parsed as structured JSON or free text according to what the
//! provider declares, never by inspecting the content.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use impact_eval_core::{parse, render, ArtifactPayload, PromptSpec, RawResponse};

use crate::config::BackendConfig;
use crate::error::EvaluateError;
use crate::providers::{ChatMessage, LlmProvider, ProviderError};
use crate::result::ReviewReport;

/// Drives a single structured review against a provider.
pub struct ReviewEngine {
    provider: Arc<dyn LlmProvider>,
    backend: BackendConfig,
}

impl ReviewEngine {
    pub fn new(provider: Arc<dyn LlmProvider>, backend: BackendConfig) -> Self {
        Self { provider, backend }
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Review `payload` with `spec`.
    ///
    /// Fails without side effects on template, provider, timeout, or parse
    /// errors; a response missing any declared dimension is rejected.
    pub async fn review(
        &self,
        spec: &PromptSpec,
        payload: &ArtifactPayload,
        knowledge_context: &str,
    ) -> Result<ReviewReport, EvaluateError> {
        let rendered = render(spec, payload, knowledge_context)?;

        let mut messages = Vec::with_capacity(2);
        if !rendered.system.trim().is_empty() {
            messages.push(ChatMessage::system(rendered.system));
        }
        messages.push(ChatMessage::user(rendered.user));

        let structured = self.provider.supports_structured_output();
        let schema = structured.then(|| spec.response_schema());
        let config = self.backend.completion_config(schema);

        tracing::debug!(
            initiative_id = %payload.initiative_id,
            prompt = %spec.name,
            backend = self.provider.name(),
            model = %config.model,
            structured,
            "Requesting review"
        );

        let started = Instant::now();
        let response = tokio::time::timeout(config.timeout, self.provider.complete(messages, &config))
            .await
            .map_err(|_| ProviderError::Timeout(config.timeout))??;

        tracing::debug!(
            initiative_id = %payload.initiative_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Review completed"
        );

        let raw = if structured {
            RawResponse::structured(&response.content)?
        } else {
            RawResponse::free_text(response.content.as_str())
        };
        let parsed = parse(&raw, &spec.dimensions)?;

        if let Some(d) = &parsed.discrepancy {
            tracing::warn!(
                initiative_id = %payload.initiative_id,
                reported = d.reported,
                dimension_mean = d.dimension_mean,
                difference = d.difference,
                "Reported overall score disagrees with dimension mean"
            );
        }

        Ok(ReviewReport {
            initiative_id: payload.initiative_id.clone(),
            dimensions: parsed.dimensions,
            overall_score: parsed.overall_score,
            overall_source: parsed.overall_source,
            discrepancy: parsed.discrepancy,
            raw_response: response.content,
            prompt_name: spec.name.clone(),
            prompt_version: spec.version.clone(),
            backend_name: self.provider.name().to_string(),
            model: response.model,
            usage: response.usage,
            reviewed_at: Utc::now(),
        })
    }
}

impl std::fmt::Debug for ReviewEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewEngine")
            .field("provider", &self.provider.name())
            .field("backend", &self.backend)
            .finish()
    }
}
