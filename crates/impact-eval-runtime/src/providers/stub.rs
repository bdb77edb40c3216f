//! Deterministic stand-in backend.
//!
//! Always compiled. Used by tests, dry runs, and any environment without
//! network access. Given a canned response it returns that text verbatim;
//! without one, a structured stub answers every dimension in the request's
//! response schema with a fixed score.

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ProviderFactory, TokenUsage,
};

/// Score given to every dimension when no canned response is set.
pub const DEFAULT_STUB_SCORE: f64 = 0.5;

const STUB_MODEL: &str = "stub";

/// Canned-response provider.
#[derive(Debug)]
pub struct StubProvider {
    response: Option<String>,
    structured: bool,
    model: String,
    default_score: f64,
    delay: Option<Duration>,
    /// Calls that fail with a transient HTTP error before succeeding
    transient_failures: usize,
    calls: AtomicUsize,
}

impl Default for StubProvider {
    fn default() -> Self {
        Self {
            response: None,
            structured: true,
            model: STUB_MODEL.to_string(),
            default_score: DEFAULT_STUB_SCORE,
            delay: None,
            transient_failures: 0,
            calls: AtomicUsize::new(0),
        }
    }
}

impl StubProvider {
    /// A structured stub that derives its answer from the response schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// A structured stub returning `json` verbatim.
    pub fn structured(json: impl Into<String>) -> Self {
        Self {
            response: Some(json.into()),
            ..Self::default()
        }
    }

    /// A free-text stub returning `text` verbatim.
    pub fn free_text(text: impl Into<String>) -> Self {
        Self {
            response: Some(text.into()),
            structured: false,
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_default_score(mut self, score: f64) -> Self {
        self.default_score = score;
        self
    }

    /// Sleep before answering, e.g. to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the first `count` calls with a transient HTTP error.
    pub fn with_transient_failures(mut self, count: usize) -> Self {
        self.transient_failures = count;
        self
    }

    /// Number of `complete` calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn schema_answer(&self, schema: &JsonValue) -> Option<String> {
        let names = schema
            .pointer("/properties/dimensions/items/properties/name/enum")?
            .as_array()?;

        let dimensions: Vec<JsonValue> = names
            .iter()
            .filter_map(JsonValue::as_str)
            .map(|name| {
                json!({
                    "name": name,
                    "score": self.default_score,
                    "justification": "Stub review.",
                })
            })
            .collect();

        Some(json!({ "dimensions": dimensions, "overall": self.default_score }).to_string())
    }
}

#[async_trait]
impl LlmProvider for StubProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if call < self.transient_failures {
            return Err(ProviderError::HttpError(format!(
                "stub transient failure {} of {}",
                call + 1,
                self.transient_failures
            )));
        }

        let content = match &self.response {
            Some(canned) => canned.clone(),
            None if self.structured => config
                .response_schema
                .as_ref()
                .and_then(|schema| self.schema_answer(schema))
                .ok_or_else(|| {
                    ProviderError::NotConfigured(
                        "stub has no canned response and the request carries no dimension schema"
                            .to_string(),
                    )
                })?,
            None => {
                return Err(ProviderError::NotConfigured(
                    "free-text stub requires a canned response".to_string(),
                ))
            }
        };

        let input_chars: usize = messages.iter().map(|m| m.content.len()).sum();

        Ok(CompletionResponse {
            usage: TokenUsage {
                input_tokens: (input_chars / 4) as u32,
                output_tokens: (content.len() / 4) as u32,
            },
            content,
            model: self.model.clone(),
            stop_reason: Some("end_turn".to_string()),
        })
    }

    fn name(&self) -> &str {
        "stub"
    }

    fn supports_structured_output(&self) -> bool {
        self.structured
    }
}

/// Factory for `backend.type: stub`.
///
/// Recognized keys: `response` (string, or any JSON value which is
/// serialized), `structured` (bool, default true), `model`, `score`,
/// `delay_ms`.
pub struct StubProviderFactory;

impl ProviderFactory for StubProviderFactory {
    fn provider_type(&self) -> &'static str {
        "stub"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let mut provider = StubProvider::new();

        provider.response = match &config["response"] {
            JsonValue::Null => None,
            JsonValue::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        };

        if let Some(structured) = config["structured"].as_bool() {
            provider.structured = structured;
        }
        if let Some(model) = config["model"].as_str() {
            provider.model = model.to_string();
        }
        if let Some(score) = config["score"].as_f64() {
            if !(0.0..=1.0).contains(&score) {
                return Err(ProviderError::NotConfigured(format!(
                    "stub score must be within [0, 1], got {}",
                    score
                )));
            }
            provider.default_score = score;
        }
        if let Some(ms) = config["delay_ms"].as_u64() {
            provider.delay = Some(Duration::from_millis(ms));
        }

        Ok(Arc::new(provider))
    }

    fn description(&self) -> &'static str {
        "Deterministic canned responses (no network)"
    }
}
