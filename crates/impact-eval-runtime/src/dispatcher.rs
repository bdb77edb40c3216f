//! Evaluation dispatcher.
//!
//! Routes a job directory to a strategy and a method reviewer, runs it, and
//! persists the unified result:
//!
//! ```text
//! ManifestLoaded -> ReviewerResolved -> PayloadBuilt
//!     -> ScoreComputed | ReviewCompleted -> ResultPersisted
//! ```
//!
//! Any failure aborts the run before anything is written. The reviewer
//! registry and catalog are shared read-only, so one dispatcher can run
//! many jobs concurrently.

use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

use impact_eval_core::{
    load_scorer_event, score_confidence, ArtifactPayload, KnowledgeBase, Manifest,
    MethodReviewerDefinition, MethodReviewerRegistry, PromptSpec, Strategy, KNOWLEDGE_SEPARATOR,
};

use crate::catalog::Catalog;
use crate::config::EvaluateConfig;
use crate::engine::ReviewEngine;
use crate::error::EvaluateError;
use crate::persist;
use crate::providers::{LlmProvider, ProviderRegistry, RetryPolicy, RetryingProvider};
use crate::result::{EvaluationResult, StrategyReport};

/// Per-run options.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvaluateOptions {
    /// Replaces the cost read from the job's impact results
    pub cost_to_scale: Option<f64>,
}

/// Steps of a single run, logged as they complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    ManifestLoaded,
    ReviewerResolved,
    PayloadBuilt,
    ScoreComputed,
    ReviewCompleted,
    ResultPersisted,
}

/// Runs evaluations for job directories.
pub struct Dispatcher {
    registry: Arc<MethodReviewerRegistry>,
    catalog: Arc<Catalog>,
    config: EvaluateConfig,
    providers: Arc<ProviderRegistry>,
    retry: Option<RetryPolicy>,
    provider: OnceCell<Arc<dyn LlmProvider>>,
}

impl Dispatcher {
    /// A dispatcher over an already-populated registry. The provider is
    /// built from `config.backend` on the first review run.
    pub fn new(
        registry: Arc<MethodReviewerRegistry>,
        catalog: Arc<Catalog>,
        config: EvaluateConfig,
    ) -> Self {
        Self {
            registry,
            catalog,
            config,
            providers: Arc::new(ProviderRegistry::with_defaults()),
            retry: None,
            provider: OnceCell::new(),
        }
    }

    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn registry(&self) -> &MethodReviewerRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &EvaluateConfig {
        &self.config
    }

    /// Evaluate a job directory and write the result into it.
    pub async fn evaluate(&self, job_dir: impl AsRef<Path>) -> Result<EvaluationResult, EvaluateError> {
        self.evaluate_with(job_dir, EvaluateOptions::default()).await
    }

    pub async fn evaluate_with(
        &self,
        job_dir: impl AsRef<Path>,
        options: EvaluateOptions,
    ) -> Result<EvaluationResult, EvaluateError> {
        let job_dir = job_dir.as_ref();
        let result = self.compute_with(job_dir, options).await?;

        let path = persist::write_result(job_dir, &result)?;
        tracing::debug!(state = ?RunState::ResultPersisted, path = %path.display());

        tracing::info!(
            initiative_id = %result.initiative_id,
            strategy = %result.strategy,
            model_type = %result.model_type,
            confidence = result.confidence,
            "Evaluated initiative"
        );
        Ok(result)
    }

    /// Run an evaluation without writing anything.
    pub async fn compute(&self, job_dir: impl AsRef<Path>) -> Result<EvaluationResult, EvaluateError> {
        self.compute_with(job_dir.as_ref(), EvaluateOptions::default()).await
    }

    pub async fn compute_with(
        &self,
        job_dir: &Path,
        options: EvaluateOptions,
    ) -> Result<EvaluationResult, EvaluateError> {
        let manifest = Manifest::load(job_dir)?;
        tracing::debug!(
            state = ?RunState::ManifestLoaded,
            initiative_id = %manifest.initiative_id,
            strategy = %manifest.evaluate_strategy
        );

        let reviewer = self.registry.resolve(&manifest.model_type)?;
        tracing::debug!(state = ?RunState::ReviewerResolved, reviewer = %reviewer.name);

        let mut event = load_scorer_event(&manifest, job_dir)?;
        if let Some(cost) = options.cost_to_scale {
            event.cost_to_scale = cost;
        }
        let payload = reviewer.loader.load(&manifest, job_dir)?;
        tracing::debug!(
            state = ?RunState::PayloadBuilt,
            artifact_chars = payload.artifact_text.len(),
            sample_size = payload.sample_size
        );

        let range = reviewer.confidence_range;
        let (confidence, report) = match manifest.evaluate_strategy {
            Strategy::Deterministic => {
                let confidence = score_confidence(&event.initiative_id, range);
                tracing::debug!(state = ?RunState::ScoreComputed, confidence);
                (confidence, StrategyReport::deterministic(range))
            }
            Strategy::Review => {
                let report = self.review(&reviewer, &payload).await?;
                tracing::debug!(state = ?RunState::ReviewCompleted, overall = report.overall_score);
                (report.overall_score, StrategyReport::Review(report))
            }
        };

        Ok(EvaluationResult::new(
            &event,
            manifest.evaluate_strategy,
            confidence,
            range,
            report,
        ))
    }

    /// Evaluate independent jobs with at most `concurrency` in flight.
    ///
    /// Results come back in input order; one job failing does not stop the
    /// others.
    pub async fn evaluate_many(
        &self,
        job_dirs: impl IntoIterator<Item = PathBuf>,
        concurrency: usize,
    ) -> Vec<(PathBuf, Result<EvaluationResult, EvaluateError>)> {
        let mut results: Vec<(usize, PathBuf, Result<EvaluationResult, EvaluateError>)> =
            stream::iter(job_dirs.into_iter().enumerate())
                .map(|(index, dir)| async move {
                    let result = self.evaluate(&dir).await;
                    if let Err(e) = &result {
                        tracing::warn!(job_dir = %dir.display(), error = %e, "Evaluation failed");
                    }
                    (index, dir, result)
                })
                .buffer_unordered(concurrency.max(1))
                .collect()
                .await;

        results.sort_by_key(|(index, _, _)| *index);
        results
            .into_iter()
            .map(|(_, dir, result)| (dir, result))
            .collect()
    }

    async fn review(
        &self,
        reviewer: &MethodReviewerDefinition,
        payload: &ArtifactPayload,
    ) -> Result<crate::result::ReviewReport, EvaluateError> {
        let spec = self.prompt_for(reviewer)?;
        let knowledge_context = self.knowledge_context(reviewer, payload)?;
        let provider = self.provider().await?;

        ReviewEngine::new(provider, self.config.backend.clone())
            .review(&spec, payload, &knowledge_context)
            .await
    }

    fn prompt_for(&self, reviewer: &MethodReviewerDefinition) -> Result<Arc<PromptSpec>, EvaluateError> {
        let named = self
            .config
            .method_override(&reviewer.name)
            .and_then(|o| o.prompt.as_deref());

        let spec = match named {
            Some(name) => self.catalog.prompt(name)?,
            None => self.catalog.load_prompt(&reviewer.prompt)?,
        };
        Ok(spec)
    }

    fn knowledge_context(
        &self,
        reviewer: &MethodReviewerDefinition,
        payload: &ArtifactPayload,
    ) -> Result<String, EvaluateError> {
        let named = self
            .config
            .method_override(&reviewer.name)
            .and_then(|o| o.knowledge_base.as_deref());

        let kb = match named {
            Some(name) => self.catalog.knowledge(name)?,
            None => reviewer.knowledge.load(&reviewer.name)?,
        };

        let context = match self.config.knowledge.top_k {
            Some(top_k) => {
                let query = format!("{} {}", payload.model_type, payload.artifact_text);
                kb.retrieve(&query, top_k)
                    .into_iter()
                    .map(|chunk| chunk.content)
                    .collect::<Vec<_>>()
                    .join(KNOWLEDGE_SEPARATOR)
            }
            None => kb.all(),
        };

        tracing::debug!(
            knowledge_base = kb.name(),
            documents = kb.len(),
            context_chars = context.len(),
            "Built knowledge context"
        );
        Ok(context)
    }

    async fn provider(&self) -> Result<Arc<dyn LlmProvider>, EvaluateError> {
        let provider = self
            .provider
            .get_or_try_init(|| async {
                let backend = &self.config.backend;
                let provider = self
                    .providers
                    .create(&backend.backend_type, &backend.provider_config())?;
                tracing::debug!(backend = %backend.backend_type, model = %backend.model, "Created review backend");

                Ok::<_, EvaluateError>(match self.retry {
                    Some(policy) => Arc::new(RetryingProvider::new(provider, policy)) as Arc<dyn LlmProvider>,
                    None => provider,
                })
            })
            .await?;
        Ok(provider.clone())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("methods", &self.registry.available())
            .field("backend", &self.config.backend.backend_type)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Builder for [`Dispatcher`].
#[derive(Default)]
pub struct DispatcherBuilder {
    registry: Option<Arc<MethodReviewerRegistry>>,
    catalog: Option<Arc<Catalog>>,
    config: EvaluateConfig,
    providers: Option<ProviderRegistry>,
    provider: Option<Arc<dyn LlmProvider>>,
    retry: Option<RetryPolicy>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a populated registry instead of the built-ins.
    pub fn registry(mut self, registry: Arc<MethodReviewerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn config(mut self, config: EvaluateConfig) -> Self {
        self.config = config;
        self
    }

    /// Backend factories to pick `backend.type` from.
    pub fn providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Use this provider for every review, ignoring `backend.type`.
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Retry transient backend failures.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn build(self) -> Result<Dispatcher, EvaluateError> {
        let registry = match self.registry {
            Some(registry) => registry,
            None => Arc::new(MethodReviewerRegistry::with_builtins()?),
        };
        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(Catalog::with_builtins()));

        let provider = OnceCell::new();
        if let Some(injected) = self.provider {
            let injected = match self.retry {
                Some(policy) => Arc::new(RetryingProvider::new(injected, policy)) as Arc<dyn LlmProvider>,
                None => injected,
            };
            // A fresh cell is always empty.
            let _ = provider.set(injected);
        }

        Ok(Dispatcher {
            registry,
            catalog,
            config: self.config,
            providers: Arc::new(self.providers.unwrap_or_else(ProviderRegistry::with_defaults)),
            retry: self.retry,
            provider,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::StubProvider;
    use serde_json::json;
    use std::fs;

    fn write_job(dir: &Path, model_type: &str, strategy: &str) {
        let manifest = json!({
            "schema_version": "2.0",
            "model_type": model_type,
            "evaluate_strategy": strategy,
            "initiative_id": "init-42",
            "files": {
                "impact_results": {"path": "impact_results.json", "format": "json"}
            }
        });
        fs::write(dir.join("manifest.json"), manifest.to_string()).unwrap();
        fs::write(
            dir.join("impact_results.json"),
            json!({
                "ci_upper": 0.18,
                "effect_estimate": 0.12,
                "ci_lower": 0.06,
                "cost_to_scale": 5000.0,
                "sample_size": 1200
            })
            .to_string(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_compute_does_not_persist() {
        let dir = tempfile::tempdir().unwrap();
        write_job(dir.path(), "experiment", "deterministic");

        let dispatcher = Dispatcher::builder().build().unwrap();
        let result = dispatcher.compute(dir.path()).await.unwrap();

        assert!(result.confidence >= 0.85 && result.confidence <= 1.0);
        assert!(!dir.path().join(persist::DETERMINISTIC_RESULT_FILENAME).exists());
    }

    #[tokio::test]
    async fn test_cost_override() {
        let dir = tempfile::tempdir().unwrap();
        write_job(dir.path(), "quasi_experimental", "score");

        let dispatcher = Dispatcher::builder().build().unwrap();
        let result = dispatcher
            .evaluate_with(dir.path(), EvaluateOptions { cost_to_scale: Some(42.0) })
            .await
            .unwrap();

        assert_eq!(result.cost, 42.0);
        assert_eq!(result.strategy, Strategy::Deterministic);
        assert!(result.confidence >= 0.6 && result.confidence <= 0.85);
        assert!(dir.path().join(persist::DETERMINISTIC_RESULT_FILENAME).exists());
    }

    #[tokio::test]
    async fn test_provider_built_lazily_from_config() {
        let dir = tempfile::tempdir().unwrap();
        write_job(dir.path(), "experiment", "review");

        let config = EvaluateConfig::from_value(&json!({
            "backend": {"type": "stub", "score": 0.65}
        }))
        .unwrap();
        let dispatcher = Dispatcher::builder().config(config).build().unwrap();

        let result = dispatcher.evaluate(dir.path()).await.unwrap();
        assert!((result.confidence - 0.65).abs() < 1e-9);
        assert_eq!(result.report.as_review().unwrap().backend_name, "stub");
    }

    #[tokio::test]
    async fn test_unknown_backend_type() {
        let dir = tempfile::tempdir().unwrap();
        write_job(dir.path(), "experiment", "review");

        let config = EvaluateConfig::from_value(&json!({"backend": {"type": "carrier-pigeon"}})).unwrap();
        let dispatcher = Dispatcher::builder().config(config).build().unwrap();

        let err = dispatcher.evaluate(dir.path()).await.unwrap_err();
        assert!(matches!(err, EvaluateError::Provider(_)));
        assert!(!dir.path().join(persist::REVIEW_RESULT_FILENAME).exists());
    }

    #[tokio::test]
    async fn test_knowledge_top_k_limits_context() {
        static DOCS: &[(&str, &str)] = &[
            ("weather.md", "Barometric readings drift during storms."),
            ("registration.md", "Every experiment should pre-register its analysis plan."),
            ("tides.md", "Tidal charts follow lunar cycles."),
        ];

        let dir = tempfile::tempdir().unwrap();
        write_job(dir.path(), "experiment", "review");

        let mut catalog = Catalog::with_builtins();
        catalog
            .register_knowledge("field_notes", impact_eval_core::KnowledgeSource::Embedded(DOCS))
            .unwrap();
        let config = EvaluateConfig::from_value(&json!({
            "knowledge": {"top_k": 1},
            "methods": {"experiment": {"knowledge_base": "field_notes"}}
        }))
        .unwrap();
        let dispatcher = Dispatcher::builder()
            .config(config)
            .catalog(Arc::new(catalog))
            .provider(Arc::new(StubProvider::new()))
            .build()
            .unwrap();

        let reviewer = dispatcher.registry().resolve("experiment").unwrap();
        let payload = reviewer
            .loader
            .load(&Manifest::load(dir.path()).unwrap(), dir.path())
            .unwrap();
        let context = dispatcher.knowledge_context(&reviewer, &payload).unwrap();
        assert_eq!(context, "Every experiment should pre-register its analysis plan.");

        let spec = dispatcher.prompt_for(&reviewer).unwrap();
        let rendered = impact_eval_core::render(&spec, &payload, &context).unwrap();
        let prompt = format!("{}\n{}", rendered.system, rendered.user);
        assert!(prompt.contains("pre-register its analysis plan"));
        assert!(!prompt.contains("Barometric"));
        assert!(!prompt.contains("Tidal"));
    }

    #[tokio::test]
    async fn test_evaluate_many_keeps_input_order() {
        let root = tempfile::tempdir().unwrap();
        let mut dirs = Vec::new();
        for (i, model_type) in ["experiment", "unknown_method", "quasi_experimental"].iter().enumerate() {
            let dir = root.path().join(format!("job-{i}"));
            fs::create_dir(&dir).unwrap();
            write_job(&dir, model_type, "deterministic");
            dirs.push(dir);
        }

        let dispatcher = Dispatcher::builder().build().unwrap();
        let results = dispatcher.evaluate_many(dirs.clone(), 2).await;

        assert_eq!(results.len(), 3);
        for ((dir, _), expected) in results.iter().zip(&dirs) {
            assert_eq!(dir, expected);
        }
        assert!(results[0].1.is_ok());
        assert!(matches!(results[1].1, Err(EvaluateError::Registry(_))));
        assert!(results[2].1.is_ok());
    }
}
