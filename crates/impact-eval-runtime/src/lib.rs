//! # impact-eval-runtime
//!
//! Evaluation dispatcher and LLM review engine for impact-eval.
//!
//! `impact-eval-core` decides everything that can be decided without a
//! language model. This crate adds the parts that cannot:
//! - a review backend behind the [`LlmProvider`] trait
//! - the [`ReviewEngine`] that renders a prompt, calls the backend once, and
//!   parses the answer
//! - the [`Dispatcher`] that routes a job directory to a strategy and writes
//!   the unified [`EvaluationResult`]
//!
//! ## Important
//!
//! The review strategy never retries and never degrades: a timeout, a
//! backend error, or a response missing a dimension aborts the run and
//! nothing is written. Wrap the backend in [`RetryingProvider`] to retry at
//! the boundary.
//!
//! ## Example
//!
//! ```rust,ignore
//! use impact_eval_runtime::{Dispatcher, EvaluateConfig};
//!
//! let config = EvaluateConfig::resolve(Some("review_config.yaml".as_ref()))?;
//! let dispatcher = Dispatcher::builder().config(config).build()?;
//!
//! let result = dispatcher.evaluate("jobs/init-42").await?;
//! println!("{} -> {:.3}", result.initiative_id, result.confidence);
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod persist;
pub mod providers;
pub mod result;

pub use cache::TemplateCache;
pub use catalog::{Catalog, CatalogError};
pub use config::{BackendConfig, ConfigError, EvaluateConfig, KnowledgeConfig, MethodOverride};
pub use dispatcher::{Dispatcher, DispatcherBuilder, EvaluateOptions, RunState};
pub use engine::ReviewEngine;
pub use error::EvaluateError;
pub use persist::{
    read_result, result_filename, write_result, PersistError, DETERMINISTIC_RESULT_FILENAME,
    REVIEW_RESULT_FILENAME,
};
pub use providers::{
    ApiCredential, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ProviderFactory, ProviderRegistry, RetryPolicy, RetryingProvider, StubProvider, TokenUsage,
};
pub use result::{EvaluationResult, ReviewReport, StrategyReport};
