//! # impact-eval-core
//!
//! Deterministic building blocks for evaluating causal-effect estimates.
//!
//! This crate answers everything about an evaluation that does not need a
//! language model:
//! - Which methodology and strategy does this job ask for?
//! - What confidence range does that methodology carry?
//! - What does the reviewer get to read, and how is its answer scored?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: the scorer depends only on the initiative id and range
//! 2. **No LLM calls**: prompt rendering and response parsing are pure
//! 3. **No partial results**: a response missing a dimension is an error
//! 4. **Lock-free lookups**: the reviewer registry is frozen before use
//!
//! ## Example
//!
//! ```rust,ignore
//! use impact_eval_core::{Manifest, MethodReviewerRegistry, score_confidence};
//!
//! let registry = MethodReviewerRegistry::with_builtins()?;
//! let manifest = Manifest::load("jobs/init-42")?;
//! let reviewer = registry.resolve(&manifest.model_type)?;
//!
//! let confidence = score_confidence(&manifest.initiative_id, reviewer.confidence_range);
//! ```

pub mod artifact;
pub mod knowledge;
pub mod manifest;
pub mod methods;
pub mod parser;
pub mod prompt;
pub mod registry;
pub mod scorer;
pub mod types;

// Re-export main types at crate root
pub use artifact::{
    load_scorer_event, ArtifactError, ArtifactLoader, DefaultArtifactLoader,
    QuasiExperimentalLoader,
};
pub use knowledge::{
    Chunk, KnowledgeBase, KnowledgeError, KnowledgeSource, StaticKnowledgeBase,
    KNOWLEDGE_SEPARATOR,
};
pub use manifest::{
    FileEntry, FileFormat, Manifest, ManifestError, Strategy, DEFAULT_STRATEGY, MANIFEST_FILENAME,
};
pub use methods::BuiltinMethod;
pub use parser::{
    parse, Discrepancy, OverallSource, ParseError, ParsedReview, RawResponse,
    DISCREPANCY_TOLERANCE,
};
pub use prompt::{render, PromptRef, PromptSource, PromptSpec, RenderedPrompt, TemplateError};
pub use registry::{MethodReviewerDefinition, MethodReviewerRegistry, RegistryError};
pub use scorer::{score, score_confidence, ConfidenceRange, InvalidRangeError};
pub use types::{ArtifactPayload, Metadata, ReviewDimension, ScorerEvent};

#[cfg(test)]
mod tests {
    use super::*;

    /// Render a built-in prompt, answer it with exactly its dimensions, and
    /// parse the answer back.
    #[test]
    fn test_render_then_parse_round_trip() {
        let registry = MethodReviewerRegistry::with_builtins().unwrap();
        let reviewer = registry.resolve("experiment").unwrap();
        let spec = reviewer.prompt.load().unwrap();
        let knowledge = reviewer.knowledge.load(&reviewer.name).unwrap();

        let payload = ArtifactPayload {
            initiative_id: "init-42".into(),
            artifact_text: "ATE = 0.12 (95% CI 0.06 to 0.18)".into(),
            model_type: "experiment".into(),
            sample_size: 1200,
            metadata: Metadata::new(),
        };

        let rendered = render(&spec, &payload, &knowledge.all()).unwrap();
        assert!(rendered.user.contains("ATE = 0.12"));
        assert!(rendered.user.contains("Sample size: 1200"));
        assert!(rendered.system.contains("SUTVA"));

        let response: String = spec
            .dimensions
            .iter()
            .map(|d| format!("DIMENSION: {}\nSCORE: 0.8\nJUSTIFICATION: Adequate.\n\n", d))
            .collect::<String>()
            + "OVERALL: 0.8\n";

        let parsed = parse(&RawResponse::free_text(response), &spec.dimensions).unwrap();
        let names: Vec<&String> = parsed.dimensions.iter().map(|d| &d.name).collect();
        let declared: Vec<&String> = spec.dimensions.iter().collect();
        assert_eq!(names, declared);
        assert_eq!(parsed.overall_score, 0.8);
    }
}
