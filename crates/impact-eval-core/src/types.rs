//! Core value types shared by both evaluation strategies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form metadata attached to an artifact payload.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// The evaluation input envelope handed to a review.
///
/// Built once per run by the selected reviewer's artifact loader and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPayload {
    /// Initiative identifier
    pub initiative_id: String,

    /// Serialized artifact text shown to the reviewer
    pub artifact_text: String,

    /// Causal inference methodology label
    pub model_type: String,

    /// Sample size, when one of the data files reports it
    pub sample_size: u64,

    /// Loader-specific extras (identification strategy, table shapes, ...)
    #[serde(default)]
    pub metadata: Metadata,
}

/// One scored axis of a structured review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDimension {
    /// Dimension name, as declared by the prompt
    pub name: String,

    /// Score in `[0.0, 1.0]`
    pub score: f64,

    /// Free-text justification
    pub justification: String,
}

/// Flat per-initiative event read from a job's impact results.
///
/// The deterministic strategy reads this instead of the artifact text, and
/// both strategies take the cost and return bounds of the result from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerEvent {
    pub initiative_id: String,
    pub model_type: String,
    pub ci_upper: f64,
    pub effect_estimate: f64,
    pub ci_lower: f64,
    pub cost_to_scale: f64,
    pub sample_size: u64,
}
