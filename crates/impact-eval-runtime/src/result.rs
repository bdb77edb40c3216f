//! The unified evaluation output.
//!
//! Both strategies produce an [`EvaluationResult`] with the same flat keys;
//! only the nested `report` differs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use impact_eval_core::{
    ConfidenceRange, Discrepancy, OverallSource, ReviewDimension, ScorerEvent, Strategy,
};

use crate::providers::TokenUsage;

/// Result of one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub initiative_id: String,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    /// Cost to scale the initiative
    pub cost: f64,
    /// Upper confidence bound of the effect estimate
    pub return_best: f64,
    /// Point estimate
    pub return_median: f64,
    /// Lower confidence bound of the effect estimate
    pub return_worst: f64,
    pub model_type: String,
    pub sample_size: u64,
    pub strategy: Strategy,
    pub confidence_range: ConfidenceRange,
    pub report: StrategyReport,
}

impl EvaluationResult {
    /// Combine the flat event fields with a strategy outcome.
    pub fn new(
        event: &ScorerEvent,
        strategy: Strategy,
        confidence: f64,
        confidence_range: ConfidenceRange,
        report: StrategyReport,
    ) -> Self {
        Self {
            initiative_id: event.initiative_id.clone(),
            confidence,
            cost: event.cost_to_scale,
            return_best: event.ci_upper,
            return_median: event.effect_estimate,
            return_worst: event.ci_lower,
            model_type: event.model_type.clone(),
            sample_size: event.sample_size,
            strategy,
            confidence_range,
            report,
        }
    }
}

/// Strategy-specific detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyReport {
    Deterministic {
        confidence_range: ConfidenceRange,
        description: String,
    },
    Review(ReviewReport),
}

impl StrategyReport {
    pub fn deterministic(range: ConfidenceRange) -> Self {
        StrategyReport::Deterministic {
            confidence_range: range,
            description: range.describe(),
        }
    }

    pub fn as_review(&self) -> Option<&ReviewReport> {
        match self {
            StrategyReport::Review(review) => Some(review),
            StrategyReport::Deterministic { .. } => None,
        }
    }
}

/// Outcome of a structured LLM review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewReport {
    pub initiative_id: String,
    /// One per prompt dimension, in declared order
    pub dimensions: Vec<ReviewDimension>,
    pub overall_score: f64,
    pub overall_source: OverallSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discrepancy: Option<Discrepancy>,
    pub raw_response: String,
    pub prompt_name: String,
    pub prompt_version: String,
    pub backend_name: String,
    pub model: String,
    #[serde(default)]
    pub usage: TokenUsage,
    pub reviewed_at: DateTime<Utc>,
}
