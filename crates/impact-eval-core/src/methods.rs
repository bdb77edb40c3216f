//! Built-in methodology reviewers.
//!
//! Prompts and knowledge documents live under `methods/` in this crate and
//! are compiled in, so a release binary needs no data directory.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::artifact::{DefaultArtifactLoader, QuasiExperimentalLoader};
use crate::knowledge::KnowledgeSource;
use crate::prompt::PromptRef;
use crate::registry::{MethodReviewerDefinition, RegistryError};
use crate::scorer::ConfidenceRange;

pub const EXPERIMENT_PROMPT_YAML: &str =
    include_str!("../methods/experiment/experiment_review.yaml");

pub const QUASI_EXPERIMENTAL_PROMPT_YAML: &str =
    include_str!("../methods/quasi_experimental/quasi_experimental_review.yaml");

pub static EXPERIMENT_KNOWLEDGE: &[(&str, &str)] = &[
    (
        "common_pitfalls.md",
        include_str!("../methods/experiment/knowledge/common_pitfalls.md"),
    ),
    (
        "design_principles.md",
        include_str!("../methods/experiment/knowledge/design_principles.md"),
    ),
];

pub static QUASI_EXPERIMENTAL_KNOWLEDGE: &[(&str, &str)] = &[
    (
        "identification.md",
        include_str!("../methods/quasi_experimental/knowledge/identification.md"),
    ),
    (
        "robustness.md",
        include_str!("../methods/quasi_experimental/knowledge/robustness.md"),
    ),
];

/// Methodologies shipped with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinMethod {
    /// Randomized controlled trial
    Experiment,
    /// Difference-in-differences, regression discontinuity, instrumental variables
    QuasiExperimental,
}

impl BuiltinMethod {
    pub const ALL: [BuiltinMethod; 2] = [BuiltinMethod::Experiment, BuiltinMethod::QuasiExperimental];

    /// Registry key (the manifest's `model_type`).
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinMethod::Experiment => "experiment",
            BuiltinMethod::QuasiExperimental => "quasi_experimental",
        }
    }

    pub fn prompt_name(&self) -> &'static str {
        match self {
            BuiltinMethod::Experiment => "experiment_review",
            BuiltinMethod::QuasiExperimental => "quasi_experimental_review",
        }
    }

    pub fn prompt_version(&self) -> &'static str {
        "1.0"
    }

    pub fn prompt(&self) -> PromptRef {
        let yaml = match self {
            BuiltinMethod::Experiment => EXPERIMENT_PROMPT_YAML,
            BuiltinMethod::QuasiExperimental => QUASI_EXPERIMENTAL_PROMPT_YAML,
        };
        PromptRef::embedded(self.prompt_name(), self.prompt_version(), yaml)
    }

    pub fn knowledge(&self) -> KnowledgeSource {
        match self {
            BuiltinMethod::Experiment => KnowledgeSource::Embedded(EXPERIMENT_KNOWLEDGE),
            BuiltinMethod::QuasiExperimental => {
                KnowledgeSource::Embedded(QUASI_EXPERIMENTAL_KNOWLEDGE)
            }
        }
    }

    /// Declared `(low, high)` confidence bounds.
    ///
    /// Quasi-experimental designs sit lower because their credibility rests
    /// on identifying assumptions rather than randomization.
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            BuiltinMethod::Experiment => (0.85, 1.0),
            BuiltinMethod::QuasiExperimental => (0.60, 0.85),
        }
    }

    /// Build this method's reviewer definition.
    pub fn definition(&self) -> Result<MethodReviewerDefinition, RegistryError> {
        let (low, high) = self.bounds();
        let range = ConfidenceRange::new(low, high)?;

        let definition = match self {
            BuiltinMethod::Experiment => MethodReviewerDefinition::new(
                self.name(),
                "Review experimental (RCT) impact measurement artifacts.",
                range,
                self.prompt(),
            ),
            BuiltinMethod::QuasiExperimental => MethodReviewerDefinition::new(
                self.name(),
                "Review quasi-experimental (DiD, RDD, IV) impact measurement artifacts.",
                range,
                self.prompt(),
            )
            .with_loader(Arc::new(QuasiExperimentalLoader)),
        };

        Ok(definition.with_knowledge(self.knowledge()))
    }
}

impl fmt::Display for BuiltinMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BuiltinMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| format!("not a built-in method: {}", s))
    }
}

/// Default loader shared by methods without an override.
pub(crate) fn default_loader() -> Arc<DefaultArtifactLoader> {
    Arc::new(DefaultArtifactLoader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_prompts_load_with_five_dimensions() {
        for method in BuiltinMethod::ALL {
            let spec = method.prompt().load().unwrap();
            assert_eq!(spec.name, method.prompt_name());
            assert_eq!(spec.version, "1.0");
            assert_eq!(spec.dimensions.len(), 5, "{} dimensions", method);
        }
    }

    #[test]
    fn test_builtin_knowledge_is_not_empty() {
        for method in BuiltinMethod::ALL {
            let kb = method.knowledge().load(method.name()).unwrap();
            assert!(!kb.is_empty());
        }
        let experiment = BuiltinMethod::Experiment.knowledge().load("experiment").unwrap();
        assert!(experiment.all().contains("SUTVA"));
    }

    #[test]
    fn test_builtin_ranges() {
        let experiment = BuiltinMethod::Experiment.definition().unwrap();
        assert_eq!(experiment.confidence_range.low(), 0.85);
        assert_eq!(experiment.confidence_range.high(), 1.0);

        let quasi = BuiltinMethod::QuasiExperimental.definition().unwrap();
        assert_eq!(quasi.confidence_range.low(), 0.60);
        assert_eq!(quasi.confidence_range.high(), 0.85);
    }

    #[test]
    fn test_name_round_trip() {
        for method in BuiltinMethod::ALL {
            assert_eq!(method.name().parse::<BuiltinMethod>().unwrap(), method);
        }
        assert!("synthetic_control".parse::<BuiltinMethod>().is_err());
    }
}
