//! Error type for evaluation runs.

use thiserror::Error;

use impact_eval_core::{
    ArtifactError, InvalidRangeError, KnowledgeError, ManifestError, ParseError, RegistryError,
    TemplateError,
};

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::persist::PersistError;
use crate::providers::ProviderError;

/// Any failure that aborts an evaluation. No result is persisted when one
/// is returned.
#[derive(Error, Debug)]
pub enum EvaluateError {
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Invalid confidence range: {0}")]
    InvalidRange(#[from] InvalidRangeError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Backend error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Persist error: {0}")]
    Persist(#[from] PersistError),
}

impl EvaluateError {
    /// Whether rerunning the same job could succeed without any change to
    /// its inputs or configuration.
    pub fn is_transient(&self) -> bool {
        match self {
            EvaluateError::Provider(e) => e.is_transient(),
            EvaluateError::Persist(PersistError::Io { .. }) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transient_classification() {
        let timeout: EvaluateError = ProviderError::Timeout(Duration::from_secs(60)).into();
        assert!(timeout.is_transient());
        assert!(timeout.to_string().starts_with("Backend error"));

        let missing: EvaluateError = ManifestError::MissingField("model_type".into()).into();
        assert!(!missing.is_transient());

        let parse: EvaluateError = ParseError::MissingDimension("rigor".into()).into();
        assert!(!parse.is_transient());
    }
}
