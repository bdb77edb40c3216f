//! Method reviewer registry.
//!
//! Maps a manifest's methodology label to the bundle that knows how to
//! review it. The registry is populated once at startup, then shared behind
//! an `Arc` and only read; lookups take no locks.
//!
//! ## Usage
//!
//! ```ignore
//! let mut registry = MethodReviewerRegistry::new();
//! registry.register_builtins()?;
//! registry.register("synthetic_control", my_definition)?;
//! let registry = Arc::new(registry);
//!
//! let reviewer = registry.resolve(&manifest.model_type)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::artifact::ArtifactLoader;
use crate::knowledge::KnowledgeSource;
use crate::methods::{default_loader, BuiltinMethod};
use crate::prompt::PromptRef;
use crate::scorer::{ConfidenceRange, InvalidRangeError};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Unknown method {name:?}. Available: {}", format_available(.available))]
    UnknownMethod { name: String, available: Vec<String> },

    #[error("Method {0:?} is already registered")]
    Duplicate(String),

    #[error("Cannot register definition {definition:?} under name {name:?}")]
    NameMismatch { name: String, definition: String },

    #[error(transparent)]
    InvalidRange(#[from] InvalidRangeError),
}

fn format_available(available: &[String]) -> String {
    if available.is_empty() {
        "(none)".to_string()
    } else {
        available.join(", ")
    }
}

/// Everything needed to evaluate one methodology.
#[derive(Debug, Clone)]
pub struct MethodReviewerDefinition {
    pub name: String,
    pub description: String,
    /// Bounds for the deterministic strategy
    pub confidence_range: ConfidenceRange,
    /// Default review prompt
    pub prompt: PromptRef,
    /// Default domain knowledge
    pub knowledge: KnowledgeSource,
    /// Builds the review payload from the job directory
    pub loader: Arc<dyn ArtifactLoader>,
}

impl MethodReviewerDefinition {
    /// A definition with no knowledge and the default artifact loader.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        confidence_range: ConfidenceRange,
        prompt: PromptRef,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            confidence_range,
            prompt,
            knowledge: KnowledgeSource::None,
            loader: default_loader(),
        }
    }

    pub fn with_knowledge(mut self, knowledge: KnowledgeSource) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn ArtifactLoader>) -> Self {
        self.loader = loader;
        self
    }
}

/// Registry of method reviewers keyed by methodology label.
#[derive(Debug, Default)]
pub struct MethodReviewerRegistry {
    methods: BTreeMap<String, Arc<MethodReviewerDefinition>>,
}

impl MethodReviewerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every [`BuiltinMethod`].
    pub fn with_builtins() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register_builtins()?;
        Ok(registry)
    }

    /// Register every [`BuiltinMethod`].
    pub fn register_builtins(&mut self) -> Result<(), RegistryError> {
        for method in BuiltinMethod::ALL {
            self.register(method.name(), method.definition()?)?;
        }
        Ok(())
    }

    /// Register `definition` under `name`.
    ///
    /// Names are never replaced: a second registration is an error. `name`
    /// must match the definition's own name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        definition: MethodReviewerDefinition,
    ) -> Result<Arc<MethodReviewerDefinition>, RegistryError> {
        let name = name.into();
        if definition.name != name {
            return Err(RegistryError::NameMismatch {
                name,
                definition: definition.name,
            });
        }
        if self.methods.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }

        let definition = Arc::new(definition);
        tracing::debug!(method = %name, range = %definition.confidence_range, "Registered method reviewer");
        self.methods.insert(name, Arc::clone(&definition));
        Ok(definition)
    }

    /// Look up the reviewer for a methodology label.
    pub fn resolve(&self, name: &str) -> Result<Arc<MethodReviewerDefinition>, RegistryError> {
        self.methods
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownMethod {
                name: name.to_string(),
                available: self.available().into_iter().map(String::from).collect(),
            })
    }

    /// Registered names, sorted.
    pub fn available(&self) -> Vec<&str> {
        self.methods.keys().map(|s| s.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Registered definitions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<MethodReviewerDefinition>> {
        self.methods.values()
    }
}
