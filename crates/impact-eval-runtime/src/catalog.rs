//! Named prompts and knowledge bases.
//!
//! Reviewers carry default prompt and knowledge references; the catalog lets
//! configuration swap either one by name (`methods.<name>.prompt`,
//! `methods.<name>.knowledge_base`). It is populated at startup and shared
//! read-only; loaded templates go through a [`TemplateCache`].

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use impact_eval_core::{
    BuiltinMethod, KnowledgeError, KnowledgeSource, PromptRef, PromptSpec, StaticKnowledgeBase,
    TemplateError,
};

use crate::cache::TemplateCache;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Unknown prompt {name:?}. Available: {}", .available.join(", "))]
    UnknownPrompt { name: String, available: Vec<String> },

    #[error("Unknown knowledge base {name:?}. Available: {}", .available.join(", "))]
    UnknownKnowledgeBase { name: String, available: Vec<String> },

    #[error("{kind} {name:?} is already registered")]
    Duplicate { kind: &'static str, name: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),
}

#[derive(Debug, Default)]
pub struct Catalog {
    prompts: BTreeMap<String, PromptRef>,
    knowledge: BTreeMap<String, KnowledgeSource>,
    templates: TemplateCache,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding every built-in prompt (by prompt name) and
    /// knowledge base (by method name).
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        for method in BuiltinMethod::ALL {
            let prompt = method.prompt();
            catalog.prompts.insert(prompt.name.clone(), prompt);
            catalog
                .knowledge
                .insert(method.name().to_string(), method.knowledge());
        }
        catalog
    }

    /// Register a prompt under its declared name.
    pub fn register_prompt(&mut self, prompt: PromptRef) -> Result<(), CatalogError> {
        if self.prompts.contains_key(&prompt.name) {
            return Err(CatalogError::Duplicate {
                kind: "Prompt",
                name: prompt.name,
            });
        }
        tracing::debug!(prompt = %prompt.name, version = %prompt.version, "Registered prompt");
        self.prompts.insert(prompt.name.clone(), prompt);
        Ok(())
    }

    pub fn register_knowledge(
        &mut self,
        name: impl Into<String>,
        source: KnowledgeSource,
    ) -> Result<(), CatalogError> {
        let name = name.into();
        if self.knowledge.contains_key(&name) {
            return Err(CatalogError::Duplicate {
                kind: "Knowledge base",
                name,
            });
        }
        tracing::debug!(knowledge_base = %name, "Registered knowledge base");
        self.knowledge.insert(name, source);
        Ok(())
    }

    /// Load a template through the cache.
    pub fn load_prompt(&self, prompt: &PromptRef) -> Result<Arc<PromptSpec>, CatalogError> {
        Ok(self.templates.get_or_load(prompt)?)
    }

    /// Load the prompt registered as `name`.
    pub fn prompt(&self, name: &str) -> Result<Arc<PromptSpec>, CatalogError> {
        let prompt = self
            .prompts
            .get(name)
            .ok_or_else(|| CatalogError::UnknownPrompt {
                name: name.to_string(),
                available: self.prompt_names().into_iter().map(String::from).collect(),
            })?;
        self.load_prompt(prompt)
    }

    /// Load the knowledge base registered as `name`.
    pub fn knowledge(&self, name: &str) -> Result<StaticKnowledgeBase, CatalogError> {
        let source = self
            .knowledge
            .get(name)
            .ok_or_else(|| CatalogError::UnknownKnowledgeBase {
                name: name.to_string(),
                available: self.knowledge_names().into_iter().map(String::from).collect(),
            })?;
        Ok(source.load(name)?)
    }

    pub fn prompt_names(&self) -> Vec<&str> {
        self.prompts.keys().map(String::as_str).collect()
    }

    pub fn knowledge_names(&self) -> Vec<&str> {
        self.knowledge.keys().map(String::as_str).collect()
    }

    pub fn templates(&self) -> &TemplateCache {
        &self.templates
    }
}
