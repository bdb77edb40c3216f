//! Prompt template cache.
//!
//! Template files are parsed and validated once per reference (name,
//! version and source) and shared across concurrent evaluations.

use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

use impact_eval_core::{PromptRef, PromptSpec, TemplateError};

/// Loaded [`PromptSpec`]s keyed by the full [`PromptRef`], so two sources
/// declaring the same name and version never share an entry.
#[derive(Clone)]
pub struct TemplateCache {
    cache: Cache<PromptRef, Arc<PromptSpec>>,
}

impl TemplateCache {
    /// A cache holding at most `max_entries` templates. `ttl` bounds how long
    /// an edited file on disk can go unnoticed; `None` keeps entries for the
    /// life of the process.
    pub fn new(max_entries: u64, ttl: Option<Duration>) -> Self {
        let builder = Cache::builder().max_capacity(max_entries);
        let cache = match ttl {
            Some(ttl) => builder.time_to_live(ttl).build(),
            None => builder.build(),
        };
        Self { cache }
    }

    /// The cached template for `prompt`, loading it on a miss.
    ///
    /// Failed loads are not cached, so a fixed file is picked up on the next
    /// call.
    pub fn get_or_load(&self, prompt: &PromptRef) -> Result<Arc<PromptSpec>, TemplateError> {
        if let Some(spec) = self.cache.get(prompt) {
            return Ok(spec);
        }

        let spec = Arc::new(prompt.load()?);
        self.cache.insert(prompt.clone(), spec.clone());
        Ok(spec)
    }

    pub fn contains(&self, prompt: &PromptRef) -> bool {
        self.cache.contains_key(prompt)
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate number of cached templates.
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new(256, None)
    }
}

impl std::fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use impact_eval_core::BuiltinMethod;

    const CUSTOM: &str = r#"
name: custom_review
version: "2.0"
description: Custom
dimensions: [rigor, clarity]
system: "System"
user: "{{ artifact }}"
"#;

    #[test]
    fn test_cache_hit_returns_same_arc() {
        let cache = TemplateCache::default();
        let prompt = BuiltinMethod::Experiment.prompt();

        assert!(!cache.contains(&prompt));
        let first = cache.get_or_load(&prompt).unwrap();
        let second = cache.get_or_load(&prompt).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.contains(&prompt));
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_file_read_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, CUSTOM).unwrap();

        let cache = TemplateCache::default();
        let prompt = PromptRef::file("custom_review", "2.0", &path);
        let first = cache.get_or_load(&prompt).unwrap();

        std::fs::remove_file(&path).unwrap();
        let second = cache.get_or_load(&prompt).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_errors_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        let cache = TemplateCache::default();
        let prompt = PromptRef::file("custom_review", "2.0", &path);

        assert!(cache.get_or_load(&prompt).is_err());
        std::fs::write(&path, CUSTOM).unwrap();
        assert_eq!(cache.get_or_load(&prompt).unwrap().dimensions, vec!["rigor", "clarity"]);
    }

    #[test]
    fn test_same_name_and_version_from_another_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment_review.yaml");
        std::fs::write(
            &path,
            r#"
name: experiment_review
version: "1.0"
dimensions: [power_analysis]
system: "System"
user: "{{ artifact }}"
"#,
        )
        .unwrap();

        let cache = TemplateCache::default();
        let builtin = cache.get_or_load(&BuiltinMethod::Experiment.prompt()).unwrap();
        let custom = cache
            .get_or_load(&PromptRef::file("experiment_review", "1.0", &path))
            .unwrap();

        assert_eq!(builtin.dimensions.len(), 5);
        assert_eq!(custom.dimensions, vec!["power_analysis"]);
        assert_eq!(cache.entry_count(), 2);
    }
}
