//! Domain knowledge for review prompts.
//!
//! Knowledge is a flat set of markdown/text documents. The review prompt
//! receives either every document joined together or, when a retrieval
//! budget is configured, the chunks with the most keyword overlap.

use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Separator placed between documents when they are concatenated.
pub const KNOWLEDGE_SEPARATOR: &str = "\n\n---\n\n";

/// File extensions picked up from knowledge directories, in load order.
const KNOWLEDGE_EXTENSIONS: [&str; 2] = ["md", "txt"];

#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("Failed to read knowledge from {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A retrieved piece of knowledge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub content: String,
    /// Origin (file path or embedded document name)
    pub source: String,
    /// Relevance score, when produced by retrieval
    pub score: Option<f64>,
}

/// Retrieval interface for domain knowledge.
pub trait KnowledgeBase: Send + Sync {
    fn name(&self) -> &str;

    /// Up to `top_k` chunks relevant to `query`, best first.
    fn retrieve(&self, query: &str, top_k: usize) -> Vec<Chunk>;
}

/// Where a reviewer's knowledge documents come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnowledgeSource {
    None,
    /// `(name, content)` pairs compiled into the binary
    Embedded(&'static [(&'static str, &'static str)]),
    /// Directory of `.md` / `.txt` files
    Directory(PathBuf),
}

impl KnowledgeSource {
    pub fn load(&self, name: &str) -> Result<StaticKnowledgeBase, KnowledgeError> {
        match self {
            KnowledgeSource::None => Ok(StaticKnowledgeBase::new(name, Vec::new())),
            KnowledgeSource::Embedded(docs) => Ok(StaticKnowledgeBase::new(
                name,
                docs.iter()
                    .map(|(source, content)| Chunk {
                        content: content.to_string(),
                        source: source.to_string(),
                        score: None,
                    })
                    .collect(),
            )),
            KnowledgeSource::Directory(dir) => StaticKnowledgeBase::from_dir(name, dir),
        }
    }
}

/// In-memory knowledge base with keyword-overlap retrieval.
#[derive(Debug, Clone, Default)]
pub struct StaticKnowledgeBase {
    name: String,
    documents: Vec<Chunk>,
}

impl StaticKnowledgeBase {
    pub fn new(name: impl Into<String>, documents: Vec<Chunk>) -> Self {
        Self {
            name: name.into(),
            documents,
        }
    }

    /// Load every `.md` then every `.txt` file in `dir`, each group sorted by
    /// file name. A missing directory yields an empty knowledge base.
    pub fn from_dir(name: impl Into<String>, dir: &Path) -> Result<Self, KnowledgeError> {
        let name = name.into();
        if !dir.is_dir() {
            tracing::warn!(path = %dir.display(), "Knowledge directory does not exist");
            return Ok(Self::new(name, Vec::new()));
        }

        let io_err = |source| KnowledgeError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() {
                paths.push(path);
            }
        }

        let mut documents = Vec::new();
        for ext in KNOWLEDGE_EXTENSIONS {
            let mut group: Vec<&PathBuf> = paths
                .iter()
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(ext))
                .collect();
            group.sort();

            for path in group {
                let content = fs::read_to_string(path).map_err(|source| KnowledgeError::Io {
                    path: path.clone(),
                    source,
                })?;
                tracing::debug!(path = %path.display(), chars = content.len(), "Loaded knowledge file");
                documents.push(Chunk {
                    content,
                    source: path.display().to_string(),
                    score: None,
                });
            }
        }

        Ok(Self::new(name, documents))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Every document joined with [`KNOWLEDGE_SEPARATOR`].
    pub fn all(&self) -> String {
        self.documents
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join(KNOWLEDGE_SEPARATOR)
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

impl KnowledgeBase for StaticKnowledgeBase {
    fn name(&self) -> &str {
        &self.name
    }

    /// Scores each document by the fraction of query tokens it contains.
    /// Documents with no overlap are dropped; ties keep load order.
    fn retrieve(&self, query: &str, top_k: usize) -> Vec<Chunk> {
        let query_tokens = tokens(query);
        if query_tokens.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<Chunk> = self
            .documents
            .iter()
            .filter_map(|doc| {
                let doc_tokens = tokens(&doc.content);
                let overlap = query_tokens.intersection(&doc_tokens).count();
                (overlap > 0).then(|| Chunk {
                    content: doc.content.clone(),
                    source: doc.source.clone(),
                    score: Some(overlap as f64 / query_tokens.len() as f64),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .unwrap_or(0.0)
                .partial_cmp(&a.score.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        scored
    }
}
