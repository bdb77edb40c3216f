//! Manifest parsing from a job directory.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use super::schema::validate_manifest_schema;

/// File name of the manifest inside a job directory.
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Strategy used when a manifest omits `evaluate_strategy`.
///
/// Older producers never wrote the field and always expected an LLM review.
pub const DEFAULT_STRATEGY: Strategy = Strategy::Review;

/// Errors that can occur when loading a manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read manifest: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse manifest JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Manifest missing required field: {0}")]
    MissingField(String),

    #[error("Manifest failed schema validation: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error("Unknown evaluate_strategy: {0:?}")]
    UnknownStrategy(String),
}

/// Evaluation strategy selected by the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Seeded draw from the reviewer's confidence range.
    #[serde(alias = "score")]
    Deterministic,

    /// Structured LLM review.
    #[serde(alias = "agentic")]
    Review,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Deterministic => "deterministic",
            Strategy::Review => "review",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deterministic" | "score" => Ok(Strategy::Deterministic),
            "review" | "agentic" => Ok(Strategy::Review),
            other => Err(ManifestError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Format of a data file referenced by the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Json,
    #[serde(alias = "yml")]
    Yaml,
    Csv,
    #[serde(alias = "txt")]
    Text,
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileFormat::Json => "json",
            FileFormat::Yaml => "yaml",
            FileFormat::Csv => "csv",
            FileFormat::Text => "text",
        };
        f.write_str(s)
    }
}

/// A single file reference within a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Logical name (the key in the manifest's `files` mapping)
    pub name: String,

    /// Path relative to the job directory
    pub path: String,

    /// File format
    pub format: FileFormat,
}

#[derive(Debug, Deserialize)]
struct RawFileEntry {
    path: String,
    format: FileFormat,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    schema_version: String,
    model_type: String,
    #[serde(default)]
    evaluate_strategy: Option<String>,
    #[serde(default)]
    initiative_id: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    files: serde_json::Map<String, serde_json::Value>,
}

/// Parsed manifest for a job directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    /// Manifest schema version
    pub schema_version: String,

    /// Causal inference methodology label
    pub model_type: String,

    /// Evaluation strategy (defaults to [`DEFAULT_STRATEGY`])
    pub evaluate_strategy: Strategy,

    /// Initiative identifier; the job directory name when not given
    pub initiative_id: String,

    /// ISO-8601 creation timestamp, when the producer wrote one
    pub created_at: Option<String>,

    /// File index in manifest order
    pub files: Vec<FileEntry>,
}

impl Manifest {
    /// Load and validate `manifest.json` from a job directory.
    pub fn load(job_dir: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let job_dir = job_dir.as_ref();
        let manifest_path = job_dir.join(MANIFEST_FILENAME);

        if !manifest_path.is_file() {
            return Err(ManifestError::NotFound(manifest_path));
        }

        let contents = fs::read_to_string(&manifest_path)?;
        let manifest = Self::from_json(&contents, &job_dir_name(job_dir))?;

        tracing::debug!(
            path = %manifest_path.display(),
            model_type = %manifest.model_type,
            strategy = %manifest.evaluate_strategy,
            files = manifest.files.len(),
            "Loaded manifest"
        );

        Ok(manifest)
    }

    /// Parse a manifest from a JSON string.
    ///
    /// `fallback_initiative_id` is used when the manifest carries no
    /// `initiative_id` (normally the job directory name).
    pub fn from_json(json: &str, fallback_initiative_id: &str) -> Result<Self, ManifestError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value, fallback_initiative_id)
    }

    /// Parse a manifest from an already-decoded JSON value.
    pub fn from_value(
        value: serde_json::Value,
        fallback_initiative_id: &str,
    ) -> Result<Self, ManifestError> {
        // Required fields are checked before the schema so the error names them.
        for field in ["schema_version", "model_type", "files"] {
            if value.get(field).is_none() {
                return Err(ManifestError::MissingField(field.to_string()));
            }
        }

        validate_manifest_schema(&value).map_err(ManifestError::SchemaViolation)?;

        let raw: RawManifest = serde_json::from_value(value)?;

        let evaluate_strategy = match raw.evaluate_strategy.as_deref() {
            Some(s) => s.parse()?,
            None => DEFAULT_STRATEGY,
        };

        let mut files = Vec::with_capacity(raw.files.len());
        for (name, entry) in raw.files {
            let entry: RawFileEntry = serde_json::from_value(entry)?;
            files.push(FileEntry {
                name,
                path: entry.path,
                format: entry.format,
            });
        }

        let initiative_id = raw
            .initiative_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| fallback_initiative_id.to_string());

        Ok(Self {
            schema_version: raw.schema_version,
            model_type: raw.model_type,
            evaluate_strategy,
            initiative_id,
            created_at: raw.created_at,
            files,
        })
    }

    /// Look up a file entry by logical name.
    pub fn file(&self, name: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.name == name)
    }
}

fn job_dir_name(job_dir: &Path) -> String {
    // `canonicalize` resolves "." and trailing separators to a real name.
    let resolved = job_dir
        .canonicalize()
        .unwrap_or_else(|_| job_dir.to_path_buf());
    resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
