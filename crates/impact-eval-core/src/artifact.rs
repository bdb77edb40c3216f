//! Artifact loading from job directories.
//!
//! A loader turns a manifest's file index into an [`ArtifactPayload`]. The
//! default loader concatenates every referenced file; methodology-specific
//! loaders implement [`ArtifactLoader`] to summarize or lift extra fields.

use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::manifest::{FileEntry, FileFormat, Manifest};
use crate::types::{ArtifactPayload, Metadata, ScorerEvent};

/// Manifest entry naming the impact results file.
pub const IMPACT_RESULTS_ENTRY: &str = "impact_results";

/// Results file looked up when the manifest has no `impact_results` entry.
pub const IMPACT_RESULTS_FILENAME: &str = "impact_results.json";

/// Errors raised while reading a job's data files.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Manifest has no file entries")]
    NoFileEntries,

    #[error("Artifact file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {} as JSON: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse {} as YAML: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Impact results in {} must be a JSON object", .0.display())]
    InvalidResults(PathBuf),

    #[error("Field {field:?} in {} is not a number: {value}", .path.display())]
    InvalidNumber {
        path: PathBuf,
        field: String,
        value: String,
    },
}

/// Builds the review payload for one methodology.
///
/// Implementations must be pure with respect to the job directory: they read
/// files but never write them.
pub trait ArtifactLoader: Send + Sync + fmt::Debug {
    fn load(&self, manifest: &Manifest, job_dir: &Path) -> Result<ArtifactPayload, ArtifactError>;
}

/// A data file read from the job directory.
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub entry: FileEntry,
    pub text: String,
    /// Structured content for JSON and YAML files
    pub value: Option<Value>,
}

impl LoadedFile {
    /// Read and, for structured formats, decode one manifest entry.
    pub fn read(job_dir: &Path, entry: &FileEntry) -> Result<Self, ArtifactError> {
        let path = job_dir.join(&entry.path);
        if !path.is_file() {
            return Err(ArtifactError::NotFound(path));
        }

        let text = fs::read_to_string(&path).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;

        let value = match entry.format {
            FileFormat::Json => Some(
                serde_json::from_str(&text)
                    .map_err(|source| ArtifactError::Json { path, source })?,
            ),
            FileFormat::Yaml => Some(
                serde_yaml::from_str(&text)
                    .map_err(|source| ArtifactError::Yaml { path, source })?,
            ),
            FileFormat::Csv | FileFormat::Text => None,
        };

        Ok(Self {
            entry: entry.clone(),
            text,
            value,
        })
    }

    fn header(&self) -> String {
        format!("=== {} ({}) ===", self.entry.name, self.entry.format)
    }
}

/// Read every file in the manifest's index, in order.
pub fn read_all(manifest: &Manifest, job_dir: &Path) -> Result<Vec<LoadedFile>, ArtifactError> {
    if manifest.files.is_empty() {
        return Err(ArtifactError::NoFileEntries);
    }
    manifest
        .files
        .iter()
        .map(|entry| LoadedFile::read(job_dir, entry))
        .collect()
}

/// `sample_size` from the first JSON file that carries one.
pub fn first_sample_size(files: &[LoadedFile]) -> u64 {
    files
        .iter()
        .filter(|f| f.entry.format == FileFormat::Json)
        .filter_map(|f| f.value.as_ref()?.get("sample_size").and_then(as_u64))
        .next()
        .unwrap_or(0)
}

/// A JSON number, or a string holding one.
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        other => other.as_f64(),
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| as_f64(value).filter(|v| *v >= 0.0).map(|v| v as u64))
}

/// Reads every file and concatenates them under per-file headers.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultArtifactLoader;

impl ArtifactLoader for DefaultArtifactLoader {
    fn load(&self, manifest: &Manifest, job_dir: &Path) -> Result<ArtifactPayload, ArtifactError> {
        let files = read_all(manifest, job_dir)?;

        let artifact_text = files
            .iter()
            .map(|f| format!("{}\n{}", f.header(), f.text.trim_end()))
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(ArtifactPayload {
            initiative_id: manifest.initiative_id.clone(),
            artifact_text,
            model_type: manifest.model_type.clone(),
            sample_size: first_sample_size(&files),
            metadata: Metadata::new(),
        })
    }
}

/// Fields describing a quasi-experimental identification strategy.
const IDENTIFICATION_FIELDS: [&str; 3] = ["method", "identification_strategy", "design"];

/// Loader for quasi-experimental designs (DiD, RDD, IV).
///
/// Tabular JSON (an array of objects) is summarized as a row count and column
/// list instead of being pasted whole, and identification fields found at the
/// top level of any structured file are lifted into the payload metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuasiExperimentalLoader;

impl QuasiExperimentalLoader {
    fn summarize_table(rows: &[Value]) -> Option<(usize, Vec<String>)> {
        let mut columns: Vec<String> = Vec::new();
        for row in rows {
            let obj = row.as_object()?;
            for key in obj.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        Some((rows.len(), columns))
    }
}

impl ArtifactLoader for QuasiExperimentalLoader {
    fn load(&self, manifest: &Manifest, job_dir: &Path) -> Result<ArtifactPayload, ArtifactError> {
        let files = read_all(manifest, job_dir)?;
        let mut metadata = Metadata::new();
        let mut tables = serde_json::Map::new();
        let mut sections = Vec::with_capacity(files.len());

        for file in &files {
            let table = match &file.value {
                Some(Value::Array(rows)) if !rows.is_empty() => Self::summarize_table(rows),
                _ => None,
            };

            let body = match table {
                Some((row_count, columns)) => {
                    let summary = format!(
                        "Table with {} rows; columns: {}",
                        row_count,
                        columns.join(", ")
                    );
                    tables.insert(
                        file.entry.name.clone(),
                        serde_json::json!({ "rows": row_count, "columns": columns }),
                    );
                    summary
                }
                None => file.text.trim_end().to_string(),
            };
            sections.push(format!("{}\n{}", file.header(), body));

            if let Some(Value::Object(obj)) = &file.value {
                for field in IDENTIFICATION_FIELDS {
                    if let Some(v) = obj.get(field) {
                        metadata.entry(field.to_string()).or_insert_with(|| v.clone());
                    }
                }
            }
        }

        if !tables.is_empty() {
            metadata.insert("tables".to_string(), Value::Object(tables));
        }

        Ok(ArtifactPayload {
            initiative_id: manifest.initiative_id.clone(),
            artifact_text: sections.join("\n\n"),
            model_type: manifest.model_type.clone(),
            sample_size: first_sample_size(&files),
            metadata,
        })
    }
}

/// Build the flat scorer event from the job's impact results.
///
/// The results file is the manifest's `impact_results` entry when present,
/// otherwise `impact_results.json` in the job directory. Missing or null
/// numeric fields default to zero; numeric strings are parsed, and anything
/// else is an [`ArtifactError::InvalidNumber`].
pub fn load_scorer_event(manifest: &Manifest, job_dir: &Path) -> Result<ScorerEvent, ArtifactError> {
    let relative = manifest
        .file(IMPACT_RESULTS_ENTRY)
        .map(|entry| entry.path.as_str())
        .unwrap_or(IMPACT_RESULTS_FILENAME);
    let path = job_dir.join(relative);

    if !path.is_file() {
        return Err(ArtifactError::NotFound(path));
    }

    let text = fs::read_to_string(&path).map_err(|source| ArtifactError::Io {
        path: path.clone(),
        source,
    })?;
    let data: Value = serde_json::from_str(&text).map_err(|source| ArtifactError::Json {
        path: path.clone(),
        source,
    })?;
    let obj = data
        .as_object()
        .ok_or_else(|| ArtifactError::InvalidResults(path.clone()))?;

    let field = |key: &str, convert: fn(&Value) -> Option<f64>| match obj.get(key) {
        None | Some(Value::Null) => Ok(0.0),
        Some(value) => convert(value).ok_or_else(|| ArtifactError::InvalidNumber {
            path: path.clone(),
            field: key.to_string(),
            value: value.to_string(),
        }),
    };

    let event = ScorerEvent {
        initiative_id: manifest.initiative_id.clone(),
        model_type: manifest.model_type.clone(),
        ci_upper: field("ci_upper", as_f64)?,
        effect_estimate: field("effect_estimate", as_f64)?,
        ci_lower: field("ci_lower", as_f64)?,
        cost_to_scale: field("cost_to_scale", as_f64)?,
        sample_size: field("sample_size", |value| as_u64(value).map(|n| n as f64))? as u64,
    };

    tracing::debug!(
        path = %path.display(),
        initiative_id = %event.initiative_id,
        "Loaded scorer event"
    );

    Ok(event)
}
