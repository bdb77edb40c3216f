//! Prompt template definitions and loading.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or rendering a prompt template.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Prompt template not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read prompt template {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse prompt template YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid prompt template: {0}")]
    Invalid(String),

    #[error("Prompt {prompt:?} declares no dimensions")]
    EmptyDimensions { prompt: String },

    #[error("Prompt {prompt:?} declares dimension {dimension:?} more than once")]
    DuplicateDimension { prompt: String, dimension: String },

    #[error(
        "Prompt reference expects {expected_name} v{expected_version}, \
         template declares {found_name} v{found_version}"
    )]
    VersionMismatch {
        expected_name: String,
        expected_version: String,
        found_name: String,
        found_version: String,
    },

    #[error("Unresolved template variable {name:?}")]
    UnresolvedVariable { name: String },

    #[error("Malformed template at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: String },
}

/// A named, versioned review prompt.
///
/// The dimension list is part of the version: changing it requires a new
/// version string so results stay comparable across runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptSpec {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Scoring dimensions, in the order results are reported
    pub dimensions: Vec<String>,
    pub system_template: String,
    pub user_template: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDimensions {
    List(Vec<String>),
    CommaSeparated(String),
}

#[derive(Debug, Deserialize)]
struct RawPromptSpec {
    name: String,
    version: serde_yaml::Value,
    #[serde(default)]
    description: String,
    dimensions: RawDimensions,
    #[serde(default)]
    system: String,
    #[serde(default)]
    user: String,
}

impl PromptSpec {
    /// Parse a prompt template from YAML.
    ///
    /// `dimensions` may be a list or a comma-separated string. A numeric
    /// `version` (`version: 1.0`) is accepted and kept as written.
    pub fn from_yaml(yaml: &str) -> Result<Self, TemplateError> {
        let raw: RawPromptSpec = serde_yaml::from_str(yaml)?;

        let version = match raw.version {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            other => {
                return Err(TemplateError::Invalid(format!(
                    "version must be a string or number, got {:?}",
                    other
                )))
            }
        };

        let dimensions: Vec<String> = match raw.dimensions {
            RawDimensions::List(list) => list.into_iter().map(|d| d.trim().to_string()).collect(),
            RawDimensions::CommaSeparated(s) => s
                .split(',')
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect(),
        };

        let spec = Self {
            name: raw.name,
            version,
            description: raw.description,
            dimensions,
            system_template: raw.system,
            user_template: raw.user,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Check the dimension list invariants.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.name.trim().is_empty() {
            return Err(TemplateError::Invalid("prompt name is empty".to_string()));
        }
        if self.dimensions.is_empty() {
            return Err(TemplateError::EmptyDimensions {
                prompt: self.name.clone(),
            });
        }

        let mut seen = HashSet::new();
        for dim in &self.dimensions {
            if dim.is_empty() {
                return Err(TemplateError::Invalid(format!(
                    "prompt {:?} has an empty dimension name",
                    self.name
                )));
            }
            if !seen.insert(dim.as_str()) {
                return Err(TemplateError::DuplicateDimension {
                    prompt: self.name.clone(),
                    dimension: dim.clone(),
                });
            }
        }
        Ok(())
    }

    /// JSON schema for structured-output providers.
    ///
    /// Requires one entry per declared dimension (the parser checks names)
    /// plus an optional overall score.
    pub fn response_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "dimensions": {
                    "type": "array",
                    "minItems": self.dimensions.len(),
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string", "enum": self.dimensions },
                            "score": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                            "justification": { "type": "string" }
                        },
                        "required": ["name", "score", "justification"],
                        "additionalProperties": false
                    }
                },
                "overall": { "type": "number", "minimum": 0.0, "maximum": 1.0 }
            },
            "required": ["dimensions"],
            "additionalProperties": false
        })
    }
}

/// Where a prompt template's YAML comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PromptSource {
    /// Compiled into the binary
    Embedded(&'static str),
    /// Read from disk on first use
    File(PathBuf),
}

/// Reference to a prompt template by expected name and version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PromptRef {
    pub name: String,
    pub version: String,
    pub source: PromptSource,
}

impl PromptRef {
    pub fn embedded(name: impl Into<String>, version: impl Into<String>, yaml: &'static str) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            source: PromptSource::Embedded(yaml),
        }
    }

    pub fn file(name: impl Into<String>, version: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            source: PromptSource::File(path.into()),
        }
    }

    /// Load the referenced template and check it declares the expected
    /// name and version.
    pub fn load(&self) -> Result<PromptSpec, TemplateError> {
        let spec = match &self.source {
            PromptSource::Embedded(yaml) => PromptSpec::from_yaml(yaml)?,
            PromptSource::File(path) => {
                if !path.is_file() {
                    return Err(TemplateError::NotFound(path.clone()));
                }
                let yaml = fs::read_to_string(path).map_err(|source| TemplateError::Io {
                    path: path.clone(),
                    source,
                })?;
                PromptSpec::from_yaml(&yaml)?
            }
        };

        if spec.name != self.name || spec.version != self.version {
            return Err(TemplateError::VersionMismatch {
                expected_name: self.name.clone(),
                expected_version: self.version.clone(),
                found_name: spec.name,
                found_version: spec.version,
            });
        }

        tracing::debug!(prompt = %spec.name, version = %spec.version, "Loaded prompt template");
        Ok(spec)
    }
}
