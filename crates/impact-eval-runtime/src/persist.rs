//! Writing evaluation results into the job directory.
//!
//! Results are written to a uniquely named temporary sibling and renamed
//! into place, so a reader sees either the previous file or the complete new
//! one, and concurrent writers never share a temporary file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::Builder;
use thiserror::Error;

use impact_eval_core::Strategy;

use crate::result::EvaluationResult;

pub const DETERMINISTIC_RESULT_FILENAME: &str = "evaluate_result_deterministic.json";
pub const REVIEW_RESULT_FILENAME: &str = "evaluate_result_review.json";

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Failed to serialize evaluation result: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// File name a result for `strategy` is written under.
pub fn result_filename(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::Deterministic => DETERMINISTIC_RESULT_FILENAME,
        Strategy::Review => REVIEW_RESULT_FILENAME,
    }
}

/// Atomically write `result` into `job_dir`, returning the final path.
pub fn write_result(job_dir: &Path, result: &EvaluationResult) -> Result<PathBuf, PersistError> {
    let filename = result_filename(result.strategy);
    let path = job_dir.join(filename);

    let mut body = serde_json::to_string_pretty(result)?;
    body.push('\n');

    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| PersistError::Io { path, source }
    };

    // Dropped on any error below, which removes the temporary file.
    let mut tmp = Builder::new()
        .prefix(&format!(".{filename}."))
        .suffix(".tmp")
        .tempfile_in(job_dir)
        .map_err(io_err(job_dir))?;
    tmp.write_all(body.as_bytes()).map_err(io_err(tmp.path()))?;
    tmp.as_file().sync_all().map_err(io_err(tmp.path()))?;
    tmp.persist(&path).map_err(|e| PersistError::Io {
        path: path.clone(),
        source: e.error,
    })?;

    tracing::debug!(path = %path.display(), "Wrote evaluation result");
    Ok(path)
}

/// Read a previously written result.
pub fn read_result(job_dir: &Path, strategy: Strategy) -> Result<EvaluationResult, PersistError> {
    let path = job_dir.join(result_filename(strategy));
    let text = fs::read_to_string(&path).map_err(|source| PersistError::Io { path, source })?;
    Ok(serde_json::from_str(&text)?)
}
