//! JSON Schema validation for manifests.
//!
//! The schema lives in `schema/manifest.schema.json` and is embedded at
//! compile time, so validation never touches the filesystem.

use std::sync::OnceLock;

/// Embedded manifest schema.
const MANIFEST_SCHEMA_JSON: &str = include_str!("../../schema/manifest.schema.json");

/// Compiled validator (initialized once, reused across evaluations).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn get_validator() -> Result<&'static jsonschema::Validator, String> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(MANIFEST_SCHEMA_JSON)
            .map_err(|e| format!("Invalid manifest schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile manifest schema: {}", e))
    });

    result.as_ref().map_err(Clone::clone)
}

/// Validate a manifest JSON value against the embedded schema.
///
/// Returns every violation found, formatted as `"<message> at <path>"`.
pub fn validate_manifest_schema(manifest_json: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e])?;

    let errors: Vec<String> = validator
        .iter_errors(manifest_json)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
