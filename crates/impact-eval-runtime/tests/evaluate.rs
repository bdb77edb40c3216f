//! End-to-end evaluation of job directories.

use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use impact_eval_core::{ManifestError, OverallSource, RegistryError, Strategy, TemplateError};
use impact_eval_runtime::{
    read_result, Catalog, CatalogError, Dispatcher, EvaluateConfig, EvaluateError, ProviderError,
    StubProvider, DETERMINISTIC_RESULT_FILENAME, REVIEW_RESULT_FILENAME,
};

const EXPERIMENT_DIMENSIONS: [&str; 5] = [
    "randomization_integrity",
    "specification_adequacy",
    "statistical_inference",
    "threats_to_validity",
    "effect_size_plausibility",
];

fn write_json(path: &Path, value: &Value) {
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

fn write_manifest(dir: &Path, manifest: Value) {
    write_json(&dir.join("manifest.json"), &manifest);
    write_json(
        &dir.join("impact_results.json"),
        &json!({
            "ci_upper": 0.18,
            "effect_estimate": 0.12,
            "ci_lower": 0.06,
            "cost_to_scale": 250000.0,
            "sample_size": 1200
        }),
    );
}

fn job(dir: &Path, model_type: &str, strategy: &str) {
    write_manifest(
        dir,
        json!({
            "schema_version": "2.0",
            "model_type": model_type,
            "evaluate_strategy": strategy,
            "initiative_id": "init-42",
            "files": {
                "impact_results": {"path": "impact_results.json", "format": "json"}
            }
        }),
    );
}

fn result_files(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("evaluate_result"))
        .collect()
}

fn structured_review(scores: [f64; 5]) -> String {
    let dimensions: Vec<Value> = EXPERIMENT_DIMENSIONS
        .iter()
        .zip(scores)
        .map(|(name, score)| json!({"name": name, "score": score, "justification": "Checked."}))
        .collect();
    json!({ "dimensions": dimensions }).to_string()
}

#[tokio::test]
async fn deterministic_experiment_is_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    job(dir.path(), "experiment", "deterministic");

    let dispatcher = Dispatcher::builder().build().unwrap();
    let first = dispatcher.evaluate(dir.path()).await.unwrap();
    let second = dispatcher.evaluate(dir.path()).await.unwrap();

    assert_eq!(first.initiative_id, "init-42");
    assert!((0.85..=1.0).contains(&first.confidence));
    assert_eq!(first.confidence, second.confidence);
    assert_eq!(first.return_median, 0.12);
    assert_eq!(first.sample_size, 1200);

    let stored = read_result(dir.path(), Strategy::Deterministic).unwrap();
    assert_eq!(stored.confidence, first.confidence);
    assert_eq!(result_files(dir.path()), vec![DETERMINISTIC_RESULT_FILENAME.to_string()]);
}

#[tokio::test]
async fn structured_review_averages_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    job(dir.path(), "experiment", "review");

    let stub = StubProvider::structured(structured_review([0.8, 0.7, 0.6, 0.75, 0.75]));
    let dispatcher = Dispatcher::builder()
        .provider(Arc::new(stub))
        .build()
        .unwrap();

    let result = dispatcher.evaluate(dir.path()).await.unwrap();
    let review = result.report.as_review().unwrap();

    assert!((result.confidence - 0.72).abs() < 1e-9);
    assert_eq!(review.dimensions.len(), 5);
    assert_eq!(review.overall_source, OverallSource::DimensionMean);
    let names: Vec<&str> = review.dimensions.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, EXPERIMENT_DIMENSIONS);
    assert!(dir.path().join(REVIEW_RESULT_FILENAME).exists());
}

#[tokio::test]
async fn strategy_defaults_to_review() {
    let dir = tempfile::tempdir().unwrap();
    write_manifest(
        dir.path(),
        json!({
            "schema_version": "2.0",
            "model_type": "experiment",
            "files": {
                "impact_results": {"path": "impact_results.json", "format": "json"}
            }
        }),
    );

    let dispatcher = Dispatcher::builder()
        .provider(Arc::new(StubProvider::new()))
        .build()
        .unwrap();
    let result = dispatcher.evaluate(dir.path()).await.unwrap();

    assert_eq!(result.strategy, Strategy::Review);
    // No initiative_id in the manifest: the directory name is used.
    let dir_name = dir.path().file_name().unwrap().to_string_lossy();
    assert_eq!(result.initiative_id, dir_name);
}

#[tokio::test]
async fn missing_model_type_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_manifest(
        dir.path(),
        json!({
            "schema_version": "2.0",
            "evaluate_strategy": "deterministic",
            "files": {}
        }),
    );

    let dispatcher = Dispatcher::builder().build().unwrap();
    let err = dispatcher.evaluate(dir.path()).await.unwrap_err();

    assert!(matches!(
        err,
        EvaluateError::Manifest(ManifestError::MissingField(ref field)) if field == "model_type"
    ));
    assert!(result_files(dir.path()).is_empty());
}

#[tokio::test]
async fn unknown_method_lists_available() {
    let dir = tempfile::tempdir().unwrap();
    job(dir.path(), "synthetic_control", "deterministic");

    let dispatcher = Dispatcher::builder().build().unwrap();
    let err = dispatcher.evaluate(dir.path()).await.unwrap_err();

    match err {
        EvaluateError::Registry(RegistryError::UnknownMethod { name, available }) => {
            assert_eq!(name, "synthetic_control");
            assert_eq!(available, vec!["experiment", "quasi_experimental"]);
        }
        other => panic!("expected UnknownMethod, got {other:?}"),
    }
    assert!(result_files(dir.path()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn backend_timeout_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    job(dir.path(), "experiment", "review");

    let config = EvaluateConfig::from_value(&json!({"backend": {"timeout": "100ms"}})).unwrap();
    let dispatcher = Dispatcher::builder()
        .config(config)
        .provider(Arc::new(StubProvider::new().with_delay(Duration::from_secs(30))))
        .build()
        .unwrap();

    let err = dispatcher.evaluate(dir.path()).await.unwrap_err();
    assert!(matches!(err, EvaluateError::Provider(ProviderError::Timeout(_))));
    assert!(result_files(dir.path()).is_empty());
}

#[tokio::test]
async fn incomplete_review_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    job(dir.path(), "experiment", "review");

    let partial = json!({
        "dimensions": [{"name": "randomization_integrity", "score": 0.9, "justification": "ok"}],
        "overall": 0.9
    });
    let dispatcher = Dispatcher::builder()
        .provider(Arc::new(StubProvider::structured(partial.to_string())))
        .build()
        .unwrap();

    let err = dispatcher.evaluate(dir.path()).await.unwrap_err();
    assert!(matches!(err, EvaluateError::Parse(_)));
    assert!(result_files(dir.path()).is_empty());
}

#[tokio::test]
async fn env_override_selects_backend() {
    let dir = tempfile::tempdir().unwrap();
    job(dir.path(), "quasi_experimental", "review");

    let config = EvaluateConfig::from_yaml_str("backend:\n  type: anthropic\n  score: 0.4\n")
        .unwrap()
        .with_env_overrides(|key| (key == "REVIEW_BACKEND_TYPE").then(|| "stub".to_string()))
        .unwrap();
    let dispatcher = Dispatcher::builder().config(config).build().unwrap();

    let result = dispatcher.evaluate(dir.path()).await.unwrap();
    assert!((result.confidence - 0.4).abs() < 1e-9);
    assert_eq!(result.report.as_review().unwrap().prompt_name, "quasi_experimental_review");
}

#[tokio::test]
async fn prompt_override_with_version_mismatch_fails() {
    let dir = tempfile::tempdir().unwrap();
    job(dir.path(), "experiment", "review");

    let template = dir.path().join("custom_review.yaml");
    fs::write(
        &template,
        r#"
name: custom_review
version: "1.1"
dimensions: [rigor]
system: "Reviewer"
user: "{{ artifact }}"
"#,
    )
    .unwrap();

    let mut catalog = Catalog::with_builtins();
    catalog
        .register_prompt(impact_eval_core::PromptRef::file("custom_review", "1.0", &template))
        .unwrap();

    let config = EvaluateConfig::from_value(&json!({
        "methods": {"experiment": {"prompt": "custom_review"}}
    }))
    .unwrap();
    let dispatcher = Dispatcher::builder()
        .config(config)
        .catalog(Arc::new(catalog))
        .provider(Arc::new(StubProvider::new()))
        .build()
        .unwrap();

    let err = dispatcher.evaluate(dir.path()).await.unwrap_err();
    assert!(matches!(
        err,
        EvaluateError::Catalog(CatalogError::Template(TemplateError::VersionMismatch { .. }))
    ));
}

#[tokio::test]
async fn prompt_override_changes_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    job(dir.path(), "experiment", "review");

    let template = dir.path().join("custom_review.yaml");
    fs::write(
        &template,
        r#"
name: custom_review
version: "1.0"
dimensions: [rigor, transparency]
system: "Reviewer for {{ methodology }}"
user: "{{ artifact }}"
"#,
    )
    .unwrap();

    let mut catalog = Catalog::with_builtins();
    catalog
        .register_prompt(impact_eval_core::PromptRef::file("custom_review", "1.0", &template))
        .unwrap();

    let config = EvaluateConfig::from_value(&json!({
        "methods": {"experiment": {"prompt": "custom_review", "knowledge_base": "quasi_experimental"}}
    }))
    .unwrap();
    let dispatcher = Dispatcher::builder()
        .config(config)
        .catalog(Arc::new(catalog))
        .provider(Arc::new(StubProvider::new().with_default_score(0.9)))
        .build()
        .unwrap();

    let result = dispatcher.evaluate(dir.path()).await.unwrap();
    let review = result.report.as_review().unwrap();
    let names: Vec<&str> = review.dimensions.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["rigor", "transparency"]);
    assert_eq!(review.prompt_name, "custom_review");
    assert_eq!(result.confidence, 0.9);
}
