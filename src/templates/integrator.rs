//! Inserts a finished pipeline result into the registry documents
//!
//! Every document is an independent step: a bad fragment or a broken file
//! fails that step only. Steps back up the file first, insert keyed by
//! template id (so re-running replaces instead of duplicating) and re-parse
//! what they wrote.

use super::models::ProcessingResult;
use super::registry::{Artifact, GeneratorEntry, RendererLayout};
use chrono::Local;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Serializes integrations process-wide
static INTEGRATION_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("generated fragment is invalid: {0}")]
    InvalidFragment(String),

    #[error("{0} not found")]
    MissingFile(PathBuf),

    #[error("{path} is not valid JSON: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("{path} has no '{key}' object")]
    MissingContainer { path: PathBuf, key: &'static str },

    #[error("written document failed validation: {0}")]
    Validation(String),

    #[error("I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },
}

fn io_err(path: &Path, e: std::io::Error) -> IntegrationError {
    IntegrationError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Per-document outcome of one integration
#[derive(Debug)]
pub struct IntegrationReport {
    pub template_id: String,
    pub steps: Vec<(Artifact, Result<(), IntegrationError>)>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StepStatus {
    Ok(bool),
    Failed(String),
}

impl IntegrationReport {
    pub fn success(&self) -> bool {
        self.steps.iter().all(|(_, r)| r.is_ok())
    }

    /// File name → `true` or the error message
    pub fn status(&self) -> BTreeMap<String, StepStatus> {
        self.steps
            .iter()
            .map(|(artifact, r)| {
                let status = match r {
                    Ok(()) => StepStatus::Ok(true),
                    Err(e) => StepStatus::Failed(e.to_string()),
                };
                (artifact.file_name().to_string(), status)
            })
            .collect()
    }

    pub fn failed(&self) -> Vec<Artifact> {
        self.steps.iter().filter(|(_, r)| r.is_err()).map(|(a, _)| *a).collect()
    }
}

pub struct TemplateIntegrator {
    registry_dir: PathBuf,
    backup_dir: PathBuf,
}

impl TemplateIntegrator {
    pub fn new(registry_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry_dir: registry_dir.into(),
            backup_dir: backup_dir.into(),
        }
    }

    pub fn registry_dir(&self) -> &Path {
        &self.registry_dir
    }

    pub async fn integrate(&self, result: &ProcessingResult) -> IntegrationReport {
        let _guard = INTEGRATION_LOCK.lock().await;
        let id = result.metadata.id.clone();
        info!("[Integrator] Integrating template '{}'", id);

        let mut steps = Vec::with_capacity(Artifact::ALL.len());
        for artifact in Artifact::ALL {
            let outcome = match fragment(artifact, result) {
                Ok(value) => self.insert(artifact, &id, value),
                Err(e) => Err(e),
            };
            match &outcome {
                Ok(()) => info!("[Integrator] {} updated", artifact.file_name()),
                Err(e) => warn!("[Integrator] {} failed: {}", artifact.file_name(), e),
            }
            steps.push((artifact, outcome));
        }

        IntegrationReport { template_id: id, steps }
    }

    fn insert(&self, artifact: Artifact, id: &str, value: Value) -> Result<(), IntegrationError> {
        let path = self.registry_dir.join(artifact.file_name());
        if !path.exists() {
            return Err(IntegrationError::MissingFile(path));
        }

        let text = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let mut doc: Value = serde_json::from_str(&text).map_err(|e| IntegrationError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let key = artifact.container_key();
        let container = doc
            .get_mut(key)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| IntegrationError::MissingContainer { path: path.clone(), key })?;

        if container.get(id) == Some(&value) {
            return Ok(());
        }

        self.backup(&path)?;
        container.insert(id.to_string(), value.clone());

        let written = serde_json::to_string_pretty(&doc)
            .map_err(|e| IntegrationError::Validation(e.to_string()))?;
        validate(&written, key, id, &value)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &written).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    /// Copy `path` to `backup_dir/{stem}_{YYYYmmdd_HHMMSS_micros}{ext}`, never over an earlier backup
    fn backup(&self, path: &Path) -> Result<PathBuf, IntegrationError> {
        std::fs::create_dir_all(&self.backup_dir).map_err(|e| io_err(&self.backup_dir, e))?;
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("artifact");
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        let stamp = Local::now().format("%Y%m%d_%H%M%S_%6f").to_string();
        let mut target = self.backup_dir.join(format!("{}_{}{}", stem, stamp, ext));
        let mut n = 1;
        while target.exists() {
            target = self.backup_dir.join(format!("{}_{}_{}{}", stem, stamp, n, ext));
            n += 1;
        }
        std::fs::copy(path, &target).map_err(|e| io_err(&target, e))?;
        Ok(target)
    }
}

/// The value stored for `artifact`, parsed and checked from the result
fn fragment(artifact: Artifact, result: &ProcessingResult) -> Result<Value, IntegrationError> {
    let invalid = |e: serde_json::Error| IntegrationError::InvalidFragment(e.to_string());
    let entry = result.registry_entry();

    match artifact {
        Artifact::Templates => {
            if !entry.is_consistent() {
                return Err(IntegrationError::InvalidFragment(format!(
                    "{} slots but {} slot names",
                    entry.text_slots,
                    entry.slot_names.len()
                )));
            }
            serde_json::to_value(&entry).map_err(invalid)
        }
        Artifact::Prompts => Ok(Value::String(result.prompt.template_prompt.clone())),
        Artifact::OutputModels => {
            let schema: Value = serde_json::from_str(&result.code.output_schema).map_err(invalid)?;
            if !schema.is_object() {
                return Err(IntegrationError::InvalidFragment("output schema is not an object".into()));
            }
            Ok(schema)
        }
        Artifact::Renderers => {
            let layout: RendererLayout = serde_json::from_str(&result.code.renderer).map_err(invalid)?;
            if let Some(missing) = entry.slot_names.iter().find(|s| !layout.slots.contains_key(*s)) {
                return Err(IntegrationError::InvalidFragment(format!("layout has no box for slot '{}'", missing)));
            }
            serde_json::to_value(&layout).map_err(invalid)
        }
        Artifact::Generators => {
            let generator: GeneratorEntry = serde_json::from_str(&result.code.generator_entry).map_err(invalid)?;
            if generator.function != entry.generator_function {
                return Err(IntegrationError::InvalidFragment(format!(
                    "generator function '{}' should be '{}'",
                    generator.function, entry.generator_function
                )));
            }
            if generator.slots != entry.slot_names {
                return Err(IntegrationError::InvalidFragment(format!(
                    "generator slots {:?} do not match template slots {:?}",
                    generator.slots, entry.slot_names
                )));
            }
            serde_json::to_value(&generator).map_err(invalid)
        }
        Artifact::Bindings => {
            let binding: Map<String, Value> = serde_json::from_str(&result.code.output_model_entry).map_err(invalid)?;
            let expected = format!("{}_output", entry.id);
            match binding.get("output_model").and_then(Value::as_str) {
                Some(model) if model == expected => Ok(Value::Object(binding)),
                other => Err(IntegrationError::InvalidFragment(format!(
                    "output_model {:?} should be '{}'",
                    other.unwrap_or_default(),
                    expected
                ))),
            }
        }
    }
}

/// Re-parse written text and check the entry landed intact
fn validate(written: &str, key: &str, id: &str, expected: &Value) -> Result<(), IntegrationError> {
    let reparsed: Value =
        serde_json::from_str(written).map_err(|e| IntegrationError::Validation(e.to_string()))?;
    match reparsed.get(key).and_then(|c| c.get(id)) {
        Some(v) if v == expected => Ok(()),
        _ => Err(IntegrationError::Validation(format!("entry '{}' missing after write", id))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::models::tests::sample_result;
    use crate::templates::registry::{init_dir, TemplateRegistry};

    fn setup() -> (tempfile::TempDir, TemplateIntegrator) {
        let dir = tempfile::tempdir().unwrap();
        let registry = dir.path().join("registry");
        init_dir(&registry).unwrap();
        let integrator = TemplateIntegrator::new(&registry, dir.path().join("backups"));
        (dir, integrator)
    }

    fn count_entries(dir: &Path, artifact: Artifact) -> usize {
        crate::templates::registry::read_container(dir, artifact).unwrap().len()
    }

    #[tokio::test]
    async fn test_integrate_all_artifacts() {
        let (dir, integrator) = setup();
        let result = sample_result("galaxy_brain", &["small", "big"]);

        let report = integrator.integrate(&result).await;
        assert!(report.success(), "{:?}", report.status());
        assert_eq!(report.status().len(), 6);

        let registry = TemplateRegistry::load(integrator.registry_dir()).unwrap();
        assert!(registry.get("galaxy_brain").is_some());
        assert_eq!(registry.usable().len(), 1);
        assert_eq!(registry.generator("galaxy_brain").unwrap().function, "create_galaxy_brain_meme");
        assert!(registry.binding("galaxy_brain").is_some());

        let backups = std::fs::read_dir(dir.path().join("backups")).unwrap().count();
        assert!(backups >= 1);
    }

    #[tokio::test]
    async fn test_reintegration_is_idempotent() {
        let (_dir, integrator) = setup();
        let result = sample_result("galaxy_brain", &["small", "big"]);

        assert!(integrator.integrate(&result).await.success());
        let first = std::fs::read_to_string(integrator.registry_dir().join("templates.json")).unwrap();
        assert!(integrator.integrate(&result).await.success());
        let second = std::fs::read_to_string(integrator.registry_dir().join("templates.json")).unwrap();

        assert_eq!(first, second);
        for artifact in Artifact::ALL {
            assert_eq!(count_entries(integrator.registry_dir(), artifact), 1);
        }
    }

    #[tokio::test]
    async fn test_invalid_renderer_only_fails_renderers() {
        let (_dir, integrator) = setup();
        let mut result = sample_result("galaxy_brain", &["small", "big"]);
        result.code.renderer = "{not json".into();

        let report = integrator.integrate(&result).await;
        assert!(!report.success());
        assert_eq!(report.failed(), vec![Artifact::Renderers]);

        let status = report.status();
        assert!(matches!(status["templates.json"], StepStatus::Ok(true)));
        assert!(matches!(status["renderers.json"], StepStatus::Failed(_)));
        assert_eq!(count_entries(integrator.registry_dir(), Artifact::Templates), 1);
        assert_eq!(count_entries(integrator.registry_dir(), Artifact::Renderers), 0);
    }

    #[tokio::test]
    async fn test_layout_missing_slot_rejected() {
        let (_dir, integrator) = setup();
        let mut result = sample_result("galaxy_brain", &["small", "big"]);
        result.code.renderer = r#"{"slots": {"small": {"x": 0, "y": 0, "width": 10, "height": 10}}}"#.into();

        let report = integrator.integrate(&result).await;
        assert_eq!(report.failed(), vec![Artifact::Renderers]);
    }

    #[tokio::test]
    async fn test_generator_must_match_template() {
        let (_dir, integrator) = setup();

        let mut result = sample_result("galaxy_brain", &["small", "big"]);
        result.code.generator_entry = r#"{"function": "create_galaxy_brain_meme", "slots": []}"#.into();
        let report = integrator.integrate(&result).await;
        assert_eq!(report.failed(), vec![Artifact::Generators]);

        let mut result = sample_result("galaxy_brain", &["small", "big"]);
        result.code.generator_entry = r#"{"function": "f", "slots": ["small", "big"]}"#.into();
        let report = integrator.integrate(&result).await;
        assert_eq!(report.failed(), vec![Artifact::Generators]);
        assert_eq!(count_entries(integrator.registry_dir(), Artifact::Generators), 0);
    }

    #[tokio::test]
    async fn test_binding_must_name_template_output() {
        let (_dir, integrator) = setup();

        for fragment in [r#"{"output_model": "other_output"}"#, r#"{"model": "galaxy_brain_output"}"#] {
            let mut result = sample_result("galaxy_brain", &["caption"]);
            result.code.output_model_entry = fragment.into();
            let report = integrator.integrate(&result).await;
            assert_eq!(report.failed(), vec![Artifact::Bindings], "{}", fragment);
        }
        assert_eq!(count_entries(integrator.registry_dir(), Artifact::Bindings), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_integrations_keep_every_entry() {
        let (dir, _) = setup();
        let registry = dir.path().join("registry");
        let ids: Vec<String> = (0..8).map(|i| format!("template_{}", i)).collect();

        let handles: Vec<_> = ids
            .iter()
            .map(|id| {
                let integrator = TemplateIntegrator::new(&registry, dir.path().join("backups"));
                let result = sample_result(id, &["top", "bottom"]);
                tokio::spawn(async move { integrator.integrate(&result).await.success() })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let loaded = TemplateRegistry::load(&registry).unwrap();
        for id in &ids {
            assert_eq!(loaded.get(id).unwrap().slot_names, vec!["top", "bottom"]);
            assert_eq!(loaded.generator(id).unwrap().function, format!("create_{}_meme", id));
        }
        for artifact in Artifact::ALL {
            assert_eq!(count_entries(&registry, artifact), ids.len());
        }
    }

    #[tokio::test]
    async fn test_backups_are_never_overwritten() {
        let (dir, integrator) = setup();
        assert!(integrator.integrate(&sample_result("first", &["caption"])).await.success());
        assert!(integrator.integrate(&sample_result("second", &["caption"])).await.success());

        // Each integration backs up all six documents before changing them
        let backups = std::fs::read_dir(dir.path().join("backups")).unwrap().count();
        assert_eq!(backups, 12);
    }

    #[tokio::test]
    async fn test_missing_container_fails_that_artifact() {
        let (_dir, integrator) = setup();
        std::fs::write(integrator.registry_dir().join("prompts.json"), r#"{"something_else": {}}"#).unwrap();

        let report = integrator.integrate(&sample_result("galaxy_brain", &["caption"])).await;
        assert_eq!(report.failed(), vec![Artifact::Prompts]);
        assert!(matches!(
            report.steps.iter().find(|(a, _)| *a == Artifact::Prompts).map(|(_, r)| r),
            Some(Err(IntegrationError::MissingContainer { key: "prompts", .. }))
        ));
    }

    #[tokio::test]
    async fn test_missing_file_fails_that_artifact() {
        let (_dir, integrator) = setup();
        std::fs::remove_file(integrator.registry_dir().join("pipeline.json")).unwrap();

        let report = integrator.integrate(&sample_result("galaxy_brain", &["caption"])).await;
        assert_eq!(report.failed(), vec![Artifact::Bindings]);
    }

    #[test]
    fn test_status_serializes_true_or_message() {
        let report = IntegrationReport {
            template_id: "x".into(),
            steps: vec![
                (Artifact::Templates, Ok(())),
                (Artifact::Renderers, Err(IntegrationError::InvalidFragment("bad".into()))),
            ],
        };
        let json = serde_json::to_value(report.status()).unwrap();
        assert_eq!(json["templates.json"], true);
        assert_eq!(json["renderers.json"], "generated fragment is invalid: bad");
    }
}
