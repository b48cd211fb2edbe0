//! Runs the seven stages in order over one template image

use super::models::*;
use super::stages::{build_prompt, MissingContext, Stage, TemplateContext};
use crate::llm::{ImageInput, LlmClient, LlmError, LlmRequest};
use crate::types::TemplateEntry;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Template image not found: {0}")]
    ImageNotFound(PathBuf),

    #[error("Unreadable template image {path}: {message}")]
    ImageRead { path: PathBuf, message: String },

    #[error("{stage} stage failed: {source}")]
    Llm {
        stage: Stage,
        #[source]
        source: LlmError,
    },

    #[error("{stage} stage timed out after {timeout:?}")]
    Timeout { stage: Stage, timeout: Duration },

    #[error("{stage} stage returned invalid output: {message}")]
    InvalidOutput { stage: Stage, message: String },

    #[error(transparent)]
    MissingContext(#[from] MissingContext),
}

/// Receives stage transitions while a run is in progress
#[async_trait]
pub trait ProgressObserver: Send + Sync {
    async fn stage_started(&self, stage: Stage);
    async fn stage_completed(&self, stage: Stage, output: &Value);
}

/// Observer that only logs
pub struct LogObserver;

#[async_trait]
impl ProgressObserver for LogObserver {
    async fn stage_started(&self, stage: Stage) {
        info!("[Pipeline] {} ({}/7) started", stage, stage.index() + 1);
    }

    async fn stage_completed(&self, stage: Stage, _output: &Value) {
        info!("[Pipeline] {} completed", stage);
    }
}

pub struct TemplatePipeline {
    llm: Arc<dyn LlmClient>,
    model: String,
    stage_timeout: Duration,
}

impl TemplatePipeline {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, stage_timeout: Duration) -> Self {
        Self {
            llm,
            model: model.into(),
            stage_timeout,
        }
    }

    /// Run all stages. Any stage failure aborts the run; nothing is retried.
    ///
    /// Code-stage fragments are returned as generated. The integrator decides
    /// per artifact whether they are usable.
    pub async fn process(
        &self,
        image_path: &Path,
        existing: Vec<TemplateEntry>,
        observer: &dyn ProgressObserver,
    ) -> Result<ProcessingResult, PipelineError> {
        let ctx = load_context(image_path, existing).await?;
        info!("[Pipeline] Processing {} with {}", ctx.filename, self.llm.name());

        let mut visual: VisualAnalysis = self.run_stage(Stage::Visual, &ctx, observer).await?;
        // Measured size beats whatever the model reported
        visual.image_dimensions = ctx.dimensions;
        let ctx = ctx.with_visual(visual);

        let slots: SlotDetection = self.run_stage(Stage::Slots, &ctx, observer).await?;
        let ctx = ctx.with_slots(slots);

        let irony: IronyAnalysis = self.run_stage(Stage::Irony, &ctx, observer).await?;
        if !irony.is_known_type() {
            info!("[Pipeline] New irony type: {}", irony.irony_type);
        }
        let ctx = ctx.with_irony(irony);

        let mut metadata: TemplateMetadata = self.run_stage(Stage::Metadata, &ctx, observer).await?;
        metadata.filename = ctx.filename.clone();
        let ctx = ctx.with_metadata(metadata);

        let examples: ExampleContent = self.run_stage(Stage::Examples, &ctx, observer).await?;
        let ctx = ctx.with_examples(examples);

        let prompt: PromptContent = self.run_stage(Stage::Prompt, &ctx, observer).await?;
        let ctx = ctx.with_prompt(prompt);

        let code: CodeFragments = self.run_stage(Stage::Code, &ctx, observer).await?;
        Ok(ctx.finish(code)?)
    }

    async fn run_stage<T: StageOutput>(
        &self,
        stage: Stage,
        ctx: &TemplateContext,
        observer: &dyn ProgressObserver,
    ) -> Result<T, PipelineError> {
        observer.stage_started(stage).await;

        let prompt = build_prompt(stage, &ctx.view(stage))?;
        let request = LlmRequest::new(
            format!("You are {}. {}", stage.agent_name(), stage.agent_description()),
            prompt,
            stage.as_str(),
            stage.schema(),
        )
        .with_image(ctx.image.clone())
        .with_model(self.model.clone());

        let value = match tokio::time::timeout(self.stage_timeout, self.llm.complete_json(request)).await {
            Ok(Ok(value)) => value,
            Ok(Err(source)) => return Err(PipelineError::Llm { stage, source }),
            Err(_) => {
                return Err(PipelineError::Timeout {
                    stage,
                    timeout: self.stage_timeout,
                })
            }
        };

        let mut output: T = serde_json::from_value(value).map_err(|e| PipelineError::InvalidOutput {
            stage,
            message: e.to_string(),
        })?;
        output
            .validate()
            .map_err(|message| PipelineError::InvalidOutput { stage, message })?;

        let reported = serde_json::to_value(&output).unwrap_or(Value::Null);
        observer.stage_completed(stage, &reported).await;
        Ok(output)
    }
}

async fn load_context(image_path: &Path, existing: Vec<TemplateEntry>) -> Result<TemplateContext, PipelineError> {
    if !image_path.exists() {
        return Err(PipelineError::ImageNotFound(image_path.to_path_buf()));
    }

    let bytes = tokio::fs::read(image_path).await.map_err(|e| PipelineError::ImageRead {
        path: image_path.to_path_buf(),
        message: e.to_string(),
    })?;
    let (width, height) = image::load_from_memory(&bytes)
        .map(|img| (img.width(), img.height()))
        .map_err(|e| PipelineError::ImageRead {
            path: image_path.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(TemplateContext::new(
        image_path.to_path_buf(),
        ImageInput::from_bytes(&bytes, image_path),
        ImageDimensions { width, height },
        existing,
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llm::mock::fill_from_schema;
    use crate::llm::MockLlmClient;
    use crate::templates::integrator::{StepStatus, TemplateIntegrator};
    use crate::templates::registry::{init_dir, TemplateRegistry};
    use crate::templates::stages::canonical_fragments;
    use serde_json::json;
    use tokio::sync::Mutex;

    pub(crate) fn write_png(path: &Path, width: u32, height: u32) {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 200, 200]));
        img.save(path).unwrap();
    }

    /// Code-stage answer consistent with what the mock fills in for the
    /// earlier stages, for a template whose id is `id`
    pub(crate) fn code_response(id: &str) -> Value {
        let mut slots: SlotDetection = serde_json::from_value(fill_from_schema(&SlotDetection::schema(), "slots")).unwrap();
        slots.validate().unwrap();
        let mut metadata: TemplateMetadata =
            serde_json::from_value(fill_from_schema(&TemplateMetadata::schema(), "metadata")).unwrap();
        metadata.id = id.to_string();
        metadata.validate().unwrap();
        serde_json::to_value(canonical_fragments(&slots, &metadata)).unwrap()
    }

    /// Mock whose every stage output integrates cleanly
    pub(crate) fn offline_llm() -> MockLlmClient {
        MockLlmClient::new().with_response("code", code_response("mock_id"))
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl ProgressObserver for Recorder {
        async fn stage_started(&self, stage: Stage) {
            self.0.lock().await.push(format!("start:{}", stage));
        }
        async fn stage_completed(&self, stage: Stage, _output: &Value) {
            self.0.lock().await.push(format!("done:{}", stage));
        }
    }

    /// Never answers
    struct HangingLlm;

    #[async_trait]
    impl LlmClient for HangingLlm {
        async fn complete_json(&self, _request: LlmRequest) -> Result<Value, LlmError> {
            std::future::pending().await
        }

        fn name(&self) -> &'static str {
            "hanging"
        }
    }

    fn pipeline(llm: MockLlmClient) -> TemplatePipeline {
        TemplatePipeline::new(Arc::new(llm), "gpt-4o", Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_full_run_with_mock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("galaxy brain.png");
        write_png(&path, 64, 48);

        let llm = MockLlmClient::new()
            .with_response(
                "metadata",
                json!({
                    "id": "Galaxy Brain",
                    "name": "Galaxy Brain",
                    "description": "Four panels of growing brains",
                    "generator_function": "x",
                    "filename": "wrong.png"
                }),
            )
            .with_response("code", code_response("galaxy_brain"));
        let recorder = Recorder::default();
        let result = pipeline(llm).process(&path, vec![], &recorder).await.unwrap();

        assert_eq!(result.visual_analysis.image_dimensions, ImageDimensions { width: 64, height: 48 });
        assert_eq!(result.metadata.id, "galaxy_brain");
        assert_eq!(result.metadata.filename, "galaxy brain.png");
        assert!(result.registry_entry().is_consistent());
        let renderer: Value = serde_json::from_str(&result.code.renderer).unwrap();
        assert!(renderer["slots"]["mock_slot_names"].is_object());

        let events = recorder.0.lock().await.clone();
        assert_eq!(events.len(), 14);
        assert_eq!(events[0], "start:visual");
        assert_eq!(events[13], "done:code");
    }

    #[tokio::test]
    async fn test_broken_code_fragment_reaches_integrator() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.png");
        write_png(&path, 40, 40);

        let mut code = code_response("mock_id");
        code["renderer"] = json!("def broken(:");
        let llm = MockLlmClient::new().with_response("code", code);
        let result = pipeline(llm).process(&path, vec![], &LogObserver).await.unwrap();
        assert_eq!(result.code.renderer, "def broken(:");

        let registry_dir = dir.path().join("registry");
        init_dir(&registry_dir).unwrap();
        let integrator = TemplateIntegrator::new(&registry_dir, dir.path().join("backups"));
        let report = integrator.integrate(&result).await;

        let status = report.status();
        assert!(matches!(status["renderers.json"], StepStatus::Failed(_)));
        assert!(matches!(status["templates.json"], StepStatus::Ok(true)));
        assert!(matches!(status["generators.json"], StepStatus::Ok(true)));

        let registry = TemplateRegistry::load(&registry_dir).unwrap();
        assert!(registry.get("mock_id").is_some());
        assert!(registry.layout("mock_id").is_none());
        assert!(registry.usable().is_empty());
    }

    #[tokio::test]
    async fn test_stage_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.png");
        write_png(&path, 10, 10);

        let pipeline = TemplatePipeline::new(Arc::new(HangingLlm), "gpt-4o", Duration::from_millis(10));
        let recorder = Recorder::default();
        let err = pipeline.process(&path, vec![], &recorder).await.unwrap_err();

        assert!(matches!(err, PipelineError::Timeout { stage: Stage::Visual, .. }));
        assert!(err.to_string().contains("10ms"));
        assert_eq!(recorder.0.lock().await.clone(), vec!["start:visual".to_string()]);
    }

    #[tokio::test]
    async fn test_stage_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.png");
        write_png(&path, 10, 10);

        let llm = MockLlmClient::new().failing_on("irony");
        let recorder = Recorder::default();
        let err = pipeline(llm).process(&path, vec![], &recorder).await.unwrap_err();
        assert!(matches!(err, PipelineError::Llm { stage: Stage::Irony, .. }));

        let events = recorder.0.lock().await.clone();
        assert_eq!(events.last().map(String::as_str), Some("start:irony"));
        assert!(!events.iter().any(|e| e.contains("metadata")));
    }

    #[tokio::test]
    async fn test_invalid_stage_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.png");
        write_png(&path, 10, 10);

        let llm = MockLlmClient::new().with_response(
            "slots",
            json!({
                "text_slots": 2,
                "slot_names": ["only_one"],
                "slot_descriptions": ["x"],
                "max_chars_per_slot": 40,
                "text_positions": [{"x": 0, "y": 0, "width": 1, "height": 1, "alignment": "left"}],
                "font_size_recommendation": 32
            }),
        );
        let err = pipeline(llm).process(&path, vec![], &LogObserver).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidOutput { stage: Stage::Slots, .. }));
    }

    #[tokio::test]
    async fn test_missing_image() {
        let err = pipeline(MockLlmClient::new())
            .process(Path::new("/nonexistent/t.png"), vec![], &LogObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ImageNotFound(_)));
    }
}
