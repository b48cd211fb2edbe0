//! Meme template onboarding
//!
//! An uploaded image goes through seven LLM stages (visual analysis, slot
//! detection, irony analysis, metadata, examples, prompt, code fragments).
//! The finished result is then merged into the JSON registry that meme
//! generation and rendering read from.

pub mod integrator;
pub mod jobs;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod stages;

pub use integrator::{IntegrationError, IntegrationReport, StepStatus, TemplateIntegrator};
pub use jobs::{run_job, JobStatus, JobStore, ProcessingJob};
pub use models::ProcessingResult;
pub use orchestrator::{LogObserver, PipelineError, ProgressObserver, TemplatePipeline};
pub use registry::{Artifact, RendererLayout, TemplateRegistry};
pub use stages::{Stage, TemplateContext};
