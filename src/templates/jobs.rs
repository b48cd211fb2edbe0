//! In-memory records of template processing runs

use super::models::ProcessingResult;
use super::orchestrator::{PipelineError, ProgressObserver, TemplatePipeline};
use super::stages::Stage;
use crate::types::TemplateEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub filename: String,
    pub image_path: PathBuf,
    pub current_stage: Option<Stage>,
    pub stages_completed: Vec<Stage>,
    /// floor(completed / 7 * 100)
    pub progress: u8,
    pub result: Option<ProcessingResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingJob {
    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<Uuid, ProcessingJob>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, filename: impl Into<String>, image_path: PathBuf) -> ProcessingJob {
        let now = Utc::now();
        let job = ProcessingJob {
            job_id: Uuid::new_v4(),
            status: JobStatus::Pending,
            filename: filename.into(),
            image_path,
            current_stage: None,
            stages_completed: Vec::new(),
            progress: 0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        self.jobs.write().await.insert(job.job_id, job.clone());
        job
    }

    pub async fn get(&self, id: Uuid) -> Option<ProcessingJob> {
        self.jobs.read().await.get(&id).cloned()
    }

    async fn update(&self, id: Uuid, f: impl FnOnce(&mut ProcessingJob)) {
        if let Some(job) = self.jobs.write().await.get_mut(&id) {
            f(job);
            job.touch();
        }
    }

    pub async fn stage_started(&self, id: Uuid, stage: Stage) {
        self.update(id, |job| {
            job.status = JobStatus::Running;
            job.current_stage = Some(stage);
        })
        .await;
    }

    pub async fn stage_completed(&self, id: Uuid, stage: Stage) {
        self.update(id, |job| {
            if !job.stages_completed.contains(&stage) {
                job.stages_completed.push(stage);
            }
            job.progress = (job.stages_completed.len() * 100 / Stage::ALL.len()) as u8;
        })
        .await;
    }

    pub async fn complete(&self, id: Uuid, result: ProcessingResult) {
        self.update(id, |job| {
            job.status = JobStatus::Completed;
            job.current_stage = None;
            job.progress = 100;
            job.result = Some(result);
        })
        .await;
    }

    pub async fn fail(&self, id: Uuid, message: String) {
        self.update(id, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(message);
        })
        .await;
    }
}

/// Feeds pipeline progress into one job record
pub struct JobObserver {
    store: Arc<JobStore>,
    job_id: Uuid,
}

impl JobObserver {
    pub fn new(store: Arc<JobStore>, job_id: Uuid) -> Self {
        Self { store, job_id }
    }
}

#[async_trait]
impl ProgressObserver for JobObserver {
    async fn stage_started(&self, stage: Stage) {
        self.store.stage_started(self.job_id, stage).await;
    }

    async fn stage_completed(&self, stage: Stage, _output: &Value) {
        self.store.stage_completed(self.job_id, stage).await;
    }
}

/// Run the pipeline for `job_id` and record the outcome on the job
pub async fn run_job(
    pipeline: Arc<TemplatePipeline>,
    store: Arc<JobStore>,
    job_id: Uuid,
    image_path: PathBuf,
    existing: Vec<TemplateEntry>,
) -> Result<ProcessingResult, PipelineError> {
    let observer = JobObserver::new(Arc::clone(&store), job_id);
    match pipeline.process(&image_path, existing, &observer).await {
        Ok(result) => {
            info!("[Pipeline] Job {} completed: {}", job_id, result.metadata.id);
            store.complete(job_id, result.clone()).await;
            Ok(result)
        }
        Err(e) => {
            error!("[Pipeline] Job {} failed: {}", job_id, e);
            store.fail(job_id, e.to_string()).await;
            Err(e)
        }
    }
}
