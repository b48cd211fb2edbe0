//! Template onboarding endpoints
//!
//! Upload starts a background pipeline job; the client polls the job and then
//! finalizes it, which copies the image into the template directory and merges
//! the generated fragments into the registry.

use super::{api_error, internal, ApiError};
use crate::api::server::AppState;
use crate::llm::media_type;
use crate::templates::{
    run_job, JobStatus, ProcessingJob, StepStatus, TemplateRegistry,
};
use crate::types::TemplateEntry;
use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

#[derive(Debug, Serialize)]
pub struct TemplateListResponse {
    pub templates: Vec<TemplateEntry>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub job_id: Uuid,
    #[serde(default)]
    pub metadata_overrides: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct FinalizeResponse {
    pub success: bool,
    pub template_id: String,
    pub integration_status: BTreeMap<String, StepStatus>,
    pub message: String,
}

pub async fn list_templates(State(state): State<AppState>) -> Json<TemplateListResponse> {
    let registry = state.registry.read().await;
    let templates: Vec<TemplateEntry> = registry.templates().cloned().collect();
    Json(TemplateListResponse {
        total: templates.len(),
        templates,
    })
}

/// Keep only the final path component, without anything that could escape a directory
fn safe_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() || base.starts_with('.') {
        "template.png".to_string()
    } else {
        base.to_string()
    }
}

fn is_image(filename: &str, content_type: Option<&str>, data: &[u8]) -> bool {
    let ext = filename.rsplit('.').next().unwrap_or_default().to_lowercase();
    let declared = content_type.map_or(true, |c| c.starts_with("image/"));
    declared && IMAGE_EXTENSIONS.contains(&ext.as_str()) && image::guess_format(data).is_ok()
}

/// Accept a multipart `file` and start processing it in the background
pub async fn upload_template(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ProcessingJob>), ApiError> {
    let mut file_data: Option<(String, Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() == Some("file") {
            let filename = safe_filename(field.file_name().unwrap_or_default());
            let content_type = field.content_type().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
            file_data = Some((filename, content_type, data.to_vec()));
        }
    }

    let (filename, content_type, data) =
        file_data.ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Missing required 'file' field"))?;

    if !is_image(&filename, content_type.as_deref(), &data) {
        return Err(api_error(StatusCode::BAD_REQUEST, "File must be an image (png, jpg, webp)"));
    }

    // A directory per upload keeps the original file name intact
    let upload_dir = state.config.upload_dir.join(Uuid::new_v4().to_string());
    tokio::fs::create_dir_all(&upload_dir).await.map_err(internal)?;
    let image_path = upload_dir.join(&filename);
    tokio::fs::write(&image_path, &data).await.map_err(internal)?;

    let job = state.jobs.create(filename.clone(), image_path.clone()).await;
    let existing: Vec<TemplateEntry> = state.registry.read().await.templates().cloned().collect();
    info!("[Templates] Job {} started for {}", job.job_id, filename);

    let pipeline = Arc::clone(&state.pipeline);
    let jobs = Arc::clone(&state.jobs);
    let job_id = job.job_id;
    tokio::spawn(async move {
        // Outcome is recorded on the job
        let _ = run_job(pipeline, jobs, job_id, image_path, existing).await;
    });

    Ok((StatusCode::ACCEPTED, Json(job)))
}

pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ProcessingJob>, ApiError> {
    state
        .jobs
        .get(job_id)
        .await
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Job not found: {}", job_id)))
}

/// Integrate a completed job into the registry
pub async fn finalize_template(
    State(state): State<AppState>,
    Json(request): Json<FinalizeRequest>,
) -> Result<Json<FinalizeResponse>, ApiError> {
    let job = state
        .jobs
        .get(request.job_id)
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Job not found: {}", request.job_id)))?;

    let mut result = match (job.status, job.result) {
        (JobStatus::Completed, Some(result)) => result.with_overrides(&request.metadata_overrides),
        (status, _) => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                format!("Job is {:?}, only completed jobs can be finalized", status).to_lowercase(),
            ))
        }
    };
    result.metadata.filename = result.image_filename();

    let owner = state
        .registry
        .read()
        .await
        .image_owner(&result.metadata.filename, &result.metadata.id)
        .map(|t| t.id.clone());
    if let Some(owner) = owner {
        return Err(api_error(
            StatusCode::CONFLICT,
            format!("{} already belongs to template '{}'", result.metadata.filename, owner),
        ));
    }

    if !tokio::fs::try_exists(&job.image_path).await.unwrap_or(false) {
        return Err(api_error(
            StatusCode::GONE,
            format!("Upload for job {} is no longer available", request.job_id),
        ));
    }

    let template_dir = &state.config.template_dir;
    tokio::fs::create_dir_all(template_dir).await.map_err(internal)?;
    tokio::fs::copy(&job.image_path, template_dir.join(&result.metadata.filename))
        .await
        .map_err(internal)?;

    let report = state.integrator.integrate(&result).await;
    let success = report.success();

    match TemplateRegistry::load(&state.config.registry_dir) {
        Ok(registry) => *state.registry.write().await = registry,
        Err(e) => warn!("[Templates] Registry reload failed: {}", e),
    }

    // Partially integrated uploads stay so finalize can be retried
    if success {
        remove_upload(&state.config.upload_dir, &job.image_path).await;
    }

    let message = if success {
        format!("Template '{}' integrated", report.template_id)
    } else {
        let failed: Vec<&str> = report.failed().iter().map(|a| a.file_name()).collect();
        format!("Template '{}' partially integrated; failed: {}", report.template_id, failed.join(", "))
    };

    Ok(Json(FinalizeResponse {
        success,
        template_id: report.template_id.clone(),
        integration_status: report.status(),
        message,
    }))
}

/// Delete the per-upload directory holding `image_path`
async fn remove_upload(upload_root: &std::path::Path, image_path: &std::path::Path) {
    let Some(dir) = image_path.parent().filter(|d| d.starts_with(upload_root) && *d != upload_root) else {
        return;
    };
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        warn!("[Templates] Could not remove upload {}: {}", dir.display(), e);
    }
}

/// Serve a registered template's image
pub async fn preview_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let filename = state
        .registry
        .read()
        .await
        .get(&id)
        .map(|t| t.filename.clone())
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Template not found: {}", id)))?;

    let path = state.config.template_dir.join(&filename);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| api_error(StatusCode::NOT_FOUND, format!("Template image missing: {}", filename)))?;

    Ok(([(header::CONTENT_TYPE, media_type(&path))], bytes).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_filename() {
        assert_eq!(safe_filename("../../etc/passwd"), "passwd");
        assert_eq!(safe_filename("C:\\memes\\drake.png"), "drake.png");
        assert_eq!(safe_filename(""), "template.png");
        assert_eq!(safe_filename(".hidden"), "template.png");
    }

    #[test]
    fn test_is_image_checks_bytes() {
        let mut png = Vec::new();
        image::RgbImage::new(2, 2)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        assert!(is_image("a.png", Some("image/png"), &png));
        assert!(!is_image("a.txt", Some("image/png"), &png));
        assert!(!is_image("a.png", Some("text/plain"), &png));
        assert!(!is_image("a.png", None, b"not an image"));
    }
}
