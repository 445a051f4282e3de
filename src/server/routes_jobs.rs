//! Job status polling and result download.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Serialize;

use tf_core::{Error, JobId};

use crate::jobs::{JobSnapshot, JobStatus};
use crate::server::download::{self, ArtifactGuard};
use crate::server::error::AppError;
use crate::server::AppContext;

/// Status payload for one job.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobStatusResponse {
    pub job_id: String,
    /// One of `queued`, `running`, `completed`, `failed`.
    pub status: String,
    /// Fractional progress in [0.0, 1.0]; best-effort, 0 until known.
    pub progress: f32,
    /// Submission time (RFC 3339).
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl JobStatusResponse {
    fn from_snapshot(id: JobId, snapshot: JobSnapshot) -> Self {
        let created_at = snapshot.created_at.to_rfc3339();
        match snapshot.status {
            JobStatus::Queued => Self {
                job_id: id.to_string(),
                status: "queued".into(),
                progress: 0.0,
                created_at,
                error: None,
                download_url: None,
            },
            JobStatus::Running { progress } => Self {
                job_id: id.to_string(),
                status: "running".into(),
                progress,
                created_at,
                error: None,
                download_url: None,
            },
            JobStatus::Completed => Self {
                job_id: id.to_string(),
                status: "completed".into(),
                progress: 1.0,
                created_at,
                error: None,
                download_url: Some(format!("/api/jobs/{id}/download")),
            },
            JobStatus::Failed { error } => Self {
                job_id: id.to_string(),
                status: "failed".into(),
                progress: 0.0,
                created_at,
                error: Some(error),
                download_url: None,
            },
        }
    }
}

/// GET /api/jobs/{id}
#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    tag = "jobs",
    params(("id" = String, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Current job status", body = JobStatusResponse),
        (status = 404, description = "Unknown or expired job")
    )
)]
pub async fn job_status(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<JobStatusResponse>, AppError> {
    let job_id = parse_job_id(&id)?;
    let snapshot = ctx
        .registry
        .status(job_id)
        .ok_or_else(|| Error::not_found("job", &id))?;
    Ok(Json(JobStatusResponse::from_snapshot(job_id, snapshot)))
}

/// GET /api/jobs/{id}/download
#[utoipa::path(
    get,
    path = "/api/jobs/{id}/download",
    tag = "jobs",
    params(("id" = String, Path, description = "Job identifier")),
    responses(
        (status = 200, description = "Transformed audio stream"),
        (status = 404, description = "Unknown, expired, unfinished, or already downloaded")
    )
)]
pub async fn download_result(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let job_id = parse_job_id(&id)?;
    let (path, filename) = ctx
        .registry
        .claim_output(job_id)
        .ok_or_else(|| Error::not_found("job", &id))?;

    // The body owns the guard: the output is released when the transfer
    // finishes or the client disconnects.
    let guard = ArtifactGuard::new(ctx.artifacts.clone(), [path.clone()]);
    Ok(download::stream_attachment(&path, &filename, guard).await?)
}

/// A malformed id is indistinguishable from a job that never existed.
fn parse_job_id(raw: &str) -> Result<JobId, AppError> {
    raw.parse()
        .map_err(|_| Error::not_found("job", raw).into())
}
