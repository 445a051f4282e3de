//! Transform submission: the request orchestration path.
//!
//! Sequencing for `POST /api/transform`: validate the upload → validate the
//! parameters → stage the input artifact → duration guard → allocate the
//! output → submit to the job registry. In queue mode the response is a
//! `202` job receipt; in synchronous mode the finished audio streams back
//! directly. Validation failures never spawn an external process, and every
//! failure path releases whatever artifacts it staged.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use std::path::Path;

use tf_av::transform::{self, EffectPreset, TransformSpec};
use tf_core::{Error, Result};

use crate::jobs::{Submission, Work};
use crate::server::download::{self, ArtifactGuard};
use crate::server::error::AppError;
use crate::server::AppContext;

/// Receipt returned for an accepted asynchronous submission.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobReceipt {
    /// Opaque job identifier to poll with.
    pub job_id: String,
    /// Initial job status (always `queued`).
    pub status: String,
    /// Where to poll for status.
    pub status_url: String,
}

struct UploadForm {
    filename: String,
    data: Bytes,
    spec: TransformSpec,
}

/// POST /api/transform
#[utoipa::path(
    post,
    path = "/api/transform",
    tag = "transform",
    responses(
        (status = 202, description = "Job accepted for background processing", body = JobReceipt),
        (status = 200, description = "Transformed audio stream (synchronous mode)"),
        (status = 400, description = "Invalid upload or parameters"),
        (status = 500, description = "Processing failed")
    )
)]
pub async fn submit_transform(
    State(ctx): State<AppContext>,
    multipart: Multipart,
) -> std::result::Result<Response, AppError> {
    let form = read_form(multipart).await?;

    let extension = extension_of(&form.filename).ok_or_else(|| {
        Error::UnsupportedFormat(format!("'{}' has no file extension", form.filename))
    })?;
    if !ctx.config.limits.format_allowed(&extension) {
        return Err(Error::UnsupportedFormat(format!(
            "'{extension}' is not an accepted audio format"
        ))
        .into());
    }

    form.spec.validate()?;

    // Stage the upload. From here on every exit path must release it.
    let input = ctx.artifacts.allocate("in", &extension);
    if let Err(e) = tokio::fs::write(&input, &form.data).await {
        ctx.artifacts.release([&input]);
        return Err(Error::from(e).into());
    }

    // Duration guard. No probed duration is not a rejection reason, but it
    // is a degraded-confidence path worth flagging.
    let limit = ctx.config.limits.max_duration();
    match tf_av::probe::duration_of(&ctx.tools, &input).await {
        Some(duration) if duration > limit => {
            ctx.artifacts.release([&input]);
            return Err(Error::DurationExceeded {
                actual: duration,
                limit,
            }
            .into());
        }
        Some(duration) => {
            tracing::debug!(file = %form.filename, duration = ?duration, "Duration within limit");
        }
        None => {
            tracing::warn!(
                file = %form.filename,
                "Accepting upload without duration check; probe produced no duration"
            );
        }
    }

    // Output mirrors the input container.
    let output = ctx.artifacts.allocate("out", &extension);
    let download_name = format!("speedup_{}", download::sanitize_filename(&form.filename));

    let tools = ctx.tools.clone();
    let spec = form.spec.clone();
    let (work_input, work_output) = (input.clone(), output.clone());
    let work: Work = Box::new(move |sink| {
        Box::pin(async move {
            tf_av::run_transform(&tools, &spec, &work_input, &work_output, Some(sink.as_ref()))
                .await
        })
    });

    match ctx
        .registry
        .submit(work, input, output, download_name.clone())
        .await?
    {
        Submission::Queued(id) => Ok((
            StatusCode::ACCEPTED,
            Json(JobReceipt {
                job_id: id.to_string(),
                status: "queued".into(),
                status_url: format!("/api/jobs/{id}"),
            }),
        )
            .into_response()),
        Submission::Completed(path) => {
            let guard = ArtifactGuard::new(ctx.artifacts.clone(), [path.clone()]);
            Ok(download::stream_attachment(&path, &download_name, guard).await?)
        }
    }
}

/// Pull the file and form fields out of the multipart body.
async fn read_form(mut multipart: Multipart) -> Result<UploadForm> {
    let mut file: Option<(String, Bytes)> = None;
    let mut speed = transform::DEFAULT_SPEED;
    let mut volume = transform::DEFAULT_VOLUME;
    let mut effect = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| Error::InvalidRequest(format!("failed to read upload: {e}")))?;
                file = Some((filename, data));
            }
            "speed" => speed = parse_factor("speed", &text_of(field).await?, speed)?,
            "volume" => volume = parse_factor("volume", &text_of(field).await?, volume)?,
            "effect" => effect = EffectPreset::parse(&text_of(field).await?)?,
            other => {
                tracing::debug!(field = %other, "Ignoring unknown form field");
            }
        }
    }

    let (filename, data) =
        file.ok_or_else(|| Error::InvalidRequest("no file uploaded".into()))?;
    if filename.is_empty() {
        return Err(Error::InvalidRequest("uploaded file has no filename".into()));
    }
    if data.is_empty() {
        return Err(Error::InvalidRequest("uploaded file is empty".into()));
    }

    Ok(UploadForm {
        filename,
        data,
        spec: TransformSpec {
            speed,
            volume,
            effect,
        },
    })
}

async fn text_of(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| Error::InvalidRequest(format!("unreadable form field: {e}")))
}

/// Parse a numeric form field; an empty value keeps the default.
fn parse_factor(name: &str, raw: &str, default: f64) -> Result<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(default);
    }
    raw.parse::<f64>()
        .map_err(|_| Error::InvalidParameter(format!("{name} '{raw}' is not a number")))
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}
