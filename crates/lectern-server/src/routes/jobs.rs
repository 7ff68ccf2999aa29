//! Job lifecycle API route handlers.

use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use lectern_core::{
    AvatarOption, Error, FileType, JobId, JobStatus, SlideRecord, StylePreset,
};
use lectern_db::models::Job;
use lectern_db::queries::jobs;

use crate::context::AppContext;
use crate::error::AppError;

/// Query parameters for listing jobs.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListJobsParams {
    pub status: Option<String>,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// Full job record as returned to polling clients.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobResponse {
    pub id: String,
    pub original_filename: String,
    pub file_type: String,
    pub style_preset: String,
    pub avatar_option: String,
    pub status: JobStatus,
    pub progress: i64,
    pub status_message: Option<String>,
    pub error_message: Option<String>,
    pub error_kind: Option<String>,
    pub slides_content: Option<Vec<SlideRecord>>,
    pub video_path: Option<String>,
    pub video_duration: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobResponse {
    fn from_model(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            original_filename: job.original_filename.clone(),
            file_type: job.file_type.to_string(),
            style_preset: job.style_preset.to_string(),
            avatar_option: job.avatar_option.to_string(),
            status: job.status,
            progress: job.progress,
            status_message: job.status_message.clone(),
            error_message: job.error_message.clone(),
            error_kind: job.error_kind.map(|k| k.to_string()),
            slides_content: job.slides.clone(),
            video_path: job.video_path.clone(),
            video_duration: job.video_duration,
            created_at: job.created_at.clone(),
            updated_at: job.updated_at.clone(),
            completed_at: job.completed_at.clone(),
        }
    }
}

fn parse_job_id(id: &str) -> Result<JobId, AppError> {
    id.parse()
        .map_err(|_| Error::Validation("Invalid job ID".into()).into())
}

fn load_job(ctx: &AppContext, job_id: JobId) -> Result<Job, AppError> {
    let conn = lectern_db::pool::get_conn(&ctx.db)?;
    let job = jobs::get_job(&conn, job_id)?.ok_or_else(|| Error::not_found("job", job_id))?;
    Ok(job)
}

/// POST /api/upload
#[utoipa::path(
    post,
    path = "/api/upload",
    responses(
        (status = 201, description = "Job created", body = JobResponse),
        (status = 400, description = "Unsupported file type or size over limit")
    )
)]
pub async fn upload(
    State(ctx): State<AppContext>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut file: Option<(String, axum::body::Bytes)> = None;
    let mut style = StylePreset::default();
    let mut avatar = AvatarOption::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Validation(format!("malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| Error::Validation("file field has no filename".into()))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| Error::Validation(format!("upload truncated: {e}")))?;
                file = Some((filename, data));
            }
            Some("style_preset") => {
                let text = field.text().await.unwrap_or_default();
                style = text.parse().unwrap_or_default();
            }
            Some("avatar_option") => {
                let text = field.text().await.unwrap_or_default();
                avatar = text.parse().unwrap_or_default();
            }
            _ => {}
        }
    }

    let (filename, data) = file
        .ok_or_else(|| Error::Validation("missing 'file' field".into()))?;

    if data.len() as u64 > ctx.config.storage.max_upload_bytes {
        return Err(Error::Validation(format!(
            "file exceeds the upload limit of {} bytes",
            ctx.config.storage.max_upload_bytes
        ))
        .into());
    }

    let file_type = FileType::from_filename(&filename).ok_or_else(|| {
        Error::Validation(
            "Unsupported file type. Upload PDF, DOCX, PPTX, TEX, TXT, or MD".into(),
        )
    })?;

    // Keep only the final path component of the client-supplied name.
    let safe_name = std::path::Path::new(&filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string());

    let job_id = JobId::new();
    let source_key = format!("source/{safe_name}");
    ctx.store.put(job_id, &source_key, &data)?;

    let conn = lectern_db::pool::get_conn(&ctx.db)?;
    let job = jobs::create_job(
        &conn,
        job_id,
        &safe_name,
        file_type,
        style,
        avatar,
        &source_key,
    )?;

    tracing::info!(job_id = %job_id, filename = %safe_name, "Job created");
    Ok((StatusCode::CREATED, Json(JobResponse::from_model(&job))))
}

/// POST /api/jobs/{id}/start
#[utoipa::path(
    post,
    path = "/api/jobs/{id}/start",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 202, description = "Run submitted"),
        (status = 404, description = "Job not found"),
        (status = 409, description = "Job already running or not pending")
    )
)]
pub async fn start_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let job_id = parse_job_id(&id)?;
    let job = load_job(&ctx, job_id)?;

    if job.status != JobStatus::Pending {
        return Err(Error::Conflict(format!(
            "job is already {}; only pending jobs can start",
            job.status
        ))
        .into());
    }

    ctx.runner.submit(job_id)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "job_id": job_id.to_string(),
            "status": "started",
        })),
    ))
}

/// GET /api/jobs/{id}
#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job details", body = JobResponse),
        (status = 404, description = "Job not found")
    )
)]
pub async fn get_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let job_id = parse_job_id(&id)?;
    let job = load_job(&ctx, job_id)?;
    Ok(Json(JobResponse::from_model(&job)))
}

/// GET /api/jobs
#[utoipa::path(
    get,
    path = "/api/jobs",
    params(ListJobsParams),
    responses(
        (status = 200, description = "All jobs, newest first", body = Vec<JobResponse>)
    )
)]
pub async fn list_jobs(
    State(ctx): State<AppContext>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<Vec<JobResponse>>, AppError> {
    // Unknown status filters match nothing being asked for; ignore them.
    let status = params.status.as_deref().and_then(|s| s.parse().ok());

    let conn = lectern_db::pool::get_conn(&ctx.db)?;
    let jobs = jobs::list_jobs(&conn, status, params.offset, params.limit.clamp(1, 500))?;
    Ok(Json(jobs.iter().map(JobResponse::from_model).collect()))
}

/// GET /api/jobs/{id}/video
#[utoipa::path(
    get,
    path = "/api/jobs/{id}/video",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Final video stream", content_type = "video/mp4"),
        (status = 404, description = "Job or artifact not found"),
        (status = 409, description = "Job not completed")
    )
)]
pub async fn get_video(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let job_id = parse_job_id(&id)?;
    let job = load_job(&ctx, job_id)?;

    if job.status != JobStatus::Completed {
        return Err(Error::Conflict(format!(
            "video not ready; job status is {}",
            job.status
        ))
        .into());
    }

    let key = job
        .video_path
        .as_deref()
        .ok_or_else(|| Error::not_found("video artifact", job_id))?;
    let path = ctx.store.path(job_id, key)?;

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| Error::not_found("video artifact", job_id))?;
    let len = file.metadata().await.map(|m| m.len()).ok();

    let stem = job
        .original_filename
        .rsplit_once('.')
        .map(|(s, _)| s)
        .unwrap_or(&job.original_filename);
    let disposition = format!("attachment; filename=\"{stem}_presentation.mp4\"");

    let mut response = axum::response::Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_DISPOSITION, disposition);
    if let Some(len) = len {
        response = response.header(header::CONTENT_LENGTH, len);
    }

    response
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| Error::Internal(format!("response build: {e}")).into())
}

/// GET /api/jobs/{id}/slides/{n}
#[utoipa::path(
    get,
    path = "/api/jobs/{id}/slides/{n}",
    params(
        ("id" = String, Path, description = "Job ID"),
        ("n" = u32, Path, description = "1-based slide number")
    ),
    responses(
        (status = 200, description = "Rendered slide image", content_type = "image/png"),
        (status = 404, description = "Job or slide not found")
    )
)]
pub async fn get_slide_image(
    State(ctx): State<AppContext>,
    Path((id, n)): Path<(String, u32)>,
) -> Result<impl IntoResponse, AppError> {
    let job_id = parse_job_id(&id)?;
    let job = load_job(&ctx, job_id)?;

    let keys: Vec<String> = job
        .artifacts
        .get("generating_slides")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .ok_or_else(|| Error::not_found("slides", job_id))?;

    let key = n
        .checked_sub(1)
        .and_then(|i| keys.get(i as usize))
        .ok_or_else(|| Error::not_found("slide", n))?;

    let bytes = ctx.store.read(job_id, key)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}

/// DELETE /api/jobs/{id}
#[utoipa::path(
    delete,
    path = "/api/jobs/{id}",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job and artifacts deleted"),
        (status = 404, description = "Job not found"),
        (status = 409, description = "Job currently running")
    )
)]
pub async fn delete_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let job_id = parse_job_id(&id)?;
    load_job(&ctx, job_id)?;

    if ctx.runner.is_active(job_id) {
        return Err(Error::Conflict(
            "job is currently running; cancel the run first".into(),
        )
        .into());
    }

    let conn = lectern_db::pool::get_conn(&ctx.db)?;
    if !jobs::delete_job(&conn, job_id)? {
        return Err(Error::not_found("job", job_id).into());
    }
    drop(conn);

    ctx.store.delete_job(job_id)?;

    tracing::info!(job_id = %job_id, "Job deleted");
    Ok(Json(serde_json::json!({ "deleted": job_id.to_string() })))
}

/// POST /api/jobs/{id}/retry
#[utoipa::path(
    post,
    path = "/api/jobs/{id}/retry",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 202, description = "Retry submitted"),
        (status = 404, description = "Job not found"),
        (status = 409, description = "Job not in failed state")
    )
)]
pub async fn retry_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let job_id = parse_job_id(&id)?;
    load_job(&ctx, job_id)?;

    let conn = lectern_db::pool::get_conn(&ctx.db)?;
    if !jobs::reset_for_retry(&conn, job_id)? {
        return Err(Error::Conflict("only failed jobs can be retried".into()).into());
    }
    drop(conn);

    ctx.runner.submit(job_id)?;

    tracing::info!(job_id = %job_id, "Job retry submitted");
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "job_id": job_id.to_string(),
            "status": "retrying",
        })),
    ))
}

/// POST /api/jobs/{id}/cancel
#[utoipa::path(
    post,
    path = "/api/jobs/{id}/cancel",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 202, description = "Cancellation requested"),
        (status = 404, description = "Job not found"),
        (status = 409, description = "No active run")
    )
)]
pub async fn cancel_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let job_id = parse_job_id(&id)?;
    load_job(&ctx, job_id)?;

    if !ctx.runner.cancel(job_id) {
        return Err(Error::Conflict("job has no active run".into()).into());
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "job_id": job_id.to_string(),
            "status": "cancelling",
        })),
    ))
}
