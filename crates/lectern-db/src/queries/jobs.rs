//! Job record operations.
//!
//! Every mutation is a single SQL statement, so concurrent progress writes
//! from the orchestrator and read-polling from API handlers never observe a
//! torn record. `updated_at` is bumped by every mutator.

use chrono::Utc;
use rusqlite::Connection;
use lectern_core::{
    AvatarOption, Error, FailureKind, FileType, JobId, JobStatus, Result, SlideRecord,
    StylePreset,
};

use crate::models::Job;

const COLS: &str = "id, original_filename, file_type, style_preset, avatar_option, status,
    progress, status_message, error_message, error_kind, artifacts, slides,
    extracted_text, section_count, video_path, video_duration, created_at,
    updated_at, completed_at";

/// Create a new job in `pending` with the source artifact recorded.
///
/// The caller supplies the id because the uploaded file is stored under the
/// job's artifact directory before the row is inserted.
pub fn create_job(
    conn: &Connection,
    id: JobId,
    original_filename: &str,
    file_type: FileType,
    style_preset: StylePreset,
    avatar_option: AvatarOption,
    source_key: &str,
) -> Result<Job> {
    let now = Utc::now().to_rfc3339();
    let artifacts = serde_json::json!({ "source": source_key }).to_string();

    conn.execute(
        "INSERT INTO jobs (id, original_filename, file_type, style_preset, avatar_option,
             status, progress, status_message, artifacts, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 0, 'Job created, waiting to start', ?6, ?7, ?7)",
        rusqlite::params![
            id.to_string(),
            original_filename,
            file_type.to_string(),
            style_preset.to_string(),
            avatar_option.to_string(),
            artifacts,
            &now,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    get_job(conn, id)?.ok_or_else(|| Error::Internal("job vanished after insert".into()))
}

/// Get a job by ID.
pub fn get_job(conn: &Connection, id: JobId) -> Result<Option<Job>> {
    let q = format!("SELECT {COLS} FROM jobs WHERE id = ?1");
    let result = conn.query_row(&q, [id.to_string()], Job::from_row);
    match result {
        Ok(j) => Ok(Some(j)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List jobs, newest first, with optional status filter and pagination.
pub fn list_jobs(
    conn: &Connection,
    status: Option<JobStatus>,
    offset: i64,
    limit: i64,
) -> Result<Vec<Job>> {
    let (q, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = if let Some(s) = status {
        (
            format!(
                "SELECT {COLS} FROM jobs WHERE status = ?1
                 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
            ),
            vec![
                Box::new(s.to_string()),
                Box::new(limit),
                Box::new(offset),
            ],
        )
    } else {
        (
            format!(
                "SELECT {COLS} FROM jobs
                 ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
            ),
            vec![Box::new(limit), Box::new(offset)],
        )
    };

    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|b| b.as_ref()).collect();
    let rows = stmt
        .query_map(params_refs.as_slice(), Job::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Move a job to a new stage: status, progress floor, and message together.
pub fn update_stage(
    conn: &Connection,
    id: JobId,
    status: JobStatus,
    progress: i64,
    message: &str,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE jobs SET status = ?1,
                progress = CASE WHEN ?2 > progress THEN ?2 ELSE progress END,
                status_message = ?3, updated_at = ?4
             WHERE id = ?5",
            rusqlite::params![status.to_string(), progress, message, now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Update progress within the current stage.
///
/// The CASE guard keeps progress monotonic at the row level even if a stale
/// writer reports a smaller value.
pub fn update_progress(
    conn: &Connection,
    id: JobId,
    progress: i64,
    message: Option<&str>,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE jobs SET progress = CASE WHEN ?1 > progress THEN ?1 ELSE progress END,
                status_message = COALESCE(?2, status_message), updated_at = ?3
             WHERE id = ?4",
            rusqlite::params![progress, message, now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Record a stage's output artifact reference.
///
/// Uses `json_set` so the read-modify-write of the artifacts map stays a
/// single atomic statement.
pub fn set_artifact(
    conn: &Connection,
    id: JobId,
    stage: &str,
    value: &serde_json::Value,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE jobs SET artifacts = json_set(artifacts, '$.' || ?1, json(?2)),
                updated_at = ?3
             WHERE id = ?4",
            rusqlite::params![stage, value.to_string(), now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Drop a stage's artifact reference (cancellation cleanup of the in-flight
/// stage).
pub fn remove_artifact(conn: &Connection, id: JobId, stage: &str) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE jobs SET artifacts = json_remove(artifacts, '$.' || ?1), updated_at = ?2
             WHERE id = ?3",
            rusqlite::params![stage, now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Store parse-stage provenance on the record. Text is clamped so a huge
/// document cannot bloat the row.
pub fn set_parsed_content(
    conn: &Connection,
    id: JobId,
    text: &str,
    section_count: i64,
) -> Result<bool> {
    const MAX_STORED_TEXT: usize = 50_000;
    let clamped: String = text.chars().take(MAX_STORED_TEXT).collect();
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE jobs SET extracted_text = ?1, section_count = ?2, updated_at = ?3
             WHERE id = ?4",
            rusqlite::params![clamped, section_count, now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Persist the generated slide script.
pub fn set_slides(conn: &Connection, id: JobId, slides: &[SlideRecord]) -> Result<bool> {
    let json = serde_json::to_string(slides)
        .map_err(|e| Error::Internal(format!("slide script serialization: {e}")))?;
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE jobs SET slides = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![json, now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Mark a job completed with its final video.
pub fn complete_job(
    conn: &Connection,
    id: JobId,
    video_path: &str,
    video_duration: i64,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE jobs SET status = 'completed', progress = 100,
                status_message = 'Video generation complete',
                video_path = ?1, video_duration = ?2, updated_at = ?3, completed_at = ?3
             WHERE id = ?4",
            rusqlite::params![video_path, video_duration, now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Mark a job failed with a classified error.
pub fn fail_job(
    conn: &Connection,
    id: JobId,
    kind: FailureKind,
    error: &str,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE jobs SET status = 'failed', status_message = 'Job failed',
                error_message = ?1, error_kind = ?2, updated_at = ?3
             WHERE id = ?4",
            rusqlite::params![error, kind.to_string(), now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Transition `failed -> pending` for an explicit retry, clearing the error.
///
/// The status guard in the WHERE clause makes the transition atomic: the
/// update succeeds for exactly one caller even under concurrent retries, and
/// never fires on a job that is not `failed`.
pub fn reset_for_retry(conn: &Connection, id: JobId) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE jobs SET status = 'pending', progress = 0,
                status_message = 'Job reset, retrying', error_message = NULL,
                error_kind = NULL, updated_at = ?1
             WHERE id = ?2 AND status = 'failed'",
            rusqlite::params![now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Delete a job record. Returns true if a row was deleted.
///
/// Refusing deletion while a run is active is the runner pool's job; the
/// store itself deletes unconditionally.
pub fn delete_job(conn: &Connection, id: JobId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM jobs WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
