//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row`.

use lectern_core::{
    AvatarOption, FailureKind, FileType, JobId, JobStatus, SlideRecord, StylePreset,
};
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

/// Parse a UUID-based ID from a text column.
fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(T::from(uuid))
}

/// Parse a `FromStr` enum from a text column.
fn parse_enum<T: FromStr>(row: &rusqlite::Row, idx: usize, what: &str) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    s.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid {what}: {s}").into(),
        )
    })
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One document-to-video conversion request and its mutable state.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub original_filename: String,
    pub file_type: FileType,
    pub style_preset: StylePreset,
    pub avatar_option: AvatarOption,
    pub status: JobStatus,
    pub progress: i64,
    pub status_message: Option<String>,
    pub error_message: Option<String>,
    pub error_kind: Option<FailureKind>,
    /// Stage name -> artifact key(s), relative to the job's artifact root.
    pub artifacts: serde_json::Value,
    /// Generated slide script, persisted after the script stage.
    pub slides: Option<Vec<SlideRecord>>,
    pub extracted_text: Option<String>,
    pub section_count: Option<i64>,
    pub video_path: Option<String>,
    pub video_duration: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl Job {
    /// Build from a row selected as:
    /// id, original_filename, file_type, style_preset, avatar_option, status,
    /// progress, status_message, error_message, error_kind, artifacts, slides,
    /// extracted_text, section_count, video_path, video_duration, created_at,
    /// updated_at, completed_at
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let error_kind: Option<String> = row.get(9)?;
        let artifacts_json: String = row.get(10)?;
        let slides_json: Option<String> = row.get(11)?;
        Ok(Self {
            id: parse_id(row, 0)?,
            original_filename: row.get(1)?,
            file_type: parse_enum(row, 2, "file_type")?,
            style_preset: parse_enum(row, 3, "style_preset")?,
            avatar_option: parse_enum(row, 4, "avatar_option")?,
            status: parse_enum(row, 5, "status")?,
            progress: row.get(6)?,
            status_message: row.get(7)?,
            error_message: row.get(8)?,
            error_kind: error_kind.and_then(|s| s.parse().ok()),
            artifacts: serde_json::from_str(&artifacts_json)
                .unwrap_or(serde_json::Value::Object(Default::default())),
            slides: slides_json.and_then(|s| serde_json::from_str(&s).ok()),
            extracted_text: row.get(12)?,
            section_count: row.get(13)?,
            video_path: row.get(14)?,
            video_duration: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
            completed_at: row.get(18)?,
        })
    }

    /// The artifact key recorded for a stage, when it is a single key.
    pub fn artifact_key(&self, stage: &str) -> Option<&str> {
        self.artifacts.get(stage).and_then(|v| v.as_str())
    }

    /// Whether any artifact reference is recorded for a stage.
    pub fn has_artifact(&self, stage: &str) -> bool {
        self.artifacts
            .get(stage)
            .map(|v| !v.is_null())
            .unwrap_or(false)
    }
}
