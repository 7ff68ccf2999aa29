//! The ordered stage table driving the orchestrator loop.
//!
//! Each descriptor names one pipeline stage, the job status it corresponds
//! to, the artifact it produces, the weighted progress band it occupies, and
//! the directories to scrub when the stage is aborted mid-flight. Keeping
//! this as data lets the orchestrator loop stay generic and lets tests swap
//! in fake executors without touching the sequencing logic.

use lectern_core::JobStatus;

/// Static description of one pipeline stage.
#[derive(Debug, Clone, Copy)]
pub struct StageDescriptor {
    /// Stage name; doubles as the key in the job's artifacts map.
    pub name: &'static str,
    /// Job status while this stage is executing.
    pub status: JobStatus,
    /// Progress band `(floor, ceiling)` occupied by this stage.
    pub band: (i64, i64),
    /// `status_message` written on stage entry.
    pub message: &'static str,
    /// Artifact-store subdirectories owned by this stage, removed when the
    /// stage is aborted so a retry starts from a clean slate.
    pub cleanup: &'static [&'static str],
}

/// The fixed pipeline, in execution order.
pub const STAGES: &[StageDescriptor] = &[
    StageDescriptor {
        name: "parsing",
        status: JobStatus::Parsing,
        band: (0, 10),
        message: "Parsing document",
        cleanup: &["parsed"],
    },
    StageDescriptor {
        name: "generating_script",
        status: JobStatus::GeneratingScript,
        band: (10, 30),
        message: "Generating presentation script",
        cleanup: &["script"],
    },
    StageDescriptor {
        name: "generating_slides",
        status: JobStatus::GeneratingSlides,
        band: (30, 55),
        message: "Rendering slide images",
        cleanup: &["slides"],
    },
    StageDescriptor {
        name: "generating_audio",
        status: JobStatus::GeneratingAudio,
        band: (55, 75),
        message: "Synthesizing narration",
        cleanup: &["audio"],
    },
    StageDescriptor {
        name: "composing_video",
        status: JobStatus::ComposingVideo,
        band: (75, 100),
        message: "Composing video",
        cleanup: &["avatar", "video"],
    },
];

/// Index of the first stage whose output artifact is not recorded on the
/// job, i.e. where a (re)run should start. Artifacts from earlier completed
/// stages are reused rather than recomputed.
pub fn resume_index(job: &lectern_db::models::Job) -> usize {
    STAGES
        .iter()
        .position(|s| !job.has_artifact(s.name))
        .unwrap_or(STAGES.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_core::{AvatarOption, FileType, JobId, StylePreset};
    use lectern_db::pool::init_memory_pool;
    use lectern_db::queries::jobs;

    #[test]
    fn bands_are_contiguous_and_cover_the_range() {
        assert_eq!(STAGES.first().unwrap().band.0, 0);
        assert_eq!(STAGES.last().unwrap().band.1, 100);
        for pair in STAGES.windows(2) {
            assert_eq!(pair[0].band.1, pair[1].band.0);
            assert!(pair[0].band.0 < pair[0].band.1);
        }
    }

    #[test]
    fn names_match_status_strings() {
        for s in STAGES {
            assert_eq!(s.name, s.status.to_string());
        }
    }

    #[test]
    fn resume_index_walks_recorded_artifacts() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let job = jobs::create_job(
            &conn,
            JobId::new(),
            "paper.pdf",
            FileType::Pdf,
            StylePreset::Concise,
            AvatarOption::None,
            "source/paper.pdf",
        )
        .unwrap();

        // Fresh job: start at the first stage.
        assert_eq!(resume_index(&job), 0);

        jobs::set_artifact(&conn, job.id, "parsing", &serde_json::json!("parsed/content.json"))
            .unwrap();
        jobs::set_artifact(&conn, job.id, "generating_script", &serde_json::json!("script/slides.json"))
            .unwrap();
        let job = jobs::get_job(&conn, job.id).unwrap().unwrap();
        assert_eq!(resume_index(&job), 2);
    }

    #[test]
    fn resume_index_past_the_end_when_all_present() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let job = jobs::create_job(
            &conn,
            JobId::new(),
            "notes.md",
            FileType::Text,
            StylePreset::Concise,
            AvatarOption::None,
            "source/notes.md",
        )
        .unwrap();
        for s in STAGES {
            jobs::set_artifact(&conn, job.id, s.name, &serde_json::json!("x")).unwrap();
        }
        let job = jobs::get_job(&conn, job.id).unwrap().unwrap();
        assert_eq!(resume_index(&job), STAGES.len());
    }
}
