//! The pipeline state machine.
//!
//! [`Orchestrator::run`] walks the stage table for one job: it advances
//! `status` along the automaton, hands each stage's input artifacts to the
//! corresponding collaborator, persists the stage's output artifact before
//! moving on, and converts any stage failure into the terminal `failed`
//! state. A run resumes from the first stage whose output artifact is
//! missing, so a retry never repeats expensive external calls that already
//! succeeded.
//!
//! Cancellation is cooperative: the token is observed before each stage and
//! between per-slide/per-clip items, never mid-external-call. An aborted
//! stage's partial outputs are scrubbed so the next run starts that stage
//! clean.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use lectern_core::storage::{
    ArtifactStore, AUDIO_DIR, AUDIO_MANIFEST_KEY, AVATAR_KEY, PARSED_KEY, SCRIPT_KEY,
    SLIDES_DIR, VIDEO_KEY,
};
use lectern_core::{
    AvatarOption, Error, JobId, JobStatus, NarrationClip, ParsedDocument, Result, SlideRecord,
};
use lectern_db::models::Job;
use lectern_db::pool::DbPool;
use lectern_db::queries::jobs;

use crate::collab::Collaborators;
use crate::descriptor::{resume_index, StageDescriptor, STAGES};
use crate::progress::ProgressReporter;
use crate::stage::{StageError, StageResult};

/// Executes pipeline runs for individual jobs.
///
/// Cheap to clone; shared by all worker tasks in the runner pool.
#[derive(Clone)]
pub struct Orchestrator {
    db: DbPool,
    store: ArtifactStore,
    collab: Collaborators,
}

/// Map an infrastructure error (store or record unreachable) into the stage
/// taxonomy. These are environment problems, so a retry is worth attempting.
fn infra(e: Error) -> StageError {
    StageError::transient(e.to_string())
}

impl Orchestrator {
    pub fn new(db: DbPool, store: ArtifactStore, collab: Collaborators) -> Self {
        Self { db, store, collab }
    }

    /// Execute the pipeline for `job_id` until a terminal state.
    ///
    /// Stage failures never escape: they are written to the job record as
    /// `failed` and the call returns `Ok`. An `Err` from this function means
    /// the job record itself could not be read or written.
    pub async fn run(&self, job_id: JobId, cancel: CancellationToken) -> Result<()> {
        let job = self
            .load(job_id)?
            .ok_or_else(|| Error::not_found("job", job_id))?;

        if job.status != JobStatus::Pending {
            return Err(Error::Conflict(format!(
                "job {job_id} is {} and cannot start",
                job.status
            )));
        }

        // Resume from the first stage without a recorded artifact. When every
        // stage artifact survived a failure at the finish line, re-run the
        // final stage so the completion fields get written.
        let start = resume_index(&job).min(STAGES.len() - 1);
        let progress = ProgressReporter::new(self.db.clone(), job_id);

        tracing::info!(job_id = %job_id, stage = STAGES[start].name, "Pipeline run starting");

        for desc in &STAGES[start..] {
            if cancel.is_cancelled() {
                return self.abort_cancelled(job_id, desc).await;
            }

            {
                let conn = lectern_db::pool::get_conn(&self.db)?;
                jobs::update_stage(&conn, job_id, desc.status, desc.band.0, desc.message)?;
            }
            progress.enter_band(desc.band);

            // Fresh snapshot so the stage sees artifacts recorded by its
            // predecessors in this run.
            let snapshot = self
                .load(job_id)?
                .ok_or_else(|| Error::not_found("job", job_id))?;

            let outcome = self
                .execute_stage(desc, &snapshot, &cancel, &progress)
                .await;

            match outcome {
                Ok(()) => {
                    // Cancellation arriving during a stage that still
                    // succeeded is observed at the next stage's entry check;
                    // a finished final stage stays completed.
                    progress.complete_stage(None);
                    tracing::info!(job_id = %job_id, stage = desc.name, "Stage completed");
                }
                Err(_) if cancel.is_cancelled() => {
                    return self.abort_cancelled(job_id, desc).await;
                }
                Err(e) => {
                    tracing::error!(
                        job_id = %job_id,
                        stage = desc.name,
                        kind = %e.kind,
                        "Stage failed: {}",
                        e.message
                    );
                    self.scrub_stage(job_id, desc)?;
                    let conn = lectern_db::pool::get_conn(&self.db)?;
                    jobs::fail_job(&conn, job_id, e.kind, &e.message)?;
                    return Ok(());
                }
            }
        }

        tracing::info!(job_id = %job_id, "Pipeline run completed");
        Ok(())
    }

    fn load(&self, job_id: JobId) -> Result<Option<Job>> {
        let conn = lectern_db::pool::get_conn(&self.db)?;
        jobs::get_job(&conn, job_id)
    }

    /// Mark the job failed after a cooperative cancellation, scrubbing the
    /// in-flight stage's partial outputs. Artifacts from completed stages
    /// are retained.
    async fn abort_cancelled(&self, job_id: JobId, desc: &StageDescriptor) -> Result<()> {
        tracing::info!(job_id = %job_id, stage = desc.name, "Pipeline run cancelled");
        self.scrub_stage(job_id, desc)?;
        let conn = lectern_db::pool::get_conn(&self.db)?;
        jobs::fail_job(
            &conn,
            job_id,
            lectern_core::FailureKind::Transient,
            "Cancelled by user",
        )?;
        Ok(())
    }

    /// Remove a stage's partial outputs and its artifact entry.
    fn scrub_stage(&self, job_id: JobId, desc: &StageDescriptor) -> Result<()> {
        for dir in desc.cleanup {
            self.store.remove(job_id, dir)?;
        }
        let conn = lectern_db::pool::get_conn(&self.db)?;
        jobs::remove_artifact(&conn, job_id, desc.name)?;
        Ok(())
    }

    async fn execute_stage(
        &self,
        desc: &StageDescriptor,
        job: &Job,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> StageResult<()> {
        match desc.status {
            JobStatus::Parsing => self.run_parsing(job).await,
            JobStatus::GeneratingScript => self.run_script(job).await,
            JobStatus::GeneratingSlides => self.run_slides(job, cancel, progress).await,
            JobStatus::GeneratingAudio => self.run_audio(job, cancel, progress).await,
            JobStatus::ComposingVideo => self.run_compose(job, progress).await,
            other => Err(StageError::fatal(format!("{other} is not an executable stage"))),
        }
    }

    // -- Stage implementations ------------------------------------------------

    async fn run_parsing(&self, job: &Job) -> StageResult<()> {
        let source_key = job
            .artifact_key("source")
            .ok_or_else(|| StageError::fatal("source artifact is missing"))?;
        let source_path = self.store.path(job.id, source_key).map_err(infra)?;

        let doc = self.collab.parser.parse(&source_path, job.file_type).await?;

        let bytes = serde_json::to_vec(&doc)
            .map_err(|e| StageError::fatal(format!("parsed content serialization: {e}")))?;
        self.store.put(job.id, PARSED_KEY, &bytes).map_err(infra)?;

        let conn = lectern_db::pool::get_conn(&self.db).map_err(infra)?;
        jobs::set_parsed_content(&conn, job.id, &doc.text, doc.sections.len() as i64)
            .map_err(infra)?;
        jobs::set_artifact(&conn, job.id, "parsing", &serde_json::json!(PARSED_KEY))
            .map_err(infra)?;
        Ok(())
    }

    async fn run_script(&self, job: &Job) -> StageResult<()> {
        let doc: ParsedDocument = self.read_json(job.id, "parsing", PARSED_KEY)?;

        let title = job
            .original_filename
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&job.original_filename);

        let slides = self
            .collab
            .script
            .generate(&doc, job.style_preset, title)
            .await?;

        let bytes = serde_json::to_vec(&slides)
            .map_err(|e| StageError::fatal(format!("slide script serialization: {e}")))?;
        self.store.put(job.id, SCRIPT_KEY, &bytes).map_err(infra)?;

        let conn = lectern_db::pool::get_conn(&self.db).map_err(infra)?;
        jobs::set_slides(&conn, job.id, &slides).map_err(infra)?;
        jobs::set_artifact(
            &conn,
            job.id,
            "generating_script",
            &serde_json::json!(SCRIPT_KEY),
        )
        .map_err(infra)?;
        Ok(())
    }

    async fn run_slides(
        &self,
        job: &Job,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> StageResult<()> {
        let slides: Vec<SlideRecord> = self.read_json(job.id, "generating_script", SCRIPT_KEY)?;

        self.store.ensure_dir(job.id, SLIDES_DIR).map_err(infra)?;

        let total = slides.len();
        let mut keys = Vec::with_capacity(total);
        for (i, slide) in slides.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(StageError::transient("cancelled"));
            }

            let key = format!("{SLIDES_DIR}/slide_{:03}.png", slide.slide_number);
            let path = self.store.path(job.id, &key).map_err(infra)?;
            self.collab
                .slides
                .render(slide, job.style_preset, &path)
                .await?;
            keys.push(key);

            progress.fraction(
                (i + 1) as f64 / total as f64,
                Some(&format!("Rendered slide {} of {total}", i + 1)),
            );
        }

        let conn = lectern_db::pool::get_conn(&self.db).map_err(infra)?;
        jobs::set_artifact(
            &conn,
            job.id,
            "generating_slides",
            &serde_json::json!(keys),
        )
        .map_err(infra)?;
        Ok(())
    }

    async fn run_audio(
        &self,
        job: &Job,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> StageResult<()> {
        let slides: Vec<SlideRecord> = self.read_json(job.id, "generating_script", SCRIPT_KEY)?;

        self.store.ensure_dir(job.id, AUDIO_DIR).map_err(infra)?;

        let total = slides.len();
        let mut clips = Vec::new();
        for (i, slide) in slides.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(StageError::transient("cancelled"));
            }

            if slide.narration.trim().is_empty() {
                continue;
            }

            let key = format!("{AUDIO_DIR}/clip_{:03}.mp3", slide.slide_number);
            let path = self.store.path(job.id, &key).map_err(infra)?;
            let duration = self
                .collab
                .narration
                .synthesize(&slide.narration, &path)
                .await?;
            clips.push(NarrationClip {
                slide_number: slide.slide_number,
                key,
                duration_secs: duration,
            });

            progress.fraction(
                (i + 1) as f64 / total as f64,
                Some(&format!("Narrated slide {} of {total}", i + 1)),
            );
        }

        // A deck where no slide carried narration still gets a voiced intro,
        // so the composed video is never silent end to end.
        if clips.is_empty() {
            let title = job
                .original_filename
                .rsplit_once('.')
                .map(|(stem, _)| stem)
                .unwrap_or(&job.original_filename);
            let key = format!("{AUDIO_DIR}/clip_001.mp3");
            let path = self.store.path(job.id, &key).map_err(infra)?;
            let text = format!("Welcome to this presentation about {title}.");
            let duration = self.collab.narration.synthesize(&text, &path).await?;
            clips.push(NarrationClip {
                slide_number: 1,
                key,
                duration_secs: duration,
            });
        }

        let bytes = serde_json::to_vec(&clips)
            .map_err(|e| StageError::fatal(format!("clip manifest serialization: {e}")))?;
        self.store
            .put(job.id, AUDIO_MANIFEST_KEY, &bytes)
            .map_err(infra)?;

        let conn = lectern_db::pool::get_conn(&self.db).map_err(infra)?;
        jobs::set_artifact(
            &conn,
            job.id,
            "generating_audio",
            &serde_json::json!(AUDIO_MANIFEST_KEY),
        )
        .map_err(infra)?;
        Ok(())
    }

    async fn run_compose(&self, job: &Job, progress: &ProgressReporter) -> StageResult<()> {
        // Slide images from the render stage.
        let slide_keys: Vec<String> = job
            .artifacts
            .get("generating_slides")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or_else(|| StageError::transient("slide artifact list is missing"))?;

        let mut slide_paths = Vec::with_capacity(slide_keys.len());
        for key in &slide_keys {
            if !self.store.exists(job.id, key) {
                // Invalidate the stage so a retry re-renders.
                self.invalidate_artifact(job.id, "generating_slides")?;
                return Err(StageError::transient(format!(
                    "slide image {key} is missing; retry will re-render"
                )));
            }
            slide_paths.push(self.store.path(job.id, key).map_err(infra)?);
        }

        // Narration clips, aligned with the slide list.
        let clips: Vec<NarrationClip> =
            self.read_json(job.id, "generating_audio", AUDIO_MANIFEST_KEY)?;
        let mut aligned: Vec<Option<(PathBuf, f64)>> = vec![None; slide_paths.len()];
        for clip in &clips {
            let idx = (clip.slide_number as usize).saturating_sub(1);
            if idx < aligned.len() {
                let path = self.store.path(job.id, &clip.key).map_err(infra)?;
                aligned[idx] = Some((path, clip.duration_secs));
            }
        }
        let narrated_secs: f64 = clips.iter().map(|c| c.duration_secs).sum();

        // Optional avatar overlay; failure degrades to the plain slideshow.
        let avatar_path = if job.avatar_option != AvatarOption::None {
            progress.fraction(0.3, Some("Generating presenter overlay"));
            let path = self.store.path(job.id, AVATAR_KEY).map_err(infra)?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| infra(e.into()))?;
            }
            match self
                .collab
                .avatar
                .generate(job.avatar_option, narrated_secs.max(1.0), &path)
                .await
            {
                Ok(()) => Some(path),
                Err(e) => {
                    tracing::warn!(job_id = %job.id, "Avatar generation failed, continuing without overlay: {e}");
                    None
                }
            }
        } else {
            None
        };

        progress.fraction(0.5, Some("Encoding video"));

        let output = self.store.path(job.id, VIDEO_KEY).map_err(infra)?;
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| infra(e.into()))?;
        }

        let duration = self
            .collab
            .composer
            .compose(&slide_paths, &aligned, avatar_path.as_deref(), &output)
            .await?;

        let conn = lectern_db::pool::get_conn(&self.db).map_err(infra)?;
        jobs::set_artifact(
            &conn,
            job.id,
            "composing_video",
            &serde_json::json!(VIDEO_KEY),
        )
        .map_err(infra)?;
        jobs::complete_job(&conn, job.id, VIDEO_KEY, duration.round() as i64).map_err(infra)?;
        Ok(())
    }

    // -- Artifact plumbing ----------------------------------------------------

    /// Read and deserialize a JSON artifact produced by an earlier stage.
    ///
    /// A missing or corrupt artifact invalidates that stage's record entry,
    /// so the next run regenerates it; the current run fails transient.
    fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        job_id: JobId,
        stage: &str,
        key: &str,
    ) -> StageResult<T> {
        let bytes = match self.store.read(job_id, key) {
            Ok(b) => b,
            Err(e) => {
                self.invalidate_artifact(job_id, stage)?;
                return Err(StageError::transient(format!(
                    "artifact {key} unreadable ({e}); retry will regenerate it"
                )));
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(v) => Ok(v),
            Err(e) => {
                self.invalidate_artifact(job_id, stage)?;
                Err(StageError::transient(format!(
                    "artifact {key} corrupt ({e}); retry will regenerate it"
                )))
            }
        }
    }

    fn invalidate_artifact(&self, job_id: JobId, stage: &str) -> StageResult<()> {
        let conn = lectern_db::pool::get_conn(&self.db).map_err(infra)?;
        jobs::remove_artifact(&conn, job_id, stage).map_err(infra)?;
        Ok(())
    }
}
