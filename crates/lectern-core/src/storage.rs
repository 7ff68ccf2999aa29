//! Job-scoped artifact storage.
//!
//! Every job owns one directory under the store's base directory, keyed by
//! its [`JobId`]. Stage outputs are written under relative keys like
//! `slides/slide_001.png` or `video/presentation.mp4`. The store has no
//! logic beyond put/get/delete; durability and hand-off ordering are the
//! orchestrator's concern.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::ids::JobId;

/// Artifact key of the uploaded source document (filename appended).
pub const SOURCE_DIR: &str = "source";
/// Artifact key of the parsed-content JSON.
pub const PARSED_KEY: &str = "parsed/content.json";
/// Artifact key of the slide-script JSON.
pub const SCRIPT_KEY: &str = "script/slides.json";
/// Directory of rendered slide images.
pub const SLIDES_DIR: &str = "slides";
/// Directory of narration clips plus the manifest JSON.
pub const AUDIO_DIR: &str = "audio";
/// Artifact key of the narration manifest.
pub const AUDIO_MANIFEST_KEY: &str = "audio/clips.json";
/// Artifact key of the avatar overlay clip.
pub const AVATAR_KEY: &str = "avatar/overlay.mp4";
/// Artifact key of the final video.
pub const VIDEO_KEY: &str = "video/presentation.mp4";

/// Filesystem store for job artifacts.
///
/// Artifacts are organized under `{base_dir}/{job_id}/{key}`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    base_dir: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `base_dir`. The directory is created lazily
    /// on first write.
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// The directory holding all artifacts of one job.
    pub fn job_dir(&self, job_id: JobId) -> PathBuf {
        self.base_dir.join(job_id.to_string())
    }

    /// Absolute path of an artifact, whether or not it exists.
    pub fn path(&self, job_id: JobId, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.job_dir(job_id).join(key))
    }

    /// Whether an artifact exists on disk.
    pub fn exists(&self, job_id: JobId, key: &str) -> bool {
        match self.path(job_id, key) {
            Ok(p) => p.exists(),
            Err(_) => false,
        }
    }

    /// Write an artifact, creating parent directories as needed.
    ///
    /// Returns the absolute path of the written file.
    pub fn put(&self, job_id: JobId, key: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.path(job_id, key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, data)?;
        Ok(path)
    }

    /// Read an artifact's contents.
    pub fn read(&self, job_id: JobId, key: &str) -> Result<Vec<u8>> {
        let path = self.path(job_id, key)?;
        std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::not_found("artifact", key),
            _ => Error::from(e),
        })
    }

    /// Create (if needed) and return a subdirectory of the job's artifact
    /// directory, for stages that write many files (slides, audio clips).
    pub fn ensure_dir(&self, job_id: JobId, subdir: &str) -> Result<PathBuf> {
        validate_key(subdir)?;
        let dir = self.job_dir(job_id).join(subdir);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Remove a single artifact file or subdirectory. Missing entries are
    /// not an error (removal must be idempotent for cancellation cleanup).
    pub fn remove(&self, job_id: JobId, key: &str) -> Result<()> {
        let path = self.path(job_id, key)?;
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(&path)?,
            Ok(_) => std::fs::remove_file(&path)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Remove the entire artifact directory for a job.
    pub fn delete_job(&self, job_id: JobId) -> Result<()> {
        let dir = self.job_dir(job_id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reject keys that would escape the job directory.
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::Validation("artifact key is empty".into()));
    }
    let path = Path::new(key);
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(Error::Validation(format!(
            "artifact key escapes the job directory: {key}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ArtifactStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().to_path_buf());
        (tmp, store)
    }

    #[test]
    fn put_read_roundtrip() {
        let (_tmp, store) = store();
        let job_id = JobId::new();

        let path = store.put(job_id, PARSED_KEY, b"{\"text\":\"hi\"}").unwrap();
        assert!(path.exists());
        assert!(store.exists(job_id, PARSED_KEY));

        let data = store.read(job_id, PARSED_KEY).unwrap();
        assert_eq!(data, b"{\"text\":\"hi\"}");
    }

    #[test]
    fn read_missing_is_not_found() {
        let (_tmp, store) = store();
        let err = store.read(JobId::new(), VIDEO_KEY).unwrap_err();
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn remove_is_idempotent() {
        let (_tmp, store) = store();
        let job_id = JobId::new();

        store.put(job_id, "audio/clip_001.mp3", b"mp3").unwrap();
        store.remove(job_id, "audio/clip_001.mp3").unwrap();
        assert!(!store.exists(job_id, "audio/clip_001.mp3"));
        // Second removal of the same key succeeds too.
        store.remove(job_id, "audio/clip_001.mp3").unwrap();
    }

    #[test]
    fn remove_directory() {
        let (_tmp, store) = store();
        let job_id = JobId::new();

        store.put(job_id, "slides/slide_001.png", b"png").unwrap();
        store.put(job_id, "slides/slide_002.png", b"png").unwrap();
        store.remove(job_id, SLIDES_DIR).unwrap();
        assert!(!store.exists(job_id, "slides/slide_001.png"));
    }

    #[test]
    fn delete_job_removes_everything() {
        let (_tmp, store) = store();
        let job_id = JobId::new();

        store.put(job_id, PARSED_KEY, b"a").unwrap();
        store.put(job_id, VIDEO_KEY, b"b").unwrap();
        store.delete_job(job_id).unwrap();
        assert!(!store.job_dir(job_id).exists());

        // Deleting a job with no artifacts is fine.
        store.delete_job(JobId::new()).unwrap();
    }

    #[test]
    fn traversal_keys_rejected() {
        let (_tmp, store) = store();
        let job_id = JobId::new();

        assert!(store.put(job_id, "../outside.txt", b"x").is_err());
        assert!(store.put(job_id, "/etc/passwd", b"x").is_err());
        assert!(store.put(job_id, "", b"x").is_err());
    }

    #[test]
    fn jobs_are_isolated() {
        let (_tmp, store) = store();
        let a = JobId::new();
        let b = JobId::new();

        store.put(a, PARSED_KEY, b"a").unwrap();
        assert!(!store.exists(b, PARSED_KEY));

        store.delete_job(a).unwrap();
        assert!(!store.exists(a, PARSED_KEY));
    }
}
