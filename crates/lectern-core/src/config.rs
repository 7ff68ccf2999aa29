//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for server, storage, pipeline, script generation, narration,
//! and external tools. Every section defaults sensibly so a completely empty
//! `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub script: ScriptConfig,
    pub tts: TtsConfig,
    pub video: VideoConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    ///
    /// This is intentionally string-based so the caller can read the file
    /// however it sees fit (async, embedded, etc.).
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.pipeline.max_concurrent_jobs == 0 {
            warnings.push(
                "pipeline.max_concurrent_jobs is 0; no jobs will ever run".into(),
            );
        }

        if self.script.api_key.is_none() {
            warnings.push(
                "script.api_key is not set; script generation will fail at runtime".into(),
            );
        }

        if self.storage.max_upload_bytes == 0 {
            warnings.push("storage.max_upload_bytes is 0; all uploads will be rejected".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

/// On-disk layout and upload limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for the database and all job artifact directories.
    pub data_dir: PathBuf,
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/data/lectern"),
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

impl StorageConfig {
    /// Path of the SQLite database file under the data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("lectern.db")
    }

    /// Root of all per-job artifact directories.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir.join("jobs")
    }
}

/// Runner pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of jobs executing concurrently.
    pub max_concurrent_jobs: usize,
    /// Bound on queued (submitted but not yet started) runs.
    pub queue_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            queue_depth: 64,
        }
    }
}

/// Script-generation (LLM) endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default = "default_script_timeout")]
    pub timeout_secs: u64,
}

fn default_script_timeout() -> u64 {
    120
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            api_key: None,
            model: "gemini-pro".into(),
            timeout_secs: default_script_timeout(),
        }
    }
}

/// Narration synthesis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// HTTP TTS endpoint. When `None`, the local fallback command is used.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Local command used when no endpoint is configured ("say" or "espeak").
    #[serde(default = "default_fallback_command")]
    pub fallback_command: String,
    #[serde(default = "default_tts_timeout")]
    pub timeout_secs: u64,
}

fn default_voice() -> String {
    "en-US-JennyNeural".into()
}
fn default_fallback_command() -> String {
    "espeak".into()
}
fn default_tts_timeout() -> u64 {
    60
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            voice: default_voice(),
            fallback_command: default_fallback_command(),
            timeout_secs: default_tts_timeout(),
        }
    }
}

/// Video composition defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    #[serde(default = "default_video_preset")]
    pub preset: String,
    /// Scale of the avatar overlay relative to frame width.
    #[serde(default = "default_avatar_scale")]
    pub avatar_scale: f64,
}

fn default_video_preset() -> String {
    "medium".into()
}
fn default_avatar_scale() -> f64 {
    0.2
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            preset: default_video_preset(),
            avatar_scale: default_avatar_scale(),
        }
    }
}

/// Paths to external CLI tools, overriding `PATH` discovery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub magick_path: Option<PathBuf>,
    pub pdftotext_path: Option<PathBuf>,
    pub espeak_path: Option<PathBuf>,
}
