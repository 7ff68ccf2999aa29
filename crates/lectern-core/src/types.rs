//! Core type definitions for jobs, documents, and slides.
//!
//! This module defines the enums and records that flow through the pipeline:
//! job lifecycle states, user-facing presets, and the artifact payloads
//! handed from one stage to the next. All enums serialize in snake_case to
//! match the wire format expected by polling clients.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a conversion job.
///
/// Transitions follow the fixed pipeline order; `completed` and `failed` are
/// terminal. `failed` is recoverable only via an explicit retry back to
/// `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not yet started.
    Pending,
    /// Extracting text and sections from the uploaded document.
    Parsing,
    /// Generating the slide script from the parsed content.
    GeneratingScript,
    /// Rendering slide images.
    GeneratingSlides,
    /// Synthesizing narration audio.
    GeneratingAudio,
    /// Composing the final video.
    ComposingVideo,
    /// Finished successfully.
    Completed,
    /// Stopped on a stage failure or cancellation.
    Failed,
}

impl JobStatus {
    /// Whether no further stage execution will occur without an explicit retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the job is mid-pipeline (neither pending nor terminal).
    pub fn is_processing(&self) -> bool {
        !matches!(self, Self::Pending | Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Parsing => "parsing",
            Self::GeneratingScript => "generating_script",
            Self::GeneratingSlides => "generating_slides",
            Self::GeneratingAudio => "generating_audio",
            Self::ComposingVideo => "composing_video",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for JobStatus {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "parsing" => Ok(Self::Parsing),
            "generating_script" => Ok(Self::GeneratingScript),
            "generating_slides" => Ok(Self::GeneratingSlides),
            "generating_audio" => Ok(Self::GeneratingAudio),
            "composing_video" => Ok(Self::ComposingVideo),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

/// Presentation style chosen at upload time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StylePreset {
    /// 5-8 slides, key points only.
    Concise,
    /// 8-12 slides, comprehensive explanations.
    Detailed,
}

impl Default for StylePreset {
    fn default() -> Self {
        Self::Concise
    }
}

impl fmt::Display for StylePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concise => write!(f, "concise"),
            Self::Detailed => write!(f, "detailed"),
        }
    }
}

impl FromStr for StylePreset {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "concise" => Ok(Self::Concise),
            "detailed" => Ok(Self::Detailed),
            _ => Err(()),
        }
    }
}

/// Presenter avatar overlay chosen at upload time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AvatarOption {
    /// No overlay; plain slideshow video.
    None,
    /// Stylized vector presenter.
    Svg,
    /// Photorealistic presenter.
    Realistic,
}

impl Default for AvatarOption {
    fn default() -> Self {
        Self::Svg
    }
}

impl fmt::Display for AvatarOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Svg => write!(f, "svg"),
            Self::Realistic => write!(f, "realistic"),
        }
    }
}

impl FromStr for AvatarOption {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "svg" => Ok(Self::Svg),
            "realistic" => Ok(Self::Realistic),
            _ => Err(()),
        }
    }
}

/// Declared type of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Docx,
    Pptx,
    Latex,
    Text,
}

impl FileType {
    /// Determine the file type from an uploaded filename's extension.
    ///
    /// Returns `None` for unsupported extensions; the upload handler rejects
    /// those synchronously.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = filename.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase())?;
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" | "doc" => Some(Self::Docx),
            "pptx" | "ppt" => Some(Self::Pptx),
            "zip" | "tex" => Some(Self::Latex),
            "txt" | "md" => Some(Self::Text),
            _ => None,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pdf => write!(f, "pdf"),
            Self::Docx => write!(f, "docx"),
            Self::Pptx => write!(f, "pptx"),
            Self::Latex => write!(f, "latex"),
            Self::Text => write!(f, "text"),
        }
    }
}

impl FromStr for FileType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "pptx" => Ok(Self::Pptx),
            "latex" => Ok(Self::Latex),
            "text" => Ok(Self::Text),
            _ => Err(()),
        }
    }
}

/// A titled section extracted from the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub content: String,
}

/// Structured content extracted by the parse stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedDocument {
    /// Full extracted text.
    pub text: String,
    /// Detected sections, in document order. May be empty for unstructured
    /// documents; downstream consumers fall back to `text`.
    pub sections: Vec<Section>,
}

/// One slide of the generated presentation script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SlideRecord {
    /// 1-based position in the deck.
    pub slide_number: u32,
    pub title: String,
    /// Bullet points shown on the slide.
    pub bullets: Vec<String>,
    /// Text spoken over this slide.
    pub narration: String,
    #[serde(default)]
    pub speaker_notes: String,
}

/// A synthesized narration clip for one slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationClip {
    /// Slide the clip narrates.
    pub slide_number: u32,
    /// Artifact key of the audio file, relative to the job's artifact root.
    pub key: String,
    /// Measured duration in seconds.
    pub duration_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for s in [
            JobStatus::Pending,
            JobStatus::Parsing,
            JobStatus::GeneratingScript,
            JobStatus::GeneratingSlides,
            JobStatus::GeneratingAudio,
            JobStatus::ComposingVideo,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(s.to_string().parse::<JobStatus>(), Ok(s));
        }
        assert!("bogus".parse::<JobStatus>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::ComposingVideo.is_terminal());
    }

    #[test]
    fn processing_states() {
        assert!(!JobStatus::Pending.is_processing());
        assert!(!JobStatus::Completed.is_processing());
        assert!(JobStatus::Parsing.is_processing());
        assert!(JobStatus::GeneratingAudio.is_processing());
    }

    #[test]
    fn file_type_from_filename() {
        assert_eq!(FileType::from_filename("paper.pdf"), Some(FileType::Pdf));
        assert_eq!(FileType::from_filename("Thesis.DOCX"), Some(FileType::Docx));
        assert_eq!(FileType::from_filename("deck.ppt"), Some(FileType::Pptx));
        assert_eq!(FileType::from_filename("src.tex"), Some(FileType::Latex));
        assert_eq!(FileType::from_filename("notes.md"), Some(FileType::Text));
        assert_eq!(FileType::from_filename("archive.rar"), None);
        assert_eq!(FileType::from_filename("no-extension"), None);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::GeneratingScript).unwrap();
        assert_eq!(json, "\"generating_script\"");
    }

    #[test]
    fn slide_record_serde() {
        let slide = SlideRecord {
            slide_number: 1,
            title: "Introduction".into(),
            bullets: vec!["First point".into(), "Second point".into()],
            narration: "Welcome to the talk.".into(),
            speaker_notes: String::new(),
        };
        let json = serde_json::to_string(&slide).unwrap();
        let back: SlideRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, slide);
    }

    #[test]
    fn slide_record_speaker_notes_default() {
        let json = r#"{"slide_number":2,"title":"T","bullets":[],"narration":"n"}"#;
        let slide: SlideRecord = serde_json::from_str(json).unwrap();
        assert_eq!(slide.speaker_notes, "");
    }

    #[test]
    fn preset_defaults() {
        assert_eq!(StylePreset::default(), StylePreset::Concise);
        assert_eq!(AvatarOption::default(), AvatarOption::Svg);
    }
}
