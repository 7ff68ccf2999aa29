//! Video composition adapter.
//!
//! Builds one still-image segment per slide (paired with its narration
//! clip), concatenates the segments, and optionally overlays the avatar
//! clip in the bottom-right corner. The final duration is measured with
//! ffprobe.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use lectern_core::config::VideoConfig;

use crate::command::ToolCommand;
use crate::stage::{StageError, StageResult};
use crate::tools::ToolRegistry;

use super::VideoComposer;

/// Seconds a slide stays on screen when it has no narration clip.
const SILENT_SLIDE_SECS: f64 = 4.0;

/// Production composer shelling out to ffmpeg.
pub struct FfmpegVideoComposer {
    tools: Arc<ToolRegistry>,
    video: VideoConfig,
}

impl FfmpegVideoComposer {
    pub fn new(tools: Arc<ToolRegistry>, video: VideoConfig) -> Self {
        Self { tools, video }
    }

    fn ffmpeg(&self) -> StageResult<PathBuf> {
        self.tools
            .require("ffmpeg")
            .map(|t| t.path.clone())
            .map_err(|e| StageError::fatal(e.to_string()))
    }

    /// Encode one slide (with or without narration) into a segment.
    async fn encode_segment(
        &self,
        slide: &Path,
        clip: Option<&Path>,
        segment: &Path,
    ) -> StageResult<()> {
        let ffmpeg = self.ffmpeg()?;
        let scale = format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
            w = self.video.width,
            h = self.video.height,
        );

        let mut cmd = ToolCommand::new(ffmpeg);
        cmd.arg("-y").arg("-loop").arg("1").arg("-i").arg(slide.to_string_lossy());

        match clip {
            Some(clip) => {
                cmd.arg("-i")
                    .arg(clip.to_string_lossy())
                    .arg("-c:a")
                    .arg("aac")
                    .arg("-b:a")
                    .arg("192k")
                    .arg("-shortest");
            }
            None => {
                cmd.arg("-t").arg(format!("{SILENT_SLIDE_SECS}")).arg("-an");
            }
        }

        cmd.arg("-c:v")
            .arg("libx264")
            .arg("-tune")
            .arg("stillimage")
            .arg("-preset")
            .arg(self.video.preset.clone())
            .arg("-r")
            .arg(self.video.fps.to_string())
            .arg("-vf")
            .arg(scale)
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg(segment.to_string_lossy())
            .execute()
            .await
            .map_err(|e| StageError::transient(e.to_string()))?;
        Ok(())
    }

    /// Concatenate segments with the concat demuxer.
    async fn concat_segments(&self, segments: &[PathBuf], output: &Path) -> StageResult<()> {
        let ffmpeg = self.ffmpeg()?;
        let list_path = output.with_extension("txt");
        let list = segments
            .iter()
            .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
            .collect::<String>();
        tokio::fs::write(&list_path, list)
            .await
            .map_err(|e| StageError::transient(format!("cannot write concat list: {e}")))?;

        let result = ToolCommand::new(ffmpeg)
            .arg("-y")
            .arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .arg("-i")
            .arg(list_path.to_string_lossy())
            .arg("-c")
            .arg("copy")
            .arg(output.to_string_lossy())
            .execute()
            .await;

        let _ = tokio::fs::remove_file(&list_path).await;
        result.map_err(|e| StageError::transient(e.to_string()))?;
        Ok(())
    }

    /// Overlay the avatar clip in the bottom-right corner.
    async fn overlay_avatar(
        &self,
        base: &Path,
        avatar: &Path,
        output: &Path,
    ) -> StageResult<()> {
        let ffmpeg = self.ffmpeg()?;
        let overlay_w = (self.video.width as f64 * self.video.avatar_scale) as u32;
        let filter = format!(
            "[1:v]scale={overlay_w}:-1[pip];[0:v][pip]overlay=W-w-24:H-h-24:shortest=0"
        );

        ToolCommand::new(ffmpeg)
            .arg("-y")
            .arg("-i")
            .arg(base.to_string_lossy())
            .arg("-i")
            .arg(avatar.to_string_lossy())
            .arg("-filter_complex")
            .arg(filter)
            .arg("-c:a")
            .arg("copy")
            .arg(output.to_string_lossy())
            .execute()
            .await
            .map_err(|e| StageError::transient(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl VideoComposer for FfmpegVideoComposer {
    async fn compose(
        &self,
        slides: &[PathBuf],
        clips: &[Option<(PathBuf, f64)>],
        avatar: Option<&Path>,
        output: &Path,
    ) -> StageResult<f64> {
        if slides.is_empty() {
            return Err(StageError::fatal("no slide images to compose"));
        }

        let work_dir = output
            .parent()
            .ok_or_else(|| StageError::fatal("output path has no parent directory"))?
            .join("segments");
        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(|e| StageError::transient(format!("cannot create segment dir: {e}")))?;

        let mut segments = Vec::with_capacity(slides.len());
        for (i, slide) in slides.iter().enumerate() {
            let segment = work_dir.join(format!("segment_{:03}.mp4", i + 1));
            let clip = clips
                .get(i)
                .and_then(|c| c.as_ref())
                .map(|(p, _)| p.as_path());
            self.encode_segment(slide, clip, &segment).await?;
            segments.push(segment);
        }

        let result = match avatar {
            Some(avatar) => {
                let merged = work_dir.join("merged.mp4");
                self.concat_segments(&segments, &merged).await?;
                self.overlay_avatar(&merged, avatar, output).await
            }
            None => self.concat_segments(&segments, output).await,
        };

        let _ = tokio::fs::remove_dir_all(&work_dir).await;
        result?;

        match probe_duration(&self.tools, output).await {
            Ok(d) => Ok(d),
            Err(e) => {
                tracing::debug!("ffprobe unavailable for video duration ({e}); summing clips");
                let voiced: f64 = clips.iter().flatten().map(|(_, d)| d).sum();
                let silent =
                    clips.iter().filter(|c| c.is_none()).count() as f64 * SILENT_SLIDE_SECS;
                Ok((voiced + silent).max(SILENT_SLIDE_SECS))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format: ProbeFormatInner,
}

#[derive(Debug, Deserialize)]
struct ProbeFormatInner {
    duration: String,
}

/// Measure a media file's duration in seconds with ffprobe.
pub(crate) async fn probe_duration(
    tools: &ToolRegistry,
    path: &Path,
) -> lectern_core::Result<f64> {
    let ffprobe = tools.require("ffprobe")?.path.clone();
    let output = ToolCommand::new(ffprobe)
        .arg("-v")
        .arg("quiet")
        .arg("-show_entries")
        .arg("format=duration")
        .arg("-of")
        .arg("json")
        .arg(path.to_string_lossy())
        .execute()
        .await?;

    let parsed: ProbeFormat = serde_json::from_str(&output.stdout)
        .map_err(|e| lectern_core::Error::tool("ffprobe", format!("unparseable output: {e}")))?;
    parsed
        .format
        .duration
        .parse::<f64>()
        .map_err(|e| lectern_core::Error::tool("ffprobe", format!("bad duration: {e}")))
}
