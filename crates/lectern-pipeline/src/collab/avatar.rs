//! Presenter avatar clip generation.
//!
//! Synthesizes the overlay clip with ffmpeg's lavfi sources. The clip is a
//! corner card matching the narration duration; the compose stage overlays
//! it onto the slideshow. Avatar rendering is best-effort: the orchestrator
//! degrades to the plain video when this adapter fails.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use lectern_core::AvatarOption;

use crate::command::ToolCommand;
use crate::stage::{StageError, StageResult};
use crate::tools::ToolRegistry;

use super::AvatarGenerator;

/// Production avatar generator shelling out to ffmpeg.
pub struct FfmpegAvatarGenerator {
    tools: Arc<ToolRegistry>,
}

impl FfmpegAvatarGenerator {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl AvatarGenerator for FfmpegAvatarGenerator {
    async fn generate(
        &self,
        option: AvatarOption,
        duration_secs: f64,
        output: &Path,
    ) -> StageResult<()> {
        if duration_secs <= 0.0 {
            return Err(StageError::fatal("avatar duration must be positive"));
        }

        let ffmpeg = self
            .tools
            .require("ffmpeg")
            .map_err(|e| StageError::fatal(e.to_string()))?
            .path
            .clone();

        let source = lavfi_source(option, duration_secs);
        ToolCommand::new(ffmpeg)
            .arg("-y")
            .arg("-f")
            .arg("lavfi")
            .arg("-i")
            .arg(source)
            .arg("-c:v")
            .arg("libx264")
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg(output.to_string_lossy())
            .execute()
            .await
            .map_err(|e| StageError::transient(e.to_string()))?;

        Ok(())
    }
}

/// The lavfi graph for each avatar style.
fn lavfi_source(option: AvatarOption, duration_secs: f64) -> String {
    match option {
        // Flat presenter card.
        AvatarOption::Svg => format!("color=c=0x1e293b:s=320x320:d={duration_secs:.2}"),
        // Animated gradient stands in for the rendered presenter.
        AvatarOption::Realistic => format!("gradients=s=320x320:d={duration_secs:.2}"),
        AvatarOption::None => unreachable!("avatar generator is skipped for 'none'"),
    }
}
