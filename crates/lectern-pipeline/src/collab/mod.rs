//! Collaborator capability interfaces.
//!
//! Each external dependency of the pipeline is modeled as a one-method
//! trait, so the orchestrator depends only on the interface and tests can
//! substitute fakes. Production adapters live in the submodules; every
//! adapter maps its failures onto the Transient/Fatal taxonomy in
//! [`crate::stage`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use lectern_core::{
    AvatarOption, FileType, ParsedDocument, SlideRecord, StylePreset,
};

use crate::stage::StageResult;

pub mod avatar;
pub mod compose;
pub mod parser;
pub mod script;
pub mod slides;
pub mod tts;

/// Extracts structured text from an uploaded document.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parse the file at `source` according to its declared type.
    async fn parse(&self, source: &Path, file_type: FileType) -> StageResult<ParsedDocument>;
}

/// Produces the slide script from parsed content.
#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    /// Generate an ordered slide deck for `doc`, shaped by the style preset.
    async fn generate(
        &self,
        doc: &ParsedDocument,
        style: StylePreset,
        title: &str,
    ) -> StageResult<Vec<SlideRecord>>;
}

/// Renders one slide record to an image file.
#[async_trait]
pub trait SlideRenderer: Send + Sync {
    /// Render `slide` as a PNG at `output`.
    async fn render(
        &self,
        slide: &SlideRecord,
        style: StylePreset,
        output: &Path,
    ) -> StageResult<()>;
}

/// Synthesizes narration audio for one slide.
#[async_trait]
pub trait NarrationSynthesizer: Send + Sync {
    /// Write spoken audio for `text` to `output` and return its duration in
    /// seconds.
    async fn synthesize(&self, text: &str, output: &Path) -> StageResult<f64>;
}

/// Produces the presenter overlay clip.
#[async_trait]
pub trait AvatarGenerator: Send + Sync {
    /// Write an overlay clip of `duration_secs` to `output`. Never called
    /// with [`AvatarOption::None`].
    async fn generate(
        &self,
        option: AvatarOption,
        duration_secs: f64,
        output: &Path,
    ) -> StageResult<()>;
}

/// Assembles the final video.
#[async_trait]
pub trait VideoComposer: Send + Sync {
    /// Compose slide images and their narration clips into a video at
    /// `output`, overlaying `avatar` when present. `clips` is aligned with
    /// `slides`; `None` entries are silent slides. Returns the measured
    /// duration in seconds.
    async fn compose(
        &self,
        slides: &[PathBuf],
        clips: &[Option<(PathBuf, f64)>],
        avatar: Option<&Path>,
        output: &Path,
    ) -> StageResult<f64>;
}

/// The full set of collaborators the orchestrator executes stages through.
///
/// Cheap to clone; every member is an `Arc`.
#[derive(Clone)]
pub struct Collaborators {
    pub parser: Arc<dyn DocumentParser>,
    pub script: Arc<dyn ScriptGenerator>,
    pub slides: Arc<dyn SlideRenderer>,
    pub narration: Arc<dyn NarrationSynthesizer>,
    pub avatar: Arc<dyn AvatarGenerator>,
    pub composer: Arc<dyn VideoComposer>,
}

impl Collaborators {
    /// Wire up the production adapters from configuration and the tool
    /// registry.
    pub fn production(
        config: &lectern_core::config::Config,
        tools: Arc<crate::tools::ToolRegistry>,
    ) -> Self {
        Self {
            parser: Arc::new(parser::StockDocumentParser::new(tools.clone())),
            script: Arc::new(script::HttpScriptGenerator::new(config.script.clone())),
            slides: Arc::new(slides::MagickSlideRenderer::new(
                tools.clone(),
                config.video.width,
                config.video.height,
            )),
            narration: Arc::new(tts::StockNarrationSynthesizer::new(
                config.tts.clone(),
                tools.clone(),
            )),
            avatar: Arc::new(avatar::FfmpegAvatarGenerator::new(tools.clone())),
            composer: Arc::new(compose::FfmpegVideoComposer::new(
                tools,
                config.video.clone(),
            )),
        }
    }
}
