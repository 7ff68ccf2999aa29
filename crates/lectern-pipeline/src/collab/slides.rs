//! Slide rendering adapter.
//!
//! Builds an SVG document for each slide record and rasterizes it to PNG
//! with ImageMagick. The SVG is the narrow contract with the renderer; the
//! rasterizer itself is the external collaborator.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use lectern_core::{SlideRecord, StylePreset};

use crate::command::ToolCommand;
use crate::stage::{StageError, StageResult};
use crate::tools::ToolRegistry;

use super::SlideRenderer;

/// Maximum bullets drawn; decks beyond this are clipped, not failed.
const MAX_BULLETS: usize = 6;

/// Production renderer shelling out to `magick`.
pub struct MagickSlideRenderer {
    tools: Arc<ToolRegistry>,
    width: u32,
    height: u32,
}

impl MagickSlideRenderer {
    pub fn new(tools: Arc<ToolRegistry>, width: u32, height: u32) -> Self {
        Self {
            tools,
            width,
            height,
        }
    }
}

#[async_trait]
impl SlideRenderer for MagickSlideRenderer {
    async fn render(
        &self,
        slide: &SlideRecord,
        style: StylePreset,
        output: &Path,
    ) -> StageResult<()> {
        let magick = self
            .tools
            .require("magick")
            .map_err(|e| StageError::fatal(e.to_string()))?
            .path
            .clone();

        let svg = build_svg(slide, style, self.width, self.height);
        let svg_path = output.with_extension("svg");
        tokio::fs::write(&svg_path, svg)
            .await
            .map_err(|e| StageError::transient(format!("cannot write slide svg: {e}")))?;

        let result = ToolCommand::new(magick)
            .arg(svg_path.to_string_lossy())
            .arg(output.to_string_lossy())
            .execute()
            .await;

        let _ = tokio::fs::remove_file(&svg_path).await;

        result.map_err(|e| StageError::transient(e.to_string()))?;
        Ok(())
    }
}

/// Render a slide record as a 16:9 SVG document.
fn build_svg(slide: &SlideRecord, style: StylePreset, width: u32, height: u32) -> String {
    // Dark header band for the concise look, lighter canvas for detailed.
    let (canvas, band, title_fill, bullet_fill) = match style {
        StylePreset::Concise => ("#0f172a", "#1e293b", "#f8fafc", "#cbd5e1"),
        StylePreset::Detailed => ("#f8fafc", "#e2e8f0", "#0f172a", "#334155"),
    };

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">
<rect width="{width}" height="{height}" fill="{canvas}"/>
<rect width="{width}" height="{band_h}" fill="{band}"/>
<text x="60" y="{title_y}" font-family="Helvetica, Arial, sans-serif" font-size="52" font-weight="bold" fill="{title_fill}">{title}</text>
"#,
        band_h = height / 5,
        title_y = height / 8,
        title = xml_escape(&slide.title),
    );

    let bullet_start = height / 5 + 70;
    let bullet_step = 64;
    for (i, bullet) in slide.bullets.iter().take(MAX_BULLETS).enumerate() {
        let y = bullet_start + (i as u32) * bullet_step;
        svg.push_str(&format!(
            r#"<circle cx="72" cy="{cy}" r="6" fill="{bullet_fill}"/>
<text x="96" y="{ty}" font-family="Helvetica, Arial, sans-serif" font-size="34" fill="{bullet_fill}">{text}</text>
"#,
            cy = y - 10,
            ty = y,
            text = xml_escape(bullet),
        ));
    }

    svg.push_str(&format!(
        r#"<text x="{x}" y="{y}" font-family="Helvetica, Arial, sans-serif" font-size="22" fill="{bullet_fill}">{n}</text>
</svg>
"#,
        x = width - 80,
        y = height - 36,
        n = slide.slide_number,
    ));

    svg
}

fn xml_escape(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '&' => "&amp;".to_string(),
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&apos;".to_string(),
            _ => c.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slide() -> SlideRecord {
        SlideRecord {
            slide_number: 3,
            title: "Results & Analysis".into(),
            bullets: vec!["Error < 5%".into(), "Fast".into()],
            narration: "unused here".into(),
            speaker_notes: String::new(),
        }
    }

    #[test]
    fn svg_escapes_markup() {
        let svg = build_svg(&slide(), StylePreset::Concise, 1280, 720);
        assert!(svg.contains("Results &amp; Analysis"));
        assert!(svg.contains("Error &lt; 5%"));
        assert!(!svg.contains("Results & Analysis"));
    }

    #[test]
    fn svg_has_expected_dimensions_and_number() {
        let svg = build_svg(&slide(), StylePreset::Detailed, 1920, 1080);
        assert!(svg.contains(r#"width="1920" height="1080""#));
        assert!(svg.contains(">3</text>"));
    }

    #[test]
    fn bullets_are_clipped() {
        let mut s = slide();
        s.bullets = (0..10).map(|i| format!("bullet {i}")).collect();
        let svg = build_svg(&s, StylePreset::Concise, 1280, 720);
        assert!(svg.contains("bullet 5"));
        assert!(!svg.contains("bullet 6"));
    }

    #[test]
    fn xml_escape_all_specials() {
        assert_eq!(xml_escape(r#"<a href="x">&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&amp;&apos;&lt;/a&gt;");
    }
}
