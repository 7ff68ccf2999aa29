//! LLM-backed slide script generation.
//!
//! Calls a `generateContent`-style JSON endpoint with the parsed document
//! and the style preset, then parses the model's JSON reply into
//! [`SlideRecord`]s. HTTP 429 and 5xx responses are transient; 4xx means
//! the request itself is bad and retrying will not help.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use lectern_core::config::ScriptConfig;
use lectern_core::{ParsedDocument, SlideRecord, StylePreset};

use crate::stage::{StageError, StageResult};

use super::ScriptGenerator;

/// Per-preset prompt shaping, mirroring the product's two deck styles.
struct StyleSpec {
    num_slides: &'static str,
    bullets: &'static str,
    narration: &'static str,
    detail: &'static str,
}

fn style_spec(style: StylePreset) -> StyleSpec {
    match style {
        StylePreset::Concise => StyleSpec {
            num_slides: "5-8",
            bullets: "3-4 per slide",
            narration: "30-45 seconds per slide",
            detail: "high-level overview, key points only",
        },
        StylePreset::Detailed => StyleSpec {
            num_slides: "8-12",
            bullets: "4-6 per slide",
            narration: "45-60 seconds per slide",
            detail: "comprehensive explanation with examples",
        },
    }
}

/// Production script generator talking to a hosted LLM.
pub struct HttpScriptGenerator {
    config: ScriptConfig,
    client: reqwest::Client,
}

impl HttpScriptGenerator {
    pub fn new(config: ScriptConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }
}

#[async_trait]
impl ScriptGenerator for HttpScriptGenerator {
    async fn generate(
        &self,
        doc: &ParsedDocument,
        style: StylePreset,
        title: &str,
    ) -> StageResult<Vec<SlideRecord>> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| StageError::fatal("script.api_key is not configured"))?;

        let prompt = build_prompt(doc, style, title);
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            api_key,
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| StageError::transient(format!("script endpoint unreachable: {e}")))?;

        let status = resp.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(StageError::transient(format!(
                "script endpoint returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(StageError::fatal(format!(
                "script endpoint rejected the request: {status}"
            )));
        }

        let payload: GenerateContentResponse = resp
            .json()
            .await
            .map_err(|e| StageError::transient(format!("malformed script response: {e}")))?;

        let text = payload
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| StageError::transient("script response contained no candidates"))?;

        parse_slides(&text)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// Slide shape the model is asked to emit; renumbered after parsing so a
/// confused model cannot produce duplicate positions.
#[derive(Debug, Deserialize)]
struct RawSlide {
    title: String,
    #[serde(default)]
    bullets: Vec<String>,
    narration: String,
    #[serde(default)]
    speaker_notes: String,
}

// ---------------------------------------------------------------------------
// Prompt / response handling
// ---------------------------------------------------------------------------

fn build_prompt(doc: &ParsedDocument, style: StylePreset, title: &str) -> String {
    let spec = style_spec(style);

    // Prefer sectioned content; fall back to raw text for unstructured docs.
    let mut content = String::new();
    if doc.sections.is_empty() {
        content.push_str(truncate(&doc.text, 10_000));
    } else {
        for section in doc.sections.iter().take(10) {
            content.push_str("\n### ");
            content.push_str(&section.title);
            content.push('\n');
            content.push_str(truncate(&section.content, 2_000));
            content.push('\n');
        }
    }

    format!(
        "You are an expert at creating engaging presentations.\n\
         Create a slide-by-slide script for a presentation titled \"{title}\".\n\
         Produce {num} slides with {bullets} bullet points, narration of \
         {narration}, at a {detail} level of detail.\n\
         Respond with a JSON array only; each element must have the fields \
         \"title\", \"bullets\" (array of strings), \"narration\", and \
         \"speaker_notes\".\n\nDocument content:\n{content}",
        num = spec.num_slides,
        bullets = spec.bullets,
        narration = spec.narration,
        detail = spec.detail,
    )
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Parse the model's reply into slide records.
///
/// Models frequently wrap JSON in markdown fences; strip those first. A
/// reply that does not parse is transient: the same prompt can produce
/// valid output on the next attempt.
fn parse_slides(text: &str) -> StageResult<Vec<SlideRecord>> {
    let stripped = strip_fences(text);

    let raw: Vec<RawSlide> = serde_json::from_str(stripped)
        .map_err(|e| StageError::transient(format!("script is not valid JSON: {e}")))?;

    if raw.is_empty() {
        return Err(StageError::transient("script contained no slides"));
    }

    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(i, s)| SlideRecord {
            slide_number: (i + 1) as u32,
            title: s.title,
            bullets: s.bullets,
            narration: s.narration,
            speaker_notes: s.speaker_notes,
        })
        .collect())
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag after the opening fence.
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches(['\r', '\n'])
        .strip_suffix("```")
        .map(str::trim_end)
        .unwrap_or(rest)
}
