//! Narration synthesis adapter.
//!
//! Uses a configured HTTP TTS endpoint when available, otherwise falls back
//! to a local speech command (`espeak` or `say`). Clip duration is measured
//! with ffprobe; when ffprobe is unavailable the duration is estimated from
//! the word count at typical speech rate.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use lectern_core::config::TtsConfig;

use crate::command::ToolCommand;
use crate::stage::{StageError, StageResult};
use crate::tools::ToolRegistry;

use super::compose::probe_duration;
use super::NarrationSynthesizer;

/// Words per minute assumed when estimating duration without ffprobe.
const SPEECH_WPM: f64 = 150.0;

/// Production synthesizer: HTTP endpoint with local-command fallback.
pub struct StockNarrationSynthesizer {
    config: TtsConfig,
    tools: Arc<ToolRegistry>,
    client: reqwest::Client,
}

impl StockNarrationSynthesizer {
    pub fn new(config: TtsConfig, tools: Arc<ToolRegistry>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            config,
            tools,
            client,
        }
    }

    async fn synthesize_http(&self, endpoint: &str, text: &str, output: &Path) -> StageResult<()> {
        let mut req = self.client.post(endpoint).json(&serde_json::json!({
            "text": text,
            "voice": self.config.voice,
        }));
        if let Some(ref key) = self.config.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| StageError::transient(format!("tts endpoint unreachable: {e}")))?;

        let status = resp.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(StageError::transient(format!("tts endpoint returned {status}")));
        }
        if !status.is_success() {
            return Err(StageError::fatal(format!("tts endpoint rejected the request: {status}")));
        }

        let audio = resp
            .bytes()
            .await
            .map_err(|e| StageError::transient(format!("tts response truncated: {e}")))?;
        if audio.is_empty() {
            return Err(StageError::transient("tts endpoint returned no audio"));
        }

        tokio::fs::write(output, &audio)
            .await
            .map_err(|e| StageError::transient(format!("cannot write audio clip: {e}")))?;
        Ok(())
    }

    async fn synthesize_local(&self, text: &str, output: &Path) -> StageResult<()> {
        let command = self.config.fallback_command.as_str();
        let tool = self
            .tools
            .require(command)
            .map_err(|e| StageError::fatal(e.to_string()))?
            .path
            .clone();

        let mut cmd = ToolCommand::new(tool);
        match command {
            "say" => {
                cmd.arg("-o").arg(output.to_string_lossy()).arg(text);
            }
            _ => {
                // espeak and compatible synthesizers.
                cmd.arg("-w").arg(output.to_string_lossy()).arg(text);
            }
        }

        cmd.execute()
            .await
            .map_err(|e| StageError::transient(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl NarrationSynthesizer for StockNarrationSynthesizer {
    async fn synthesize(&self, text: &str, output: &Path) -> StageResult<f64> {
        let clean = clean_for_speech(text);
        if clean.is_empty() {
            return Err(StageError::fatal("narration text is empty"));
        }

        match self.config.endpoint.as_deref() {
            Some(endpoint) => self.synthesize_http(endpoint, &clean, output).await?,
            None => self.synthesize_local(&clean, output).await?,
        }

        match probe_duration(&self.tools, output).await {
            Ok(d) => Ok(d),
            Err(e) => {
                tracing::debug!("ffprobe unavailable for clip duration ({e}); estimating");
                Ok(estimate_duration(&clean))
            }
        }
    }
}

/// Strip markup the synthesizer would read aloud and collapse whitespace.
fn clean_for_speech(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !matches!(c, '*' | '#' | '`' | '_' | '~' | '|'))
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Duration estimate from word count at typical narration pace.
fn estimate_duration(text: &str) -> f64 {
    let words = text.split_whitespace().count() as f64;
    (words / SPEECH_WPM * 60.0).max(1.0)
}
