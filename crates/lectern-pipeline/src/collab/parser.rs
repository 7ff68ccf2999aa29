//! Document parsing adapter.
//!
//! Plain text and markdown are read natively; PDF goes through `pdftotext`,
//! DOCX and LaTeX through `pandoc`, and PPTX through a headless LibreOffice
//! conversion. The extraction tools are the collaborator here; this adapter
//! only shells out and sectionizes their output.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use lectern_core::{FileType, ParsedDocument, Section};

use crate::command::ToolCommand;
use crate::stage::{StageError, StageResult};
use crate::tools::ToolRegistry;

use super::DocumentParser;

/// Production parser backed by external extraction tools.
pub struct StockDocumentParser {
    tools: Arc<ToolRegistry>,
}

impl StockDocumentParser {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    fn require_tool(&self, name: &str) -> StageResult<std::path::PathBuf> {
        self.tools
            .require(name)
            .map(|t| t.path.clone())
            .map_err(|e| StageError::fatal(e.to_string()))
    }

    async fn extract_pdf(&self, source: &Path) -> StageResult<String> {
        let pdftotext = self.require_tool("pdftotext")?;
        let output = ToolCommand::new(pdftotext)
            .arg("-layout")
            .arg(source.to_string_lossy())
            .arg("-")
            .execute()
            .await
            .map_err(classify_extraction)?;
        Ok(output.stdout)
    }

    async fn extract_with_pandoc(&self, source: &Path) -> StageResult<String> {
        let pandoc = self.require_tool("pandoc")?;
        let output = ToolCommand::new(pandoc)
            .arg("-t")
            .arg("plain")
            .arg(source.to_string_lossy())
            .execute()
            .await
            .map_err(classify_extraction)?;
        Ok(output.stdout)
    }

    async fn extract_pptx(&self, source: &Path) -> StageResult<String> {
        let soffice = self.require_tool("soffice")?;
        let out_dir = source
            .parent()
            .ok_or_else(|| StageError::fatal("source file has no parent directory"))?;
        ToolCommand::new(soffice)
            .arg("--headless")
            .arg("--convert-to")
            .arg("txt")
            .arg("--outdir")
            .arg(out_dir.to_string_lossy())
            .arg(source.to_string_lossy())
            .execute()
            .await
            .map_err(classify_extraction)?;

        let txt_path = source.with_extension("txt");
        let text = tokio::fs::read_to_string(&txt_path)
            .await
            .map_err(|e| StageError::fatal(format!("converted text missing: {e}")))?;
        let _ = tokio::fs::remove_file(&txt_path).await;
        Ok(text)
    }
}

#[async_trait]
impl DocumentParser for StockDocumentParser {
    async fn parse(&self, source: &Path, file_type: FileType) -> StageResult<ParsedDocument> {
        let text = match file_type {
            FileType::Text => tokio::fs::read_to_string(source)
                .await
                .map_err(|e| StageError::fatal(format!("cannot read document: {e}")))?,
            FileType::Pdf => self.extract_pdf(source).await?,
            FileType::Docx => self.extract_with_pandoc(source).await?,
            FileType::Latex => {
                if source.extension().is_some_and(|e| e.eq_ignore_ascii_case("zip")) {
                    return Err(StageError::fatal(
                        "LaTeX archives are not supported; upload the main .tex file",
                    ));
                }
                self.extract_with_pandoc(source).await?
            }
            FileType::Pptx => self.extract_pptx(source).await?,
        };

        let text = clean_text(&text);
        if text.trim().is_empty() {
            return Err(StageError::fatal("document contains no extractable text"));
        }

        let sections = sectionize(&text);
        Ok(ParsedDocument { text, sections })
    }
}

/// Tool failures during extraction: a timeout or spawn problem may clear up
/// on retry; a non-zero exit on this input will not.
fn classify_extraction(e: lectern_core::Error) -> StageError {
    let msg = e.to_string();
    if msg.contains("timed out") || msg.contains("failed to spawn") {
        StageError::transient(msg)
    } else {
        StageError::fatal(msg)
    }
}

/// Strip control characters that upset downstream JSON/XML handling.
fn clean_text(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
        .collect()
}

/// Split extracted text into titled sections.
///
/// Markdown headings and short numbered headings ("3. Results") start a new
/// section; everything before the first heading lands in an untitled
/// preamble section.
fn sectionize(text: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current_title = String::new();
    let mut current_body = String::new();

    let flush = |title: &mut String, body: &mut String, out: &mut Vec<Section>| {
        if !body.trim().is_empty() {
            out.push(Section {
                title: std::mem::take(title),
                content: std::mem::take(body).trim().to_string(),
            });
        } else {
            title.clear();
            body.clear();
        }
    };

    for line in text.lines() {
        if let Some(title) = heading_title(line) {
            flush(&mut current_title, &mut current_body, &mut sections);
            current_title = title;
        } else {
            current_body.push_str(line);
            current_body.push('\n');
        }
    }
    flush(&mut current_title, &mut current_body, &mut sections);

    sections
}

/// Recognize a heading line, returning its title text.
fn heading_title(line: &str) -> Option<String> {
    let trimmed = line.trim();

    // Markdown heading.
    if let Some(rest) = trimmed.strip_prefix('#') {
        let title = rest.trim_start_matches('#').trim();
        if !title.is_empty() {
            return Some(title.to_string());
        }
        return None;
    }

    // Numbered heading: "2 Method", "3.1 Results" -- short, no trailing period.
    if trimmed.len() < 80 && !trimmed.ends_with('.') {
        let mut parts = trimmed.splitn(2, ' ');
        let number = parts.next().unwrap_or("");
        let rest = parts.next().unwrap_or("");
        let numeric = !number.is_empty()
            && number
                .chars()
                .all(|c| c.is_ascii_digit() || c == '.');
        if numeric && rest.len() > 2 && rest.chars().next().is_some_and(|c| c.is_uppercase()) {
            return Some(trimmed.to_string());
        }
    }

    None
}
