// Analysis provider boundary: the raw document model and the provider implementations
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::types::{ProviderError, ProviderId};

/// Environment variable carrying the MIME type to command providers.
pub const MIME_TYPE_ENV: &str = "LOANLENS_MIME_TYPE";

/// Character range into the provider's full text.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TextSegment {
    #[serde(default)]
    pub start_index: usize,
    #[serde(default)]
    pub end_index: usize,
}

/// Confidence plus the text spans an element covers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Layout {
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub text_segments: Vec<TextSegment>,
}

impl Layout {
    /// Concatenate the referenced spans of `full_text`. Out-of-range spans are clipped.
    pub fn resolve_text(&self, full_text: &str) -> String {
        let mut text = String::new();
        for segment in &self.text_segments {
            if segment.end_index <= segment.start_index {
                continue;
            }
            text.extend(
                full_text
                    .chars()
                    .skip(segment.start_index)
                    .take(segment.end_index - segment.start_index),
            );
        }
        text
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageDimension {
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    #[serde(default = "default_unit")]
    pub unit: String,
}

fn default_unit() -> String { "pixels".to_string() }

impl Default for PageDimension {
    fn default() -> Self {
        Self { width: 0.0, height: 0.0, unit: default_unit() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFormField {
    #[serde(default)]
    pub field_name: Layout,
    #[serde(default)]
    pub field_value: Layout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTableCell {
    #[serde(default)]
    pub layout: Layout,
    #[serde(default = "default_span")]
    pub row_span: u32,
    #[serde(default = "default_span")]
    pub col_span: u32,
}

fn default_span() -> u32 { 1 }

impl RawTableCell {
    pub fn is_spanning(&self) -> bool {
        self.row_span > 1 || self.col_span > 1
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTableRow {
    #[serde(default)]
    pub cells: Vec<RawTableCell>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTable {
    #[serde(default)]
    pub header_rows: Vec<RawTableRow>,
    #[serde(default)]
    pub body_rows: Vec<RawTableRow>,
}

impl RawTable {
    pub fn cells(&self) -> impl Iterator<Item = &RawTableCell> {
        self.header_rows
            .iter()
            .chain(self.body_rows.iter())
            .flat_map(|row| row.cells.iter())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPage {
    /// 1-based; pages without a number are numbered by position.
    #[serde(default)]
    pub page_number: Option<usize>,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub dimension: Option<PageDimension>,
    #[serde(default)]
    pub blocks: Vec<Layout>,
    #[serde(default)]
    pub paragraphs: Vec<Layout>,
    #[serde(default)]
    pub lines: Vec<Layout>,
    #[serde(default)]
    pub tokens: Vec<Layout>,
    #[serde(default)]
    pub form_fields: Vec<RawFormField>,
    #[serde(default)]
    pub tables: Vec<RawTable>,
}

/// One provider's output for a single invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawProviderDocument {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub pages: Vec<RawPage>,
}

impl RawProviderDocument {
    /// True when the provider answered but produced nothing to merge.
    pub fn is_unusable(&self) -> bool {
        self.text.trim().is_empty() && self.pages.is_empty()
    }

    /// Pages paired with their 1-based page number.
    pub fn numbered_pages(&self) -> impl Iterator<Item = (usize, &RawPage)> {
        self.pages
            .iter()
            .enumerate()
            .map(|(idx, page)| (page.page_number.unwrap_or(idx + 1), page))
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Layout> {
        self.pages.iter().flat_map(|page| page.tokens.iter())
    }

    pub fn lines(&self) -> impl Iterator<Item = &Layout> {
        self.pages.iter().flat_map(|page| page.lines.iter())
    }
}

/// An external document-analysis service.
///
/// Implementations must report every failure as a `ProviderError` value; the
/// conductor adds the timeout around each call.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    async fn invoke(
        &self,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<RawProviderDocument, ProviderError>;
}

/// Runs an external command: document bytes on stdin, MIME type in
/// `LOANLENS_MIME_TYPE`, a JSON `RawProviderDocument` expected on stdout.
/// The child is killed if the invocation future is dropped.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    id: ProviderId,
    command: String,
    args: Vec<String>,
}

impl CommandProvider {
    pub fn new(id: ProviderId, command: impl Into<String>, args: Vec<String>) -> Self {
        Self { id, command: command.into(), args }
    }
}

#[async_trait]
impl AnalysisProvider for CommandProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn invoke(
        &self,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<RawProviderDocument, ProviderError> {
        let invocation_error = |message: String| ProviderError::Invocation {
            provider: self.id,
            message,
        };

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .env(MIME_TYPE_ENV, mime_type)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| invocation_error(format!("cannot start '{}': {}", self.command, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| invocation_error("stdin unavailable".to_string()))?;

        // Feed stdin while draining stdout so large documents cannot deadlock the pipe.
        let feed = async move {
            stdin.write_all(bytes).await?;
            stdin.shutdown().await
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| invocation_error(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(invocation_error(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if let Err(e) = fed {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(invocation_error(format!("writing document: {}", e)));
            }
        }

        serde_json::from_slice(&output.stdout).map_err(|e| ProviderError::Decode {
            provider: self.id,
            message: e.to_string(),
        })
    }
}

/// Serves previously recorded responses from `<dir>/<provider>.json`.
#[derive(Debug, Clone)]
pub struct ReplayProvider {
    id: ProviderId,
    dir: PathBuf,
}

impl ReplayProvider {
    pub fn new(id: ProviderId, dir: impl Into<PathBuf>) -> Self {
        Self { id, dir: dir.into() }
    }

    pub fn response_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.id))
    }
}

#[async_trait]
impl AnalysisProvider for ReplayProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn invoke(
        &self,
        _bytes: &[u8],
        _mime_type: &str,
    ) -> Result<RawProviderDocument, ProviderError> {
        let path = self.response_path();
        let content = tokio::fs::read(&path).await.map_err(|e| ProviderError::Invocation {
            provider: self.id,
            message: format!("no recorded response at {}: {}", path.display(), e),
        })?;
        serde_json::from_slice(&content).map_err(|e| ProviderError::Decode {
            provider: self.id,
            message: e.to_string(),
        })
    }
}
