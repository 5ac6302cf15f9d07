// End-to-end loan document processing: quick scan, routing, aggregation, scoring, masking
use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{megabytes, PipelineConfig};
use crate::extraction::accuracy::{self, AccuracyMetrics};
use crate::extraction::numbers::ExtractedNumber;
use crate::extraction::provider::{AnalysisProvider, CommandProvider, ReplayProvider};
use crate::extraction::unified::{CompleteText, FormField, PageBreakdown, TableExtraction, TextElement};
use crate::extraction::{
    Aggregation, DocumentAnalyzer, DocumentCharacteristics, ExtractionConductor, ExtractionRouter,
    LinguaIdentifier, ProviderSelection,
};
use crate::masking::{DataMasker, MaskingManifest};
use crate::types::{LoanlensError, ProviderId, Result};

pub const EXTRACTION_METHOD: &str = "smart_multi_processor";

/// Optional narrative summary of the merged text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Complete,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub characteristics: DocumentCharacteristics,
    pub processors_selected: Vec<ProviderId>,
    pub selection_reason: String,
    pub mime_type: String,
}

/// The output record for one document. Masked and unmasked views share this schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub document_name: String,
    pub extraction_method: String,
    pub extraction_status: ExtractionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processors_used: Vec<ProviderId>,
    pub complete_text: CompleteText,
    pub all_text_elements: Vec<TextElement>,
    pub all_numbers: Vec<ExtractedNumber>,
    pub all_form_fields: Vec<FormField>,
    pub all_tables: Vec<TableExtraction>,
    pub accuracy_metrics: AccuracyMetrics,
    pub pages: Vec<PageBreakdown>,
    pub processing_metadata: ProcessingMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MaskedPair {
    pub masked: Value,
    pub unmasked: Value,
    pub manifest: MaskingManifest,
}

#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub record: ExtractionRecord,
    pub views: MaskedPair,
}

pub struct LoanDocumentPipeline {
    conductor: ExtractionConductor,
    analyzer: DocumentAnalyzer,
    masker: DataMasker,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl LoanDocumentPipeline {
    pub fn new(conductor: ExtractionConductor, analyzer: DocumentAnalyzer, masker: DataMasker) -> Self {
        Self { conductor, analyzer, masker, summarizer: None }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Wire providers from the config file, or replay recorded responses from `replay_dir`.
    pub fn from_config(config: &PipelineConfig, replay_dir: Option<&Path>) -> anyhow::Result<Self> {
        let mut conductor = ExtractionConductor::new(config.provider_timeout());

        match replay_dir {
            Some(dir) => {
                for id in ProviderId::ALL {
                    conductor.register(Arc::new(ReplayProvider::new(id, dir)));
                }
            }
            None => {
                let commands = config
                    .provider_commands()
                    .context("invalid [providers] table")?;
                if commands.is_empty() {
                    bail!("no analysis providers configured; add [providers.<name>] tables or pass --replay");
                }
                for (id, command) in commands {
                    let provider: Arc<dyn AnalysisProvider> =
                        Arc::new(CommandProvider::new(id, command.command.clone(), command.args.clone()));
                    conductor.register(provider);
                }
            }
        }

        let analyzer = DocumentAnalyzer::new(Arc::new(LinguaIdentifier::new()));
        let masker = DataMasker::new(config.mask_level).with_policy(config.masking_failure);
        Ok(Self::new(conductor, analyzer, masker))
    }

    pub fn masker(&self) -> &DataMasker {
        &self.masker
    }

    /// Quick scan, characteristic detection and provider selection.
    pub async fn analyze(&self, bytes: &[u8], mime_type: &str) -> (DocumentCharacteristics, ProviderSelection) {
        let scan = self.conductor.quick_scan(bytes, mime_type).await;
        let characteristics = self.analyzer.detect(scan.as_ref());
        let selection = ExtractionRouter::select(&characteristics);
        info!(
            providers = ?selection.providers,
            reason = %selection.rationale,
            "providers selected"
        );
        (characteristics, selection)
    }

    pub async fn process(&self, name: &str, bytes: &[u8], mime_type: &str) -> Result<ProcessedDocument> {
        info!(document = name, mime_type, "processing document");
        let (characteristics, selection) = self.analyze(bytes, mime_type).await;

        let Aggregation { unified, provider_results } = self
            .conductor
            .aggregate(bytes, mime_type, &selection.providers, &characteristics)
            .await;
        let metrics = accuracy::score(&provider_results, &unified);
        // Raw provider documents are only needed for scoring.
        drop(provider_results);

        let status = if unified.extraction_failed {
            ExtractionStatus::Failed
        } else {
            ExtractionStatus::Complete
        };

        let summary = match (&self.summarizer, status) {
            (Some(summarizer), ExtractionStatus::Complete) => {
                match summarizer.summarize(&unified.complete_text.merged_text).await {
                    Ok(summary) => Some(summary),
                    Err(e) => {
                        warn!(error = %e, "summary unavailable");
                        None
                    }
                }
            }
            _ => None,
        };

        let record = ExtractionRecord {
            document_name: name.to_string(),
            extraction_method: EXTRACTION_METHOD.to_string(),
            extraction_status: status,
            error: unified.failure,
            processors_used: unified.processors_used,
            complete_text: unified.complete_text,
            all_text_elements: unified.all_text_elements,
            all_numbers: unified.all_numbers,
            all_form_fields: unified.all_form_fields,
            all_tables: unified.all_tables,
            accuracy_metrics: metrics,
            pages: unified.pages,
            processing_metadata: ProcessingMetadata {
                characteristics,
                processors_selected: selection.providers,
                selection_reason: selection.rationale,
                mime_type: mime_type.to_string(),
            },
            summary,
            processed_at: Utc::now(),
        };

        info!(
            document = name,
            status = ?record.extraction_status,
            processors = record.processors_used.len(),
            overall_accuracy = record.accuracy_metrics.overall_accuracy,
            "document processed"
        );

        let views = self.views(&record)?;
        Ok(ProcessedDocument { record, views })
    }

    /// Masked and unmasked renderings of the same record.
    pub fn views(&self, record: &ExtractionRecord) -> Result<MaskedPair> {
        let unmasked = serde_json::to_value(record)?;
        let outcome = self.masker.mask(&unmasked);
        Ok(MaskedPair { masked: outcome.record, unmasked, manifest: outcome.manifest })
    }
}

/// Reject inputs above the configured ceiling before any provider sees them.
pub fn check_file_size(name: &str, size_bytes: u64, limit_mb: u64) -> Result<()> {
    if size_bytes > megabytes(limit_mb) {
        return Err(LoanlensError::FileTooLarge {
            name: name.to_string(),
            size_mb: size_bytes as f64 / (1024.0 * 1024.0),
            limit_mb,
        });
    }
    Ok(())
}

pub fn mime_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("tif" | "tiff") => "image/tiff",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        _ => "application/pdf",
    }
}
