// Conductor pattern - fan the document out to the selected providers, then merge
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::document_analyzer::DocumentCharacteristics;
use super::numbers::extract_numbers;
use super::provider::{AnalysisProvider, Layout, RawPage, RawProviderDocument, RawTable};
use super::unified::{
    CompleteText, ElementKind, FormField, NestedKind, NestedStructure, PageBreakdown, ScoredText,
    TableCell, TableExtraction, TextElement, UnifiedExtraction,
};
use crate::types::{ProviderError, ProviderId};

/// Raw provider outcomes for one document, kept until scoring has read them.
#[derive(Debug, Clone, Default)]
pub struct ProviderResults {
    /// Successful documents in provider priority order.
    pub documents: Vec<(ProviderId, RawProviderDocument)>,
    pub failures: Vec<ProviderError>,
}

impl ProviderResults {
    pub fn get(&self, provider: ProviderId) -> Option<&RawProviderDocument> {
        self.documents
            .iter()
            .find(|(id, _)| *id == provider)
            .map(|(_, doc)| doc)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = ProviderId> + '_ {
        self.documents.iter().map(|(id, _)| *id)
    }

    pub fn last_error_message(&self) -> Option<String> {
        self.failures.last().map(|e| e.to_string())
    }
}

pub struct Aggregation {
    pub unified: UnifiedExtraction,
    pub provider_results: ProviderResults,
}

/// Invokes analysis providers concurrently, each under its own timeout.
pub struct ExtractionConductor {
    providers: BTreeMap<ProviderId, Arc<dyn AnalysisProvider>>,
    timeout: Duration,
}

impl ExtractionConductor {
    pub fn new(timeout: Duration) -> Self {
        Self { providers: BTreeMap::new(), timeout }
    }

    pub fn with_provider(mut self, provider: Arc<dyn AnalysisProvider>) -> Self {
        self.register(provider);
        self
    }

    /// Replaces any provider already registered under the same id.
    pub fn register(&mut self, provider: Arc<dyn AnalysisProvider>) {
        self.providers.insert(provider.id(), provider);
    }

    pub fn registered(&self) -> impl Iterator<Item = ProviderId> + '_ {
        self.providers.keys().copied()
    }

    /// Fast broad-OCR pass feeding characteristic detection. Failures yield `None`.
    pub async fn quick_scan(&self, bytes: &[u8], mime_type: &str) -> Option<RawProviderDocument> {
        match self.invoke(ProviderId::DocOcr, bytes, mime_type).await {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(error = %e, "quick scan failed");
                None
            }
        }
    }

    pub async fn invoke(
        &self,
        provider: ProviderId,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<RawProviderDocument, ProviderError> {
        let handle = self
            .providers
            .get(&provider)
            .ok_or(ProviderError::NotConfigured(provider))?;

        let start = Instant::now();
        let document = match tokio::time::timeout(self.timeout, handle.invoke(bytes, mime_type)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ProviderError::Timeout {
                    provider,
                    after_secs: self.timeout.as_secs(),
                })
            }
        };

        if document.is_unusable() {
            return Err(ProviderError::EmptyDocument(provider));
        }
        info!(
            %provider,
            pages = document.pages.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "provider succeeded"
        );
        Ok(document)
    }

    /// Join every selected provider; one slot failing never cancels its siblings.
    pub async fn collect(
        &self,
        bytes: &[u8],
        mime_type: &str,
        providers: &[ProviderId],
    ) -> ProviderResults {
        let selected: BTreeSet<ProviderId> = providers.iter().copied().collect();
        let calls = selected
            .into_iter()
            .map(|id| async move { (id, self.invoke(id, bytes, mime_type).await) });

        let mut results = ProviderResults::default();
        for (id, outcome) in join_all(calls).await {
            match outcome {
                Ok(document) => results.documents.push((id, document)),
                Err(e) => {
                    warn!(provider = %id, error = %e, "provider unavailable");
                    results.failures.push(e);
                }
            }
        }
        results
    }

    pub async fn aggregate(
        &self,
        bytes: &[u8],
        mime_type: &str,
        providers: &[ProviderId],
        characteristics: &DocumentCharacteristics,
    ) -> Aggregation {
        let provider_results = self.collect(bytes, mime_type, providers).await;
        let unified = merge(&provider_results, characteristics);
        if unified.extraction_failed {
            warn!(
                error = unified.failure.as_deref().unwrap_or_default(),
                "no provider produced a usable document"
            );
        }
        Aggregation { unified, provider_results }
    }
}

/// Merge provider documents into one source-tagged extraction.
///
/// Elements are unioned without deduplication. The page breakdown for each page comes
/// from the highest-priority provider that reported it.
pub fn merge(
    results: &ProviderResults,
    characteristics: &DocumentCharacteristics,
) -> UnifiedExtraction {
    let mut unified = UnifiedExtraction::default();

    for (source, document) in &results.documents {
        let source = *source;
        unified.processors_used.push(source);
        unified.complete_text.insert(source, document.text.clone());

        for (page_number, page) in document.numbered_pages() {
            let extracted = extract_page(document, page, page_number, source);

            unified.all_text_elements.extend(extracted.elements);
            unified.all_form_fields.extend(extracted.form_fields.iter().cloned());
            unified.all_tables.extend(extracted.tables.iter().cloned());

            if unified.page(page_number).is_none() {
                unified.pages.push(PageBreakdown {
                    page_number,
                    source,
                    dimensions: page.dimension.clone().unwrap_or_default(),
                    blocks: scored(&page.blocks, &document.text),
                    paragraphs: scored(&page.paragraphs, &document.text),
                    lines: scored(&page.lines, &document.text),
                    tokens: scored(&page.tokens, &document.text),
                    form_fields: extracted.form_fields,
                    tables: extracted.tables,
                    confidence: page.confidence,
                });
            }
        }
    }
    unified.pages.sort_by_key(|page| page.page_number);

    unified.complete_text.merged_text = merge_text(&unified.complete_text, characteristics);
    unified.all_numbers = extract_numbers(&unified.complete_text.merged_text);

    if results.documents.is_empty() {
        unified.extraction_failed = true;
        unified.failure = Some(
            results
                .last_error_message()
                .unwrap_or_else(|| "no providers were selected".to_string()),
        );
    }
    unified
}

struct PageExtraction {
    elements: Vec<TextElement>,
    form_fields: Vec<FormField>,
    tables: Vec<TableExtraction>,
}

fn extract_page(
    document: &RawProviderDocument,
    page: &RawPage,
    page_number: usize,
    source: ProviderId,
) -> PageExtraction {
    let full_text = &document.text;
    let mut elements = Vec::new();
    for (kind, layouts) in [
        (ElementKind::Block, &page.blocks),
        (ElementKind::Paragraph, &page.paragraphs),
        (ElementKind::Line, &page.lines),
    ] {
        for layout in layouts {
            let text = layout.resolve_text(full_text);
            if !text.is_empty() {
                elements.push(TextElement { kind, text, page: page_number, source });
            }
        }
    }

    let form_fields = page
        .form_fields
        .iter()
        .map(|field| FormField {
            page: page_number,
            field_name: field.field_name.resolve_text(full_text),
            field_value: field.field_value.resolve_text(full_text),
            name_confidence: field.field_name.confidence,
            value_confidence: field.field_value.confidence,
            source,
        })
        .collect();

    let tables = page
        .tables
        .iter()
        .enumerate()
        .map(|(idx, table)| build_table(table, full_text, page_number, idx + 1, source))
        .collect();

    PageExtraction { elements, form_fields, tables }
}

fn build_table(
    table: &RawTable,
    full_text: &str,
    page: usize,
    table_id: usize,
    source: ProviderId,
) -> TableExtraction {
    let mut extraction = TableExtraction::new(table_id, page, source);

    for (rows, kind) in [
        (&table.header_rows, NestedKind::MergedHeaderCell),
        (&table.body_rows, NestedKind::MergedBodyCell),
    ] {
        for row in rows {
            let mut cells = Vec::with_capacity(row.cells.len());
            for cell in &row.cells {
                let text = cell.layout.resolve_text(full_text);
                if cell.is_spanning() {
                    extraction.nested_structures.push(NestedStructure {
                        kind,
                        text: text.clone(),
                        row_span: cell.row_span,
                        col_span: cell.col_span,
                    });
                }
                cells.push(TableCell {
                    text,
                    row_span: cell.row_span,
                    col_span: cell.col_span,
                    confidence: cell.layout.confidence,
                });
            }
            match kind {
                NestedKind::MergedHeaderCell => extraction.header_rows.push(cells),
                NestedKind::MergedBodyCell => extraction.body_rows.push(cells),
            }
        }
    }

    extraction.refresh_totals();
    extraction
}

fn scored(layouts: &[Layout], full_text: &str) -> Vec<ScoredText> {
    layouts
        .iter()
        .map(|layout| ScoredText {
            text: layout.resolve_text(full_text),
            confidence: layout.confidence,
        })
        .collect()
}

/// Pick the merged text by characteristics, in priority order: handwriting and
/// non-English go to broad OCR, complex tables to the layout parser, anything
/// else to the longest text (ties to the higher-priority provider).
pub fn merge_text(texts: &CompleteText, characteristics: &DocumentCharacteristics) -> String {
    let ocr_text = || texts.provider_text(ProviderId::DocOcr).unwrap_or_default().to_string();

    if characteristics.is_handwritten || !characteristics.is_english() {
        return ocr_text();
    }

    if characteristics.has_complex_tables {
        return match texts.provider_text(ProviderId::LayoutParser) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => ocr_text(),
        };
    }

    let mut best: Option<&str> = None;
    for provider in ProviderId::ALL {
        let Some(text) = texts.provider_text(provider).filter(|t| !t.is_empty()) else {
            continue;
        };
        let longer = match best {
            Some(current) => text.chars().count() > current.chars().count(),
            None => true,
        };
        if longer {
            best = Some(text);
        }
    }
    best.unwrap_or_default().to_string()
}
