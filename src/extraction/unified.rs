// Unified extraction model: the merged, source-tagged view over every provider
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::numbers::ExtractedNumber;
use super::provider::PageDimension;
use crate::types::ProviderId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Block,
    Paragraph,
    Line,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextElement {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub text: String,
    pub page: usize,
    pub source: ProviderId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormField {
    pub page: usize,
    pub field_name: String,
    pub field_value: String,
    pub name_confidence: f32,
    pub value_confidence: f32,
    pub source: ProviderId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCell {
    pub text: String,
    pub row_span: u32,
    pub col_span: u32,
    pub confidence: f32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestedKind {
    MergedHeaderCell,
    MergedBodyCell,
}

/// A cell spanning more than one row or column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedStructure {
    #[serde(rename = "type")]
    pub kind: NestedKind,
    pub text: String,
    pub row_span: u32,
    pub col_span: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableExtraction {
    pub table_id: usize,
    pub page: usize,
    pub source: ProviderId,
    pub header_rows: Vec<Vec<TableCell>>,
    pub body_rows: Vec<Vec<TableCell>>,
    pub total_rows: usize,
    pub total_columns: usize,
    pub nested_structures: Vec<NestedStructure>,
}

impl TableExtraction {
    pub fn new(table_id: usize, page: usize, source: ProviderId) -> Self {
        Self {
            table_id,
            page,
            source,
            header_rows: Vec::new(),
            body_rows: Vec::new(),
            total_rows: 0,
            total_columns: 0,
            nested_structures: Vec::new(),
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = &TableCell> {
        self.header_rows
            .iter()
            .chain(self.body_rows.iter())
            .flat_map(|row| row.iter())
    }

    /// Recompute row and column totals from the stored rows.
    pub fn refresh_totals(&mut self) {
        self.total_rows = self.header_rows.len() + self.body_rows.len();
        self.total_columns = self
            .header_rows
            .iter()
            .chain(self.body_rows.iter())
            .map(Vec::len)
            .max()
            .unwrap_or(0);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredText {
    pub text: String,
    pub confidence: f32,
}

/// Per-page view taken from the highest-priority provider that reported the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageBreakdown {
    pub page_number: usize,
    pub source: ProviderId,
    pub dimensions: PageDimension,
    pub blocks: Vec<ScoredText>,
    pub paragraphs: Vec<ScoredText>,
    pub lines: Vec<ScoredText>,
    pub tokens: Vec<ScoredText>,
    pub form_fields: Vec<FormField>,
    pub tables: Vec<TableExtraction>,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteText {
    /// Each provider's own text, keyed `<provider>_text`.
    #[serde(flatten)]
    pub by_provider: BTreeMap<String, String>,
    pub merged_text: String,
}

impl CompleteText {
    pub fn provider_text(&self, provider: ProviderId) -> Option<&str> {
        self.by_provider
            .get(&Self::key(provider))
            .map(String::as_str)
    }

    pub fn insert(&mut self, provider: ProviderId, text: String) {
        self.by_provider.insert(Self::key(provider), text);
    }

    fn key(provider: ProviderId) -> String {
        format!("{}_text", provider)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnifiedExtraction {
    pub processors_used: Vec<ProviderId>,
    pub complete_text: CompleteText,
    pub all_text_elements: Vec<TextElement>,
    pub all_numbers: Vec<ExtractedNumber>,
    pub all_form_fields: Vec<FormField>,
    pub all_tables: Vec<TableExtraction>,
    pub pages: Vec<PageBreakdown>,
    /// Set when no selected provider produced a usable document.
    pub extraction_failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl UnifiedExtraction {
    pub fn page(&self, page_number: usize) -> Option<&PageBreakdown> {
        self.pages.iter().find(|p| p.page_number == page_number)
    }
}
