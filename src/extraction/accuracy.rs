// Accuracy scoring over provider output and the merged extraction
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::conductor::ProviderResults;
use super::provider::RawProviderDocument;
use super::unified::UnifiedExtraction;
use crate::config::{DEFAULT_PROVIDER_CONFIDENCE, LOW_CONFIDENCE_PREVIEW_CHARS, LOW_CONFIDENCE_THRESHOLD};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageConfidence {
    pub page: usize,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowConfidenceItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub confidence: f32,
    pub page: usize,
}

/// Confidence summary for one processed document. Every scalar lies in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    pub overall_accuracy: f32,
    /// Keyed by provider name.
    pub provider_accuracies: BTreeMap<String, f32>,
    pub text_extraction_confidence: f32,
    pub table_extraction_confidence: f32,
    pub form_field_confidence: f32,
    pub page_confidences: Vec<PageConfidence>,
    pub low_confidence_items: Vec<LowConfidenceItem>,
}

pub fn score(results: &ProviderResults, unified: &UnifiedExtraction) -> AccuracyMetrics {
    let mut provider_accuracies = BTreeMap::new();
    let mut element_confidences = Vec::new();

    for (provider, document) in &results.documents {
        let samples = element_samples(document);
        let accuracy = if samples.is_empty() {
            mean(positive(document.pages.iter().map(|page| page.confidence)))
                .unwrap_or(DEFAULT_PROVIDER_CONFIDENCE)
        } else {
            mean(samples.iter().copied()).unwrap_or(DEFAULT_PROVIDER_CONFIDENCE)
        };
        provider_accuracies.insert(provider.to_string(), clamp_unit(accuracy));
        element_confidences.extend(samples);
    }

    let text_extraction_confidence = category_confidence(unified.pages.iter().flat_map(|page| {
        page.blocks.iter().chain(page.lines.iter()).map(|t| t.confidence)
    }));
    let table_extraction_confidence = category_confidence(
        unified.all_tables.iter().flat_map(|table| table.cells().map(|c| c.confidence)),
    );
    let form_field_confidence =
        category_confidence(unified.all_form_fields.iter().map(|f| f.value_confidence));

    let overall_accuracy = match mean(element_confidences.iter().copied()) {
        Some(value) => value,
        None => {
            let categories = provider_accuracies.values().copied().chain([
                text_extraction_confidence,
                table_extraction_confidence,
                form_field_confidence,
            ]);
            mean(positive(categories)).unwrap_or(DEFAULT_PROVIDER_CONFIDENCE)
        }
    };

    AccuracyMetrics {
        overall_accuracy: clamp_unit(overall_accuracy),
        provider_accuracies,
        text_extraction_confidence,
        table_extraction_confidence,
        form_field_confidence,
        page_confidences: page_confidences(unified),
        low_confidence_items: low_confidence_items(unified),
    }
}

/// Token confidences, or line confidences when a provider reports no tokens.
fn element_samples(document: &RawProviderDocument) -> Vec<f32> {
    let tokens: Vec<f32> = finite(document.tokens().map(|t| t.confidence)).collect();
    if !tokens.is_empty() {
        return tokens;
    }
    finite(document.lines().map(|l| l.confidence)).collect()
}

fn page_confidences(unified: &UnifiedExtraction) -> Vec<PageConfidence> {
    unified
        .pages
        .iter()
        .map(|page| {
            let confidence = if page.confidence.is_finite() && page.confidence > 0.0 {
                page.confidence
            } else {
                mean(finite(page.blocks.iter().map(|b| b.confidence)))
                    .unwrap_or(DEFAULT_PROVIDER_CONFIDENCE)
            };
            PageConfidence { page: page.page_number, confidence: clamp_unit(confidence) }
        })
        .collect()
}

fn low_confidence_items(unified: &UnifiedExtraction) -> Vec<LowConfidenceItem> {
    let mut items = Vec::new();
    for page in &unified.pages {
        for block in &page.blocks {
            if block.confidence < LOW_CONFIDENCE_THRESHOLD {
                items.push(LowConfidenceItem {
                    kind: "block".to_string(),
                    text: block.text.chars().take(LOW_CONFIDENCE_PREVIEW_CHARS).collect(),
                    confidence: clamp_unit(block.confidence),
                    page: page.page_number,
                });
            }
        }
    }
    items
}

fn category_confidence(values: impl Iterator<Item = f32>) -> f32 {
    clamp_unit(mean(positive(values)).unwrap_or(DEFAULT_PROVIDER_CONFIDENCE))
}

fn finite(values: impl Iterator<Item = f32>) -> impl Iterator<Item = f32> {
    values.filter(|v| v.is_finite())
}

fn positive(values: impl Iterator<Item = f32>) -> impl Iterator<Item = f32> {
    finite(values).filter(|v| *v > 0.0)
}

fn mean(values: impl Iterator<Item = f32>) -> Option<f32> {
    let (sum, count) = values.fold((0.0f32, 0usize), |(sum, n), v| (sum + v, n + 1));
    (count > 0).then(|| sum / count as f32)
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
