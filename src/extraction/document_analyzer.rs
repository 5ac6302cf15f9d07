use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::language::LanguageIdentifier;
use super::provider::RawProviderDocument;
use crate::config::{
    DEFAULT_DETECTION_CONFIDENCE, DEFAULT_LANGUAGE, FALLBACK_DETECTION_CONFIDENCE,
    HANDWRITING_RATIO_THRESHOLD, HANDWRITING_TOKEN_CONFIDENCE, MIN_LANGUAGE_SAMPLE_CHARS,
    MULTILINGUAL_MIN_CHARS, MULTILINGUAL_WINDOW_CHARS, PRIMARY_LANGUAGE_SAMPLE_CHARS,
};

/// Document fingerprint for provider routing decisions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentCharacteristics {
    pub is_handwritten: bool,
    pub handwriting_percentage: f32, // 0.0-1.0 share of low-confidence tokens
    pub primary_language: String,
    pub is_multilingual: bool,
    pub has_complex_tables: bool,
    pub detection_confidence: f32,
}

impl DocumentCharacteristics {
    /// Assumed shape when the quick scan is missing or empty.
    pub fn conservative() -> Self {
        Self {
            is_handwritten: false,
            handwriting_percentage: 0.0,
            primary_language: DEFAULT_LANGUAGE.to_string(),
            is_multilingual: false,
            has_complex_tables: false,
            detection_confidence: FALLBACK_DETECTION_CONFIDENCE,
        }
    }

    pub fn is_english(&self) -> bool {
        self.primary_language == DEFAULT_LANGUAGE
    }
}

impl Default for DocumentCharacteristics {
    fn default() -> Self {
        Self::conservative()
    }
}

/// Characteristic detector working from one fast broad-OCR pass
pub struct DocumentAnalyzer {
    language: Arc<dyn LanguageIdentifier>,
}

impl DocumentAnalyzer {
    pub fn new(language: Arc<dyn LanguageIdentifier>) -> Self {
        Self { language }
    }

    /// Never fails: a missing or empty scan yields the conservative defaults.
    pub fn detect(&self, quick_scan: Option<&RawProviderDocument>) -> DocumentCharacteristics {
        let document = match quick_scan {
            Some(doc) if !doc.is_unusable() => doc,
            _ => {
                debug!("quick scan unavailable, using conservative characteristics");
                return DocumentCharacteristics::conservative();
            }
        };

        let (is_handwritten, handwriting_percentage) = detect_handwriting(document);
        let (primary_language, is_multilingual) = self.detect_language(&document.text);

        let characteristics = DocumentCharacteristics {
            is_handwritten,
            handwriting_percentage,
            primary_language,
            is_multilingual,
            has_complex_tables: detect_complex_tables(document),
            detection_confidence: detection_confidence(document),
        };
        info!(?characteristics, "document characteristics detected");
        characteristics
    }

    fn detect_language(&self, text: &str) -> (String, bool) {
        let char_count = text.chars().count();
        if char_count < MIN_LANGUAGE_SAMPLE_CHARS {
            return (DEFAULT_LANGUAGE.to_string(), false);
        }

        let primary_sample = char_window(text, 0, PRIMARY_LANGUAGE_SAMPLE_CHARS);
        let primary = match self.language.identify(&primary_sample) {
            Some(code) => code,
            None => {
                debug!("primary language undetermined, assuming {}", DEFAULT_LANGUAGE);
                return (DEFAULT_LANGUAGE.to_string(), false);
            }
        };

        let mut languages = BTreeSet::from([primary.clone()]);
        if char_count > MULTILINGUAL_MIN_CHARS {
            for offset in [char_count / 3, 2 * char_count / 3] {
                let window = char_window(text, offset, MULTILINGUAL_WINDOW_CHARS);
                if let Some(code) = self.language.identify(&window) {
                    languages.insert(code);
                }
            }
        }

        (primary, languages.len() > 1)
    }
}

fn char_window(text: &str, start: usize, len: usize) -> String {
    text.chars().skip(start).take(len).collect()
}

/// Low token confidence is the handwriting signal.
fn detect_handwriting(document: &RawProviderDocument) -> (bool, f32) {
    let mut total = 0usize;
    let mut low = 0usize;
    for token in document.tokens() {
        total += 1;
        if token.confidence < HANDWRITING_TOKEN_CONFIDENCE {
            low += 1;
        }
    }

    if total == 0 {
        return (false, 0.0);
    }
    let percentage = low as f32 / total as f32;
    (percentage > HANDWRITING_RATIO_THRESHOLD, percentage)
}

/// Any merged cell, header or body, marks the tables as complex.
fn detect_complex_tables(document: &RawProviderDocument) -> bool {
    document
        .pages
        .iter()
        .flat_map(|page| page.tables.iter())
        .any(|table| table.cells().any(|cell| cell.is_spanning()))
}

fn detection_confidence(document: &RawProviderDocument) -> f32 {
    let confidences: Vec<f32> = document
        .pages
        .iter()
        .map(|page| page.confidence)
        .filter(|c| *c > 0.0)
        .collect();

    if confidences.is_empty() {
        return DEFAULT_DETECTION_CONFIDENCE;
    }
    (confidences.iter().sum::<f32>() / confidences.len() as f32).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::provider::{Layout, RawPage, RawTable, RawTableCell, RawTableRow};

    /// Calls text Spanish when it mentions "préstamo", English otherwise.
    struct KeywordIdentifier;

    impl LanguageIdentifier for KeywordIdentifier {
        fn identify(&self, sample: &str) -> Option<String> {
            if sample.trim().is_empty() {
                None
            } else if sample.contains("préstamo") {
                Some("es".to_string())
            } else {
                Some("en".to_string())
            }
        }
    }

    struct SilentIdentifier;

    impl LanguageIdentifier for SilentIdentifier {
        fn identify(&self, _sample: &str) -> Option<String> {
            None
        }
    }

    fn analyzer() -> DocumentAnalyzer {
        DocumentAnalyzer::new(Arc::new(KeywordIdentifier))
    }

    fn token(confidence: f32) -> Layout {
        Layout { confidence, text_segments: vec![] }
    }

    fn spanning_cell(row_span: u32, col_span: u32) -> RawTableCell {
        RawTableCell { layout: Layout::default(), row_span, col_span }
    }

    #[test]
    fn forty_percent_low_confidence_tokens_is_handwriting() {
        let mut tokens: Vec<Layout> = (0..40).map(|_| token(0.5)).collect();
        tokens.extend((0..60).map(|_| token(0.98)));
        let doc = RawProviderDocument {
            text: "short".into(),
            pages: vec![RawPage { tokens, ..Default::default() }],
        };

        let characteristics = analyzer().detect(Some(&doc));
        assert!(characteristics.is_handwritten);
        assert!((characteristics.handwriting_percentage - 0.4).abs() < 1e-6);
    }

    #[test]
    fn exactly_thirty_percent_is_not_handwriting() {
        let mut tokens: Vec<Layout> = (0..3).map(|_| token(0.74)).collect();
        tokens.extend((0..7).map(|_| token(0.75)));
        let doc = RawProviderDocument {
            text: "x".into(),
            pages: vec![RawPage { tokens, ..Default::default() }],
        };

        let characteristics = analyzer().detect(Some(&doc));
        assert!(!characteristics.is_handwritten);
        assert!((characteristics.handwriting_percentage - 0.3).abs() < 1e-6);
    }

    #[test]
    fn missing_or_empty_scan_gives_conservative_defaults() {
        assert_eq!(analyzer().detect(None), DocumentCharacteristics::conservative());
        assert_eq!(
            analyzer().detect(Some(&RawProviderDocument::default())),
            DocumentCharacteristics::conservative()
        );
        assert_eq!(DocumentCharacteristics::conservative().detection_confidence, 0.5);
    }

    #[test]
    fn short_text_is_assumed_english() {
        let doc = RawProviderDocument { text: "préstamo".into(), pages: vec![RawPage::default()] };
        let characteristics = analyzer().detect(Some(&doc));
        assert_eq!(characteristics.primary_language, "en");
        assert!(!characteristics.is_multilingual);
    }

    #[test]
    fn later_windows_reveal_a_second_language() {
        let english = "The borrower promises to pay the lender. ".repeat(40);
        let spanish = "El préstamo será pagado en cuotas. ".repeat(40);
        let doc = RawProviderDocument {
            text: format!("{}{}", english, spanish),
            pages: vec![RawPage::default()],
        };

        let characteristics = analyzer().detect(Some(&doc));
        assert_eq!(characteristics.primary_language, "en");
        assert!(characteristics.is_multilingual);
    }

    #[test]
    fn texts_under_two_thousand_chars_are_never_multilingual() {
        let text = format!("{}{}", "Monthly payment due. ".repeat(20), "préstamo ".repeat(10));
        assert!(text.chars().count() < 2000);
        let doc = RawProviderDocument { text, pages: vec![RawPage::default()] };
        assert!(!analyzer().detect(Some(&doc)).is_multilingual);
    }

    #[test]
    fn undetermined_language_falls_back_to_english() {
        let analyzer = DocumentAnalyzer::new(Arc::new(SilentIdentifier));
        let doc = RawProviderDocument {
            text: "x".repeat(3000),
            pages: vec![RawPage::default()],
        };
        let characteristics = analyzer.detect(Some(&doc));
        assert_eq!(characteristics.primary_language, "en");
        assert!(!characteristics.is_multilingual);
    }

    #[test]
    fn spanning_body_cell_marks_complex_tables() {
        let table = RawTable {
            header_rows: vec![RawTableRow { cells: vec![spanning_cell(1, 1)] }],
            body_rows: vec![RawTableRow { cells: vec![spanning_cell(1, 1), spanning_cell(2, 1)] }],
        };
        let doc = RawProviderDocument {
            text: "table".into(),
            pages: vec![RawPage { tables: vec![table], ..Default::default() }],
        };
        assert!(analyzer().detect(Some(&doc)).has_complex_tables);
    }

    #[test]
    fn detection_confidence_averages_positive_page_scores() {
        let doc = RawProviderDocument {
            text: "pages".into(),
            pages: vec![
                RawPage { confidence: 0.9, ..Default::default() },
                RawPage { confidence: 0.0, ..Default::default() },
                RawPage { confidence: 0.7, ..Default::default() },
            ],
        };
        assert!((analyzer().detect(Some(&doc)).detection_confidence - 0.8).abs() < 1e-6);

        let unscored = RawProviderDocument { text: "pages".into(), pages: vec![RawPage::default()] };
        assert_eq!(analyzer().detect(Some(&unscored)).detection_confidence, 0.8);
    }
}
