// Pipeline integration tests with in-process stub providers
use async_trait::async_trait;
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use loanlens::extraction::provider::{AnalysisProvider, RawProviderDocument, ReplayProvider};
use loanlens::extraction::{DocumentAnalyzer, ExtractionConductor, LanguageIdentifier};
use loanlens::pipeline::ExtractionStatus;
use loanlens::types::ProviderError;
use loanlens::{DataMasker, LoanDocumentPipeline, MaskLevel, ProviderId, Summarizer};

struct EnglishOnly;

impl LanguageIdentifier for EnglishOnly {
    fn identify(&self, _sample: &str) -> Option<String> {
        Some("en".to_string())
    }
}

struct Fixed {
    id: ProviderId,
    document: RawProviderDocument,
}

#[async_trait]
impl AnalysisProvider for Fixed {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn invoke(&self, _: &[u8], _: &str) -> Result<RawProviderDocument, ProviderError> {
        Ok(self.document.clone())
    }
}

struct Broken(ProviderId);

#[async_trait]
impl AnalysisProvider for Broken {
    fn id(&self) -> ProviderId {
        self.0
    }

    async fn invoke(&self, _: &[u8], _: &str) -> Result<RawProviderDocument, ProviderError> {
        Err(ProviderError::Invocation { provider: self.0, message: "service unavailable".into() })
    }
}

struct Echo;

#[async_trait]
impl Summarizer for Echo {
    async fn summarize(&self, text: &str) -> anyhow::Result<String> {
        Ok(format!("{} characters", text.chars().count()))
    }
}

struct Unreachable;

#[async_trait]
impl Summarizer for Unreachable {
    async fn summarize(&self, _: &str) -> anyhow::Result<String> {
        anyhow::bail!("summary service offline")
    }
}

const NOTE_TEXT: &str = "Borrower Jane Smith jane.smith@mail.com owes $12,500.00 at 6.5%";

fn note_document() -> RawProviderDocument {
    serde_json::from_value(json!({
        "text": NOTE_TEXT,
        "pages": [{
            "page_number": 1,
            "confidence": 0.96,
            "dimension": {"width": 612.0, "height": 792.0, "unit": "points"},
            "blocks": [{"confidence": 0.97, "text_segments": [{"start_index": 0, "end_index": 19}]}],
            "lines": [{"confidence": 0.95, "text_segments": [{"start_index": 0, "end_index": 63}]}],
            "tokens": [
                {"confidence": 0.99, "text_segments": [{"start_index": 0, "end_index": 8}]},
                {"confidence": 0.93, "text_segments": [{"start_index": 9, "end_index": 13}]}
            ],
            "form_fields": [{
                "field_name": {"confidence": 0.9, "text_segments": [{"start_index": 0, "end_index": 8}]},
                "field_value": {"confidence": 0.88, "text_segments": [{"start_index": 9, "end_index": 19}]}
            }]
        }]
    }))
    .unwrap()
}

fn pipeline(conductor: ExtractionConductor) -> LoanDocumentPipeline {
    LoanDocumentPipeline::new(
        conductor,
        DocumentAnalyzer::new(Arc::new(EnglishOnly)),
        DataMasker::new(MaskLevel::Standard),
    )
}

fn conductor() -> ExtractionConductor {
    ExtractionConductor::new(Duration::from_secs(5))
}

#[tokio::test]
async fn one_failed_provider_leaves_only_the_survivor() {
    let conductor = conductor()
        .with_provider(Arc::new(Broken(ProviderId::DocOcr)))
        .with_provider(Arc::new(Fixed { id: ProviderId::FormParser, document: note_document() }));

    let processed = pipeline(conductor)
        .process("note.pdf", b"%PDF-1.7", "application/pdf")
        .await
        .unwrap();
    let record = &processed.record;

    assert_eq!(record.extraction_status, ExtractionStatus::Complete);
    assert_eq!(record.processors_used, vec![ProviderId::FormParser]);
    assert!(!record.all_text_elements.is_empty());
    assert!(record.all_text_elements.iter().all(|e| e.source == ProviderId::FormParser));
    assert_eq!(record.complete_text.merged_text, NOTE_TEXT);
    assert_eq!(record.pages[0].dimensions.unit, "points");
    assert_eq!(record.all_form_fields[0].field_value, "Jane Smith");

    // the failed quick scan leaves conservative characteristics
    let metadata = &record.processing_metadata;
    assert_eq!(metadata.characteristics.detection_confidence, 0.5);
    assert_eq!(metadata.processors_selected.len(), 3);
    assert_eq!(metadata.selection_reason, "Standard printed document");
}

#[tokio::test]
async fn masked_and_unmasked_views_share_one_schema() {
    let conductor = conductor()
        .with_provider(Arc::new(Fixed { id: ProviderId::DocOcr, document: note_document() }));

    let processed = pipeline(conductor)
        .process("note.pdf", b"%PDF", "application/pdf")
        .await
        .unwrap();
    let views = &processed.views;

    assert_eq!(views.unmasked["complete_text"]["merged_text"], NOTE_TEXT);
    let masked_text = views.masked["complete_text"]["merged_text"].as_str().unwrap();
    assert!(!masked_text.contains("jane.smith@mail.com"));
    assert!(masked_text.contains("j*********@****.com"));

    let unmasked_keys: Vec<&String> = views.unmasked.as_object().unwrap().keys().collect();
    for key in unmasked_keys {
        assert!(views.masked.get(key).is_some(), "masked view lost {}", key);
    }
    assert_eq!(views.masked["_data_masking"]["mask_level"], "standard");
    assert!(views.unmasked.get("_data_masking").is_none());
    assert!(views
        .manifest
        .masked_fields
        .contains(&"complete_text.doc_ocr_text".to_string()));
    assert_eq!(views.unmasked["extraction_method"], "smart_multi_processor");
    assert!(views.unmasked.get("error").is_none());
}

#[tokio::test]
async fn every_provider_failing_yields_a_failed_record() {
    let conductor = conductor().with_provider(Arc::new(Broken(ProviderId::DocOcr)));

    let processed = pipeline(conductor)
        .with_summarizer(Arc::new(Echo))
        .process("blank.png", b"\x89PNG", "image/png")
        .await
        .unwrap();
    let record = &processed.record;

    assert_eq!(record.extraction_status, ExtractionStatus::Failed);
    assert!(record.error.is_some());
    assert!(record.processors_used.is_empty());
    assert!(record.summary.is_none());
    assert_eq!(processed.views.unmasked["extraction_status"], "failed");
    assert!((0.0..=1.0).contains(&record.accuracy_metrics.overall_accuracy));
}

#[rstest]
#[case::working(Some("63 characters"))]
#[case::offline(None)]
#[tokio::test]
async fn summaries_are_optional(#[case] expected: Option<&str>) {
    let summarizer: Arc<dyn Summarizer> = match expected {
        Some(_) => Arc::new(Echo),
        None => Arc::new(Unreachable),
    };
    let conductor = conductor()
        .with_provider(Arc::new(Fixed { id: ProviderId::DocOcr, document: note_document() }));

    let processed = pipeline(conductor)
        .with_summarizer(summarizer)
        .process("note.pdf", b"%PDF", "application/pdf")
        .await
        .unwrap();

    assert_eq!(processed.record.summary.as_deref(), expected);
    assert_eq!(processed.views.unmasked.get("summary").is_some(), expected.is_some());
}

#[tokio::test]
async fn replayed_responses_drive_the_whole_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let scan = serde_json::to_string(&note_document()).unwrap();
    std::fs::write(dir.path().join("doc_ocr.json"), &scan).unwrap();
    std::fs::write(dir.path().join("layout_parser.json"), &scan).unwrap();

    let mut conductor = conductor();
    for id in ProviderId::ALL {
        conductor.register(Arc::new(ReplayProvider::new(id, dir.path())));
    }

    let processed = pipeline(conductor)
        .process("note.pdf", b"%PDF", "application/pdf")
        .await
        .unwrap();
    let record = &processed.record;

    assert_eq!(record.processors_used, vec![ProviderId::DocOcr, ProviderId::LayoutParser]);
    assert_eq!(record.pages.len(), 1);
    assert_eq!(record.pages[0].source, ProviderId::DocOcr);
    assert!(record
        .all_numbers
        .iter()
        .any(|n| n.value == "$12,500.00"));
    assert!((record.accuracy_metrics.provider_accuracies["doc_ocr"] - 0.96).abs() < 1e-6);
}
