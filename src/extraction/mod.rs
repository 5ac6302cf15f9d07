// Loan document extraction: detection, routing, multi-provider aggregation and scoring
pub mod accuracy;
pub mod conductor;
pub mod document_analyzer;
pub mod extraction_router;
pub mod language;
pub mod numbers;
pub mod provider;
pub mod unified;

pub use accuracy::{score, AccuracyMetrics, LowConfidenceItem, PageConfidence};
pub use conductor::{merge, merge_text, Aggregation, ExtractionConductor, ProviderResults};
pub use document_analyzer::{DocumentAnalyzer, DocumentCharacteristics};
pub use extraction_router::{ExtractionRouter, ProviderSelection};
pub use language::{LanguageIdentifier, LinguaIdentifier};
pub use numbers::{extract_numbers, ExtractedNumber, NumberKind};
pub use provider::{AnalysisProvider, CommandProvider, RawProviderDocument, ReplayProvider};
pub use unified::UnifiedExtraction;
