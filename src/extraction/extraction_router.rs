// Provider routing: which analysis providers a document gets, and why
//
// The router is a pure function of the detected characteristics. It never looks at
// live provider handles, so the same characteristics always give the same set and
// the same rationale.

use serde::{Deserialize, Serialize};

use super::document_analyzer::DocumentCharacteristics;
use crate::types::ProviderId;

pub const STANDARD_DOCUMENT_REASON: &str = "Standard printed document";

/// Providers to invoke, in priority order, with the reasons behind the choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSelection {
    pub providers: Vec<ProviderId>,
    pub rationale: String,
}

impl ProviderSelection {
    pub fn contains(&self, provider: ProviderId) -> bool {
        self.providers.contains(&provider)
    }
}

pub struct ExtractionRouter;

impl ExtractionRouter {
    /// Cumulative policy: broad OCR always; the form parser for printed documents;
    /// the layout parser for complex tables, and also for easy documents where a
    /// third opinion is cheap cross-validation.
    pub fn select(characteristics: &DocumentCharacteristics) -> ProviderSelection {
        let mut providers = vec![ProviderId::DocOcr];

        if !characteristics.is_handwritten {
            providers.push(ProviderId::FormParser);
        }
        if characteristics.has_complex_tables {
            providers.push(ProviderId::LayoutParser);
        }
        if !characteristics.is_handwritten && !characteristics.has_complex_tables {
            providers.push(ProviderId::LayoutParser);
        }

        ProviderSelection {
            providers,
            rationale: Self::explain(characteristics),
        }
    }

    pub fn explain(characteristics: &DocumentCharacteristics) -> String {
        let mut reasons = Vec::new();

        if characteristics.is_handwritten {
            reasons.push(format!(
                "Handwritten content detected ({:.1}%)",
                characteristics.handwriting_percentage * 100.0
            ));
        }
        if !characteristics.is_english() {
            reasons.push(format!(
                "Non-English language: {}",
                characteristics.primary_language
            ));
        }
        if characteristics.is_multilingual {
            reasons.push("Multilingual document detected".to_string());
        }
        if characteristics.has_complex_tables {
            reasons.push("Complex nested tables detected".to_string());
        }

        if reasons.is_empty() {
            STANDARD_DOCUMENT_REASON.to_string()
        } else {
            reasons.join(" | ")
        }
    }
}
