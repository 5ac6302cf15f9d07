// Language identification used by characteristic detection
use lingua::{Language, LanguageDetector, LanguageDetectorBuilder};

/// Identifies the dominant language of a text sample as an ISO 639-1 code.
pub trait LanguageIdentifier: Send + Sync {
    /// `None` when the sample is too ambiguous to call.
    fn identify(&self, sample: &str) -> Option<String>;
}

/// Languages most often seen on US loan paperwork.
const LOAN_LANGUAGES: [Language; 12] = [
    Language::English,
    Language::Spanish,
    Language::French,
    Language::German,
    Language::Portuguese,
    Language::Italian,
    Language::Chinese,
    Language::Vietnamese,
    Language::Korean,
    Language::Tagalog,
    Language::Arabic,
    Language::Russian,
];

pub struct LinguaIdentifier {
    detector: LanguageDetector,
}

impl LinguaIdentifier {
    pub fn new() -> Self {
        Self::with_languages(&LOAN_LANGUAGES)
    }

    pub fn with_languages(languages: &[Language]) -> Self {
        let detector = LanguageDetectorBuilder::from_languages(languages).build();
        Self { detector }
    }
}

impl Default for LinguaIdentifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageIdentifier for LinguaIdentifier {
    fn identify(&self, sample: &str) -> Option<String> {
        self.detector
            .detect_language_of(sample)
            .map(|language| language.iso_code_639_1().to_string().to_lowercase())
    }
}
