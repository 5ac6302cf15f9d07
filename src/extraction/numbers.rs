// Number extraction: one independent regex pass per numeric shape
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberKind {
    Decimal,
    CommaSeparated,
    Integer,
    Currency,
    Percentage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedNumber {
    pub value: String,
    #[serde(rename = "type")]
    pub kind: NumberKind,
    /// Character offset of the match in the merged text.
    pub position: usize,
}

// Passes run in this order; matches from different passes may cover the same span.
static PATTERNS: Lazy<Vec<(NumberKind, Regex)>> = Lazy::new(|| {
    [
        (NumberKind::Decimal, r"\d+\.\d+"),
        (NumberKind::CommaSeparated, r"\d+,\d+"),
        (NumberKind::Integer, r"\d+"),
        (NumberKind::Currency, r"\$\s*\d+(?:,\d{3})*(?:\.\d{2})?"),
        (NumberKind::Percentage, r"\d+%"),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("static number pattern")))
    .collect()
});

pub fn extract_numbers(text: &str) -> Vec<ExtractedNumber> {
    let mut numbers = Vec::new();
    for (kind, pattern) in PATTERNS.iter() {
        // find_iter yields matches left to right, so the char offset advances in step.
        let (mut byte, mut chars) = (0, 0);
        for m in pattern.find_iter(text) {
            chars += text[byte..m.start()].chars().count();
            byte = m.start();
            numbers.push(ExtractedNumber {
                value: m.as_str().to_string(),
                kind: *kind,
                position: chars,
            });
        }
    }
    numbers
}
