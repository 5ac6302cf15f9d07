// Core types and error enums for loanlens
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of an external analysis provider.
///
/// Variant order is the fixed priority used for tie-breaking: broad OCR first,
/// then the structured form parser, then the layout parser.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    DocOcr,
    FormParser,
    LayoutParser,
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [
        ProviderId::DocOcr,
        ProviderId::FormParser,
        ProviderId::LayoutParser,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            ProviderId::DocOcr => "doc_ocr",
            ProviderId::FormParser => "form_parser",
            ProviderId::LayoutParser => "layout_parser",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = LoanlensError;

    fn from_str(s: &str) -> Result<Self> {
        ProviderId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| LoanlensError::Config(format!("unknown provider '{}'", s)))
    }
}

/// How much of a sensitive value stays visible after masking.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskLevel {
    Minimal,
    #[default]
    Standard,
    Strict,
}

impl MaskLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MaskLevel::Minimal => "minimal",
            MaskLevel::Standard => "standard",
            MaskLevel::Strict => "strict",
        }
    }
}

impl fmt::Display for MaskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaskLevel {
    type Err = LoanlensError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(MaskLevel::Minimal),
            "standard" => Ok(MaskLevel::Standard),
            "strict" => Ok(MaskLevel::Strict),
            other => Err(LoanlensError::Config(format!("unknown mask level '{}'", other))),
        }
    }
}

/// A single provider's failure. Never fatal to an aggregation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} timed out after {after_secs}s")]
    Timeout { provider: ProviderId, after_secs: u64 },

    #[error("{0} is not configured")]
    NotConfigured(ProviderId),

    #[error("{provider} invocation failed: {message}")]
    Invocation { provider: ProviderId, message: String },

    #[error("{provider} returned an unreadable document: {message}")]
    Decode { provider: ProviderId, message: String },

    #[error("{0} returned no usable document")]
    EmptyDocument(ProviderId),
}

impl ProviderError {
    pub fn provider(&self) -> ProviderId {
        match self {
            ProviderError::Timeout { provider, .. }
            | ProviderError::Invocation { provider, .. }
            | ProviderError::Decode { provider, .. } => *provider,
            ProviderError::NotConfigured(provider) | ProviderError::EmptyDocument(provider) => {
                *provider
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MaskingError {
    #[error("record root must be an object, found {0}")]
    UnsupportedShape(&'static str),

    #[error("record nesting exceeds {0} levels")]
    DepthExceeded(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum LoanlensError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{name} is {size_mb:.1} MB, above the {limit_mb} MB ceiling")]
    FileTooLarge { name: String, size_mb: f64, limit_mb: u64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Masking(#[from] MaskingError),
}

pub type Result<T> = std::result::Result<T, LoanlensError>;
