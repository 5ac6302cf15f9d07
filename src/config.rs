// Configuration constants and the pipeline config file for loanlens
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{MaskLevel, ProviderId};

// Characteristic detection
pub const HANDWRITING_TOKEN_CONFIDENCE: f32 = 0.75;
pub const HANDWRITING_RATIO_THRESHOLD: f32 = 0.3;
pub const MIN_LANGUAGE_SAMPLE_CHARS: usize = 50;
pub const PRIMARY_LANGUAGE_SAMPLE_CHARS: usize = 1000;
pub const MULTILINGUAL_MIN_CHARS: usize = 2000;
pub const MULTILINGUAL_WINDOW_CHARS: usize = 500;
pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_DETECTION_CONFIDENCE: f32 = 0.8;
pub const FALLBACK_DETECTION_CONFIDENCE: f32 = 0.5;

// Accuracy scoring
pub const DEFAULT_PROVIDER_CONFIDENCE: f32 = 0.95;
pub const LOW_CONFIDENCE_THRESHOLD: f32 = 0.85;
pub const LOW_CONFIDENCE_PREVIEW_CHARS: usize = 50;

// Masking
pub const MASKING_NOTE: &str = "Sensitive information has been masked for privacy";
pub const MAX_MASKING_DEPTH: usize = 128;

// Defaults for the config file
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 50;

const CONFIG_ENV: &str = "LOANLENS_CONFIG";
const MASK_LEVEL_ENV: &str = "LOANLENS_MASK_LEVEL";

/// What the masker hands back when it cannot walk a record.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskingFailurePolicy {
    /// Replace every scalar leaf with a redaction marker.
    #[default]
    FailClosed,
    /// Return the record untouched and log a warning.
    FailOpen,
}

/// External command backing one analysis provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderCommandConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub mask_level: MaskLevel,
    #[serde(default)]
    pub masking_failure: MaskingFailurePolicy,
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,
    #[serde(default = "default_max_file_size")]
    pub max_file_size_mb: u64,
    /// Keyed by provider name (`doc_ocr`, `form_parser`, `layout_parser`).
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderCommandConfig>,
}

fn default_provider_timeout() -> u64 { DEFAULT_PROVIDER_TIMEOUT_SECS }
fn default_max_file_size() -> u64 { DEFAULT_MAX_FILE_SIZE_MB }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mask_level: MaskLevel::default(),
            masking_failure: MaskingFailurePolicy::default(),
            provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            max_file_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
            providers: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the config from an explicit path, `LOANLENS_CONFIG`, the user config
    /// directory, or built-in defaults, then apply `LOANLENS_MASK_LEVEL`.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit.map(Path::to_path_buf).or_else(config_path_from_env) {
            Some(path) => Self::load(&path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::load(&path)?,
                None => Self::default(),
            },
        };

        if let Ok(level) = env::var(MASK_LEVEL_ENV) {
            config.mask_level = level
                .parse()
                .with_context(|| format!("{} is invalid", MASK_LEVEL_ENV))?;
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        megabytes(self.max_file_size_mb)
    }

    /// Provider commands keyed by id; unknown provider names are rejected.
    pub fn provider_commands(&self) -> Result<Vec<(ProviderId, &ProviderCommandConfig)>> {
        self.providers
            .iter()
            .map(|(name, command)| {
                let id = name.parse::<ProviderId>()?;
                Ok::<_, anyhow::Error>((id, command))
            })
            .collect()
    }
}

/// Byte count of `mb` megabytes, saturating instead of overflowing.
pub fn megabytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}

fn config_path_from_env() -> Option<PathBuf> {
    env::var(CONFIG_ENV).ok().map(PathBuf::from)
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("loanlens").join("loanlens.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_tables() {
        let config: PipelineConfig = toml::from_str(
            r#"
            mask_level = "strict"
            masking_failure = "fail_open"
            provider_timeout_secs = 30

            [providers.doc_ocr]
            command = "docai"
            args = ["--processor", "ocr"]

            [providers.layout_parser]
            command = "layout-cli"
            "#,
        )
        .unwrap();

        assert_eq!(config.mask_level, MaskLevel::Strict);
        assert_eq!(config.masking_failure, MaskingFailurePolicy::FailOpen);
        assert_eq!(config.provider_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_file_size_mb, DEFAULT_MAX_FILE_SIZE_MB);
        let commands = config.provider_commands().unwrap();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].0, ProviderId::DocOcr);
        assert_eq!(commands[0].1.args, vec!["--processor", "ocr"]);
        assert_eq!(commands[1].0, ProviderId::LayoutParser);
        assert!(commands[1].1.args.is_empty());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(config.mask_level, MaskLevel::Standard);
        assert_eq!(config.masking_failure, MaskingFailurePolicy::FailClosed);
        assert_eq!(config.provider_timeout_secs, DEFAULT_PROVIDER_TIMEOUT_SECS);
        assert_eq!(config.max_file_size_bytes(), 50 * 1024 * 1024);
    }

    #[test]
    fn huge_size_ceiling_saturates() {
        let config: PipelineConfig =
            toml::from_str(&format!("max_file_size_mb = {}", i64::MAX)).unwrap();
        assert_eq!(config.max_file_size_bytes(), u64::MAX);
    }

    #[test]
    fn save_then_load_keeps_providers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loanlens.toml");
        let mut config = PipelineConfig::default();
        config.providers.insert(
            "form_parser".to_string(),
            ProviderCommandConfig { command: "forms".into(), args: vec![] },
        );
        config.save(&path).unwrap();

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded.providers["form_parser"].command, "forms");
    }

    #[test]
    fn unknown_provider_names_are_rejected() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [providers.handwriting]
            command = "hw"
            "#,
        )
        .unwrap();
        assert!(config.provider_commands().is_err());
    }
}
