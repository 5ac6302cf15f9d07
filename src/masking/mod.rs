// Data masking for output records
//
// A `DataMasker` is reusable configuration. Every call opens a fresh `MaskingSession`
// that rebuilds the record and collects the dotted paths it masked, so concurrent
// calls never share an accumulator and the input record is left untouched.
pub mod rules;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use crate::config::{MaskingFailurePolicy, MASKING_NOTE, MAX_MASKING_DEPTH};
use crate::types::{MaskLevel, MaskingError};
use rules::SensitiveKind;

pub const MASKING_METADATA_KEY: &str = "_data_masking";
pub const REDACTED: &str = "[REDACTED]";

/// What was masked, and how. Also embedded in the masked record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskingManifest {
    pub masked: bool,
    pub mask_level: MaskLevel,
    pub masked_fields: Vec<String>,
    pub note: String,
}

impl MaskingManifest {
    fn new(masked: bool, mask_level: MaskLevel, masked_fields: Vec<String>) -> Self {
        Self { masked, mask_level, masked_fields, note: MASKING_NOTE.to_string() }
    }

    fn to_value(&self) -> Value {
        json!({
            "masked": self.masked,
            "mask_level": self.mask_level.as_str(),
            "masked_fields": self.masked_fields,
            "note": self.note,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MaskOutcome {
    pub record: Value,
    pub manifest: MaskingManifest,
    /// Set when the failure policy produced the record instead of the rules.
    pub failure: Option<MaskingError>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DataMasker {
    level: MaskLevel,
    policy: MaskingFailurePolicy,
}

impl DataMasker {
    pub fn new(level: MaskLevel) -> Self {
        Self { level, policy: MaskingFailurePolicy::default() }
    }

    pub fn with_policy(mut self, policy: MaskingFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn level(&self) -> MaskLevel {
        self.level
    }

    /// Mask a record, falling back to the configured failure policy. Never panics.
    pub fn mask(&self, record: &Value) -> MaskOutcome {
        match self.try_mask(record) {
            Ok((record, manifest)) => {
                info!(
                    level = %self.level,
                    fields = manifest.masked_fields.len(),
                    "record masked"
                );
                MaskOutcome { record, manifest, failure: None }
            }
            Err(e) => match self.policy {
                MaskingFailurePolicy::FailClosed => {
                    error!(error = %e, "masking failed, redacting every value");
                    let manifest = MaskingManifest::new(true, self.level, Vec::new());
                    let mut redacted = redact(record, 0);
                    if let Value::Object(map) = &mut redacted {
                        map.insert(MASKING_METADATA_KEY.to_string(), manifest.to_value());
                    }
                    MaskOutcome { record: redacted, manifest, failure: Some(e) }
                }
                MaskingFailurePolicy::FailOpen => {
                    warn!(error = %e, "masking failed, returning the record unmasked");
                    MaskOutcome {
                        record: record.clone(),
                        manifest: MaskingManifest::new(false, self.level, Vec::new()),
                        failure: Some(e),
                    }
                }
            },
        }
    }

    /// Apply the masking rules without any failure policy.
    pub fn try_mask(&self, record: &Value) -> Result<(Value, MaskingManifest), MaskingError> {
        let Value::Object(root) = record else {
            return Err(MaskingError::UnsupportedShape(shape_name(record)));
        };

        let mut session = MaskingSession::new(self.level);
        let mut masked = session.mask_object(root, "", None, 1)?;

        let manifest = MaskingManifest::new(true, self.level, session.finish());
        masked.insert(MASKING_METADATA_KEY.to_string(), manifest.to_value());
        Ok((Value::Object(masked), manifest))
    }
}

/// Per-call accumulator of masked paths.
struct MaskingSession {
    level: MaskLevel,
    masked_fields: Vec<String>,
}

impl MaskingSession {
    fn new(level: MaskLevel) -> Self {
        Self { level, masked_fields: Vec::new() }
    }

    fn finish(self) -> Vec<String> {
        self.masked_fields
    }

    fn record(&mut self, path: String) {
        self.masked_fields.push(path);
    }

    fn mask_object(
        &mut self,
        map: &Map<String, Value>,
        path: &str,
        owner: Option<&str>,
        depth: usize,
    ) -> Result<Map<String, Value>, MaskingError> {
        if depth > MAX_MASKING_DEPTH {
            return Err(MaskingError::DepthExceeded(MAX_MASKING_DEPTH));
        }

        let mut masked = Map::new();
        for (key, value) in map {
            // Stale metadata from an earlier pass is replaced, not walked.
            if depth == 1 && key == MASKING_METADATA_KEY {
                continue;
            }
            let field_path = join_path(path, key);
            let value = self.mask_field(key, value, field_path, owner, depth)?;
            masked.insert(key.clone(), value);
        }
        Ok(masked)
    }

    fn mask_field(
        &mut self,
        key: &str,
        value: &Value,
        path: String,
        owner: Option<&str>,
        depth: usize,
    ) -> Result<Value, MaskingError> {
        if let Some(kind) = rules::classify_key(key, owner, self.level) {
            if let Some(text) = sensitive_text(value) {
                self.record(path);
                return Ok(Value::String(rules::apply(kind, &text, self.level)));
            }
        }

        if let (Some(kind), Value::Array(items)) = (rules::contact_list_kind(key), value) {
            return self.mask_contact_list(kind, items, &path, key, depth);
        }

        if rules::is_text_blob(key) {
            if let Value::String(text) = value {
                // A blob that is a whole email or phone number takes the content rule.
                if rules::classify_content(text).is_none() {
                    let masked = rules::mask_text_blob(text, self.level);
                    if masked != text.as_str() {
                        let masked = masked.into_owned();
                        self.record(path);
                        return Ok(Value::String(masked));
                    }
                    return Ok(value.clone());
                }
            }
        }

        self.mask_value(value, path, Some(key), depth)
    }

    fn mask_contact_list(
        &mut self,
        kind: SensitiveKind,
        items: &[Value],
        path: &str,
        key: &str,
        depth: usize,
    ) -> Result<Value, MaskingError> {
        let mut masked = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let item_path = join_path(path, &idx.to_string());
            match item {
                Value::String(text) if !text.is_empty() => {
                    self.record(item_path);
                    masked.push(Value::String(rules::apply(kind, text, self.level)));
                }
                other => masked.push(self.mask_value(other, item_path, Some(key), depth)?),
            }
        }
        Ok(Value::Array(masked))
    }

    fn mask_value(
        &mut self,
        value: &Value,
        path: String,
        owner: Option<&str>,
        depth: usize,
    ) -> Result<Value, MaskingError> {
        match value {
            Value::Object(map) => Ok(Value::Object(self.mask_object(map, &path, owner, depth + 1)?)),
            Value::Array(items) => {
                if depth + 1 > MAX_MASKING_DEPTH {
                    return Err(MaskingError::DepthExceeded(MAX_MASKING_DEPTH));
                }
                let mut masked = Vec::with_capacity(items.len());
                for (idx, item) in items.iter().enumerate() {
                    let item_path = join_path(&path, &idx.to_string());
                    masked.push(self.mask_value(item, item_path, owner, depth + 1)?);
                }
                Ok(Value::Array(masked))
            }
            Value::String(text) => match rules::classify_content(text) {
                Some(kind) => {
                    self.record(path);
                    Ok(Value::String(rules::apply(kind, text, self.level)))
                }
                None => Ok(value.clone()),
            },
            _ => Ok(value.clone()),
        }
    }
}

/// Text to mask under a sensitive key; numbers are masked as their decimal form.
fn sensitive_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn join_path(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", parent, segment)
    }
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Replace every scalar leaf with the redaction marker. Subtrees past the depth
/// ceiling collapse into a single marker.
fn redact(value: &Value, depth: usize) -> Value {
    if depth >= MAX_MASKING_DEPTH {
        return Value::String(REDACTED.to_string());
    }
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), redact(value, depth + 1)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|item| redact(item, depth + 1)).collect()),
        _ => Value::String(REDACTED.to_string()),
    }
}
