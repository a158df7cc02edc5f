//! Pipeline settings.
//!
//! Resolution order: built-in defaults, then an optional JSON file, then
//! `RXGUARD_*` environment variables. The result is validated before use.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::enums::str_enum;
use crate::models::ParseEnumError;

/// Application-level constants
pub const APP_NAME: &str = "rxguard";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User agent sent by the outbound HTTP clients.
pub fn user_agent() -> String {
    format!("{APP_NAME}/{APP_VERSION}")
}

const ENV_PREFIX: &str = "RXGUARD_";

pub const DEFAULT_RXNAV_BASE_URL: &str = "https://rxnav.nlm.nih.gov/REST";
pub const DEFAULT_NER_MODEL: &str = "d4data/biomedical-ner-all";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "rxguard_lib=info,rxguard=info,warn"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file read failed ({0}): {1}")]
    Read(String, String),

    #[error("Config file parse failed ({0}): {1}")]
    Parse(String, String),

    #[error("Invalid setting `{field}`: {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.into(),
    }
}

str_enum!(
    /// Which extractor variant runs at startup.
    ExtractorMode {
        Pattern => "pattern",
        Learned => "learned",
    }
);

str_enum!(
    /// Where the normalizer looks up candidates.
    VocabularyMode {
        Offline => "offline",
        Rxnav => "rxnav",
    }
);

// ═══════════════════════════════════════════════════════════
// Settings
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorSettings {
    pub mode: ExtractorMode,
    /// Token-classification endpoint (HuggingFace inference style).
    pub endpoint: String,
    pub api_token: Option<String>,
    /// Learned mentions below this confidence trigger the pattern fallback.
    pub min_confidence: f64,
    pub timeout_ms: u64,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            mode: ExtractorMode::Pattern,
            endpoint: format!("https://api-inference.huggingface.co/models/{DEFAULT_NER_MODEL}"),
            api_token: None,
            min_confidence: 0.5,
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularySettings {
    pub mode: VocabularyMode,
    pub base_url: String,
}

impl Default for VocabularySettings {
    fn default() -> Self {
        Self {
            mode: VocabularyMode::Offline,
            base_url: DEFAULT_RXNAV_BASE_URL.to_string(),
        }
    }
}

/// All tunables of one pipeline instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Minimum vocabulary match score for a candidate to be accepted.
    pub acceptance_threshold: f64,
    pub lookup_timeout_ms: u64,
    pub lookup_retry_backoff_ms: u64,
    /// Bound on the whole analysis.
    pub request_timeout_ms: u64,
    /// Input beyond this many characters is truncated.
    pub max_text_length: usize,
    pub max_candidates: usize,
    pub max_alternatives: usize,
    pub include_alternatives: bool,
    pub extractor: ExtractorSettings,
    pub vocabulary: VocabularySettings,
    /// Directory holding reference JSON tables; bundled tables when unset.
    pub reference_dir: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.6,
            lookup_timeout_ms: 3_000,
            lookup_retry_backoff_ms: 200,
            request_timeout_ms: 10_000,
            max_text_length: 10_000,
            max_candidates: 5,
            max_alternatives: 3,
            include_alternatives: true,
            extractor: ExtractorSettings::default(),
            vocabulary: VocabularySettings::default(),
            reference_dir: None,
        }
    }
}

impl PipelineSettings {
    /// Defaults, optional file, process environment, validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        tracing::debug!(
            extractor = settings.extractor.mode.as_str(),
            vocabulary = settings.vocabulary.mode.as_str(),
            threshold = settings.acceptance_threshold,
            "Settings resolved"
        );
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.display().to_string(), e.to_string()))?;
        serde_json::from_str(&json)
            .map_err(|e| ConfigError::Parse(path.display().to_string(), e.to_string()))
    }

    /// Apply `RXGUARD_*` overrides read through `get`.
    pub fn apply_overrides<F>(&mut self, get: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| get(&format!("{ENV_PREFIX}{name}"));

        if let Some(raw) = var("ACCEPTANCE_THRESHOLD") {
            self.acceptance_threshold = parse_value("acceptance_threshold", &raw)?;
        }
        if let Some(raw) = var("LOOKUP_TIMEOUT_MS") {
            self.lookup_timeout_ms = parse_value("lookup_timeout_ms", &raw)?;
        }
        if let Some(raw) = var("LOOKUP_RETRY_BACKOFF_MS") {
            self.lookup_retry_backoff_ms = parse_value("lookup_retry_backoff_ms", &raw)?;
        }
        if let Some(raw) = var("REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse_value("request_timeout_ms", &raw)?;
        }
        if let Some(raw) = var("MAX_TEXT_LENGTH") {
            self.max_text_length = parse_value("max_text_length", &raw)?;
        }
        if let Some(raw) = var("MAX_CANDIDATES") {
            self.max_candidates = parse_value("max_candidates", &raw)?;
        }
        if let Some(raw) = var("MAX_ALTERNATIVES") {
            self.max_alternatives = parse_value("max_alternatives", &raw)?;
        }
        if let Some(raw) = var("INCLUDE_ALTERNATIVES") {
            self.include_alternatives = parse_value("include_alternatives", &raw)?;
        }
        if let Some(raw) = var("EXTRACTOR_MODE") {
            self.extractor.mode = parse_enum("extractor.mode", &raw)?;
        }
        if let Some(raw) = var("NER_ENDPOINT") {
            self.extractor.endpoint = raw;
        }
        if let Some(raw) = var("NER_TOKEN") {
            self.extractor.api_token = Some(raw);
        }
        if let Some(raw) = var("NER_MIN_CONFIDENCE") {
            self.extractor.min_confidence = parse_value("extractor.min_confidence", &raw)?;
        }
        if let Some(raw) = var("VOCABULARY_MODE") {
            self.vocabulary.mode = parse_enum("vocabulary.mode", &raw)?;
        }
        if let Some(raw) = var("RXNAV_BASE_URL") {
            self.vocabulary.base_url = raw;
        }
        if let Some(raw) = var("REFERENCE_DIR") {
            self.reference_dir = Some(PathBuf::from(raw));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.acceptance_threshold) {
            return Err(invalid("acceptance_threshold", "must be within 0.0-1.0"));
        }
        if !(0.0..=1.0).contains(&self.extractor.min_confidence) {
            return Err(invalid("extractor.min_confidence", "must be within 0.0-1.0"));
        }
        for (field, value) in [
            ("lookup_timeout_ms", self.lookup_timeout_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("extractor.timeout_ms", self.extractor.timeout_ms),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be positive"));
            }
        }
        if self.max_text_length == 0 {
            return Err(invalid("max_text_length", "must be positive"));
        }
        if self.max_candidates == 0 {
            return Err(invalid("max_candidates", "must be positive"));
        }
        if self.extractor.mode == ExtractorMode::Learned && self.extractor.endpoint.is_empty() {
            return Err(invalid("extractor.endpoint", "required in learned mode"));
        }
        if self.vocabulary.mode == VocabularyMode::Rxnav && self.vocabulary.base_url.is_empty() {
            return Err(invalid("vocabulary.base_url", "required in rxnav mode"));
        }
        Ok(())
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn lookup_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.lookup_retry_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn parse_value<T: FromStr>(field: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| invalid(field, format!("cannot parse {raw:?}")))
}

fn parse_enum<T>(field: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr<Err = ParseEnumError>,
{
    raw.trim()
        .to_lowercase()
        .parse()
        .map_err(|e: ParseEnumError| invalid(field, e.to_string()))
}
