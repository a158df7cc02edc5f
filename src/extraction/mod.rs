//! Medication extraction from free-text prescriptions.
//!
//! Two variants sit behind [`MedicationExtractor`]: the model-backed
//! [`LearnedExtractor`] and the rule-based [`PatternExtractor`]. The variant is
//! chosen once at startup by [`build_extractor`].

pub mod grammar;
pub mod learned;
pub mod pattern;
pub mod preprocess;

pub use learned::{HttpTokenClassifier, LearnedExtractor, MockTokenClassifier, TokenClassifier, TokenEntity};
pub use pattern::PatternExtractor;
pub use preprocess::{preprocess, truncate_chars, Preprocessed};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{ExtractorMode, ExtractorSettings};
use crate::models::{ExtractionSource, MedicationMention};
use crate::reference::Gazetteer;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Token classifier not reachable at {0}")]
    ClassifierConnection(String),

    #[error("Token classifier returned {status}: {body}")]
    ClassifierStatus { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing failed: {0}")]
    ResponseParsing(String),
}

/// Mentions plus how they were obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub mentions: Vec<MedicationMention>,
    pub source: ExtractionSource,
    /// Why the learned path was abandoned, when it was.
    pub degraded: Option<String>,
}

/// Turns preprocessed prescription text into medication mentions.
///
/// Extraction never fails outright: a variant that cannot do its job
/// degrades to the pattern path and says so in [`Extraction::degraded`].
/// `gazetteer` comes from the request's reference snapshot.
#[async_trait]
pub trait MedicationExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, text: &str, gazetteer: &Gazetteer) -> Extraction;
}

/// Select the extractor variant for this process.
pub fn build_extractor(
    settings: &ExtractorSettings,
) -> Result<Arc<dyn MedicationExtractor>, ExtractionError> {
    let pattern = PatternExtractor::new();
    let extractor: Arc<dyn MedicationExtractor> = match settings.mode {
        ExtractorMode::Pattern => Arc::new(pattern),
        ExtractorMode::Learned => {
            let classifier = HttpTokenClassifier::new(
                &settings.endpoint,
                settings.api_token.clone(),
                std::time::Duration::from_millis(settings.timeout_ms),
            )?;
            Arc::new(LearnedExtractor::new(
                Arc::new(classifier),
                pattern,
                settings.min_confidence,
            ))
        }
    };
    tracing::info!(extractor = extractor.name(), "Medication extractor selected");
    Ok(extractor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_selected_variant() {
        let pattern = build_extractor(&ExtractorSettings::default()).unwrap();
        assert_eq!(pattern.name(), "pattern");

        let settings = ExtractorSettings {
            mode: ExtractorMode::Learned,
            endpoint: "http://127.0.0.1:9/ner".into(),
            ..Default::default()
        };
        let learned = build_extractor(&settings).unwrap();
        assert_eq!(learned.name(), "learned");
    }

    #[tokio::test]
    async fn unreachable_classifier_degrades() {
        let settings = ExtractorSettings {
            mode: ExtractorMode::Learned,
            endpoint: "http://127.0.0.1:9/ner".into(),
            timeout_ms: 500,
            ..Default::default()
        };
        let extractor = build_extractor(&settings).unwrap();
        let extraction = extractor
            .extract("Aspirin 100mg OD", &Gazetteer::new(["aspirin"]))
            .await;
        assert_eq!(extraction.source, ExtractionSource::PatternFallback);
        assert!(extraction.degraded.is_some());
        assert_eq!(extraction.mentions.len(), 1);
    }
}
