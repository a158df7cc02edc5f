//! Maps extracted mentions onto the canonical vocabulary.
//!
//! One lookup per distinct (case-insensitive) drug name, all in flight at
//! once. Each lookup has its own timeout and one retry; a lookup that still
//! fails leaves only its own mentions unresolved.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::Instant;

use crate::config::PipelineSettings;
use crate::models::{MedicationMention, NormalizedMedication};
use crate::reference::{ReferenceTables, VocabularyEntry};
use crate::vocabulary::{LookupError, VocabularyCandidate, VocabularyClient};

/// A lookup that failed after its retry.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupFailure {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct Normalization {
    /// Same order as the input mentions.
    pub medications: Vec<NormalizedMedication>,
    pub failures: Vec<LookupFailure>,
}

pub struct Normalizer {
    client: Arc<dyn VocabularyClient>,
    acceptance_threshold: f64,
    lookup_timeout: Duration,
    retry_backoff: Duration,
}

impl Normalizer {
    pub fn new(
        client: Arc<dyn VocabularyClient>,
        acceptance_threshold: f64,
        lookup_timeout: Duration,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            client,
            acceptance_threshold,
            lookup_timeout,
            retry_backoff,
        }
    }

    pub fn from_settings(client: Arc<dyn VocabularyClient>, settings: &PipelineSettings) -> Self {
        Self::new(
            client,
            settings.acceptance_threshold,
            settings.lookup_timeout(),
            settings.lookup_retry_backoff(),
        )
    }

    /// Normalize a single mention with no request deadline beyond the
    /// per-lookup timeout.
    pub async fn normalize(
        &self,
        mention: MedicationMention,
        tables: &ReferenceTables,
    ) -> NormalizedMedication {
        let deadline = Instant::now() + self.lookup_timeout * 2 + self.retry_backoff;
        let lookup = self
            .lookup_with_retry(&mention.drug_name, tables, deadline)
            .await;
        match lookup {
            Ok(candidates) => self.resolve(mention, &candidates, tables),
            Err(_) => NormalizedMedication::unresolved(mention),
        }
    }

    /// Normalize every mention, finishing no later than `deadline` (plus
    /// scheduling slack).
    pub async fn normalize_all(
        &self,
        mentions: Vec<MedicationMention>,
        tables: &ReferenceTables,
        deadline: Instant,
    ) -> Normalization {
        let mut distinct: Vec<String> = Vec::new();
        for mention in &mentions {
            let key = lookup_key(&mention.drug_name);
            if !distinct.contains(&key) {
                distinct.push(key);
            }
        }

        let results = join_all(
            distinct
                .iter()
                .map(|name| self.lookup_with_retry(name, tables, deadline)),
        )
        .await;
        let lookups: HashMap<String, Result<Vec<VocabularyCandidate>, LookupError>> =
            distinct.into_iter().zip(results).collect();

        let mut failures = Vec::new();
        for (name, result) in &lookups {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Vocabulary lookup failed");
                failures.push(LookupFailure {
                    name: name.clone(),
                    reason: e.to_string(),
                });
            }
        }
        failures.sort_by(|a, b| a.name.cmp(&b.name));

        let medications: Vec<NormalizedMedication> = mentions
            .into_iter()
            .map(|mention| match lookups.get(&lookup_key(&mention.drug_name)) {
                Some(Ok(candidates)) => self.resolve(mention, candidates, tables),
                _ => NormalizedMedication::unresolved(mention),
            })
            .collect();

        tracing::info!(
            medications = medications.len(),
            resolved = medications.iter().filter(|m| m.is_resolved()).count(),
            failed_lookups = failures.len(),
            "Normalization complete"
        );
        Normalization {
            medications,
            failures,
        }
    }

    async fn lookup_with_retry(
        &self,
        name: &str,
        tables: &ReferenceTables,
        deadline: Instant,
    ) -> Result<Vec<VocabularyCandidate>, LookupError> {
        let mut last_error = LookupError::Timeout(0);
        for attempt in 0..2 {
            if attempt > 0 {
                if Instant::now() + self.retry_backoff >= deadline {
                    break;
                }
                tokio::time::sleep(self.retry_backoff).await;
                tracing::debug!(attempt, "Retrying vocabulary lookup");
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let budget = self.lookup_timeout.min(remaining);
            match tokio::time::timeout(budget, self.client.lookup(name, tables)).await {
                Ok(Ok(candidates)) => return Ok(candidates),
                Ok(Err(LookupError::EmptyQuery)) => return Err(LookupError::EmptyQuery),
                Ok(Err(e)) => last_error = e,
                Err(_) => last_error = LookupError::Timeout(budget.as_millis()),
            }
        }
        Err(last_error)
    }

    fn resolve(
        &self,
        mention: MedicationMention,
        candidates: &[VocabularyCandidate],
        tables: &ReferenceTables,
    ) -> NormalizedMedication {
        let Some(best) = select_candidate(candidates, &mention.drug_name, self.acceptance_threshold)
        else {
            tracing::debug!(candidates = candidates.len(), "No candidate above threshold");
            return NormalizedMedication::unresolved(mention);
        };

        let entry = reference_entry(tables, best);
        let normalization_confidence = mention.extraction_confidence * best.match_score;
        NormalizedMedication {
            candidate_id: Some(best.candidate_id.clone()),
            canonical_name: Some(best.canonical_name.clone()),
            generic_name: entry.map(|e| e.name.clone()),
            therapeutic_class: entry.map(|e| e.therapeutic_class.clone()),
            match_score: Some(best.match_score),
            normalization_confidence,
            mention,
        }
    }
}

fn lookup_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Best candidate at or above `threshold`: highest score, then longest
/// common prefix with the raw name, then lowest id.
pub fn select_candidate<'a>(
    candidates: &'a [VocabularyCandidate],
    raw_name: &str,
    threshold: f64,
) -> Option<&'a VocabularyCandidate> {
    let raw = raw_name.trim().to_lowercase();
    candidates
        .iter()
        .filter(|c| c.match_score.is_finite() && c.match_score >= threshold)
        .min_by(|a, b| {
            b.match_score
                .total_cmp(&a.match_score)
                .then_with(|| {
                    common_prefix_len(&b.canonical_name, &raw)
                        .cmp(&common_prefix_len(&a.canonical_name, &raw))
                })
                .then_with(|| compare_ids(&a.candidate_id, &b.candidate_id))
        })
}

fn common_prefix_len(canonical: &str, raw_lower: &str) -> usize {
    canonical
        .to_lowercase()
        .chars()
        .zip(raw_lower.chars())
        .take_while(|(a, b)| a == b)
        .count()
}

/// RxCUIs compare numerically; anything else lexicographically.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// Reference entry for an accepted candidate: by id, then by the canonical
/// name, then by its leading ingredient word ("aspirin 100 mg oral tablet").
fn reference_entry<'a>(
    tables: &'a ReferenceTables,
    candidate: &VocabularyCandidate,
) -> Option<&'a VocabularyEntry> {
    tables
        .entry_by_id(&candidate.candidate_id)
        .or_else(|| tables.entry_by_name(&candidate.canonical_name))
        .or_else(|| {
            candidate
                .canonical_name
                .split_whitespace()
                .next()
                .and_then(|first| tables.entry_by_name(first))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractionSource, TextSpan};
    use crate::vocabulary::{LocalVocabulary, MockVocabularyClient};

    fn mention(name: &str, confidence: f64) -> MedicationMention {
        MedicationMention {
            raw_text: name.into(),
            span: TextSpan {
                start: 0,
                end: name.len(),
            },
            drug_name: name.into(),
            strength: None,
            route: None,
            frequency: None,
            duration_days: None,
            extraction_confidence: confidence,
            extraction_source: ExtractionSource::PatternFallback,
        }
    }

    fn candidate(id: &str, name: &str, score: f64) -> VocabularyCandidate {
        VocabularyCandidate {
            candidate_id: id.into(),
            canonical_name: name.into(),
            match_score: score,
        }
    }

    fn normalizer(client: Arc<dyn VocabularyClient>) -> Normalizer {
        Normalizer::new(
            client,
            0.6,
            Duration::from_millis(200),
            Duration::from_millis(10),
        )
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[test]
    fn select_prefers_score_then_prefix_then_id() {
        let candidates = vec![
            candidate("300", "warfarin sodium", 0.9),
            candidate("200", "coumadin", 0.9),
            candidate("100", "warfarin", 0.9),
            candidate("50", "wafer", 0.5),
        ];
        let best = select_candidate(&candidates, "Warfarin", 0.6).unwrap();
        assert_eq!(best.candidate_id, "100");

        let candidates = vec![candidate("20", "drug b", 0.8), candidate("3", "drug a", 0.8)];
        assert_eq!(select_candidate(&candidates, "x", 0.6).unwrap().candidate_id, "3");
    }

    #[test]
    fn never_accepts_below_threshold() {
        let candidates = vec![candidate("1", "aspirin", 0.59), candidate("2", "asp", f64::NAN)];
        assert!(select_candidate(&candidates, "aspirin", 0.6).is_none());
        assert!(select_candidate(&candidates, "aspirin", 0.5).is_some());
    }

    #[tokio::test]
    async fn resolves_and_enriches_from_reference() {
        let tables = ReferenceTables::builtin();
        let client = Arc::new(LocalVocabulary::new(5));
        let med = normalizer(client).normalize(mention("Coumadin", 0.9), &tables).await;

        assert_eq!(med.candidate_id.as_deref(), Some("11289"));
        assert_eq!(med.generic_name.as_deref(), Some("warfarin"));
        assert_eq!(med.therapeutic_class.as_deref(), Some("anticoagulant"));
        assert!((med.normalization_confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn remote_product_name_maps_to_ingredient() {
        let tables = ReferenceTables::builtin();
        let client = Arc::new(
            MockVocabularyClient::new()
                .with_candidates("aspirin", &[("243670", "aspirin 81 mg oral tablet", 0.8)]),
        );
        let med = normalizer(client).normalize(mention("Aspirin", 0.95), &tables).await;
        assert_eq!(med.generic_name.as_deref(), Some("aspirin"));
        assert!(med.normalization_confidence <= 0.95 * 0.8 + 1e-12);
    }

    #[tokio::test]
    async fn no_candidate_is_unresolved() {
        let tables = ReferenceTables::builtin();
        let client = Arc::new(MockVocabularyClient::new());
        let med = normalizer(client).normalize(mention("Zyntrafen", 0.9), &tables).await;
        assert!(!med.is_resolved());
        assert_eq!(med.normalization_confidence, 0.0);
    }

    #[tokio::test]
    async fn one_lookup_per_distinct_name() {
        let tables = ReferenceTables::builtin();
        let client = Arc::new(
            MockVocabularyClient::new().with_candidates("warfarin", &[("11289", "warfarin", 1.0)]),
        );
        let result = normalizer(client.clone())
            .normalize_all(
                vec![mention("Warfarin", 0.9), mention("warfarin", 0.8)],
                &tables,
                far_deadline(),
            )
            .await;
        assert_eq!(client.calls(), 1);
        assert!(result.medications.iter().all(|m| m.is_resolved()));
    }

    #[tokio::test]
    async fn transient_failure_retried_once() {
        let tables = ReferenceTables::builtin();
        let client = Arc::new(
            MockVocabularyClient::new()
                .with_candidates("aspirin", &[("1191", "aspirin", 1.0)])
                .failing_times("aspirin", 1),
        );
        let result = normalizer(client.clone())
            .normalize_all(vec![mention("Aspirin", 0.9)], &tables, far_deadline())
            .await;
        assert_eq!(client.calls(), 2);
        assert!(result.medications[0].is_resolved());
        assert!(result.failures.is_empty());
    }

    #[tokio::test]
    async fn failed_lookup_degrades_only_its_mention() {
        let tables = ReferenceTables::builtin();
        let client = Arc::new(
            MockVocabularyClient::new()
                .with_candidates("aspirin", &[("1191", "aspirin", 1.0)])
                .failing_for("warfarin"),
        );
        let result = normalizer(client.clone())
            .normalize_all(
                vec![mention("Warfarin", 0.9), mention("Aspirin", 0.9)],
                &tables,
                far_deadline(),
            )
            .await;
        assert!(!result.medications[0].is_resolved());
        assert!(result.medications[1].is_resolved());
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].name, "warfarin");
        // initial attempt + one retry for warfarin, one call for aspirin
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn slow_lookup_times_out_without_blocking_others() {
        let tables = ReferenceTables::builtin();
        let client = Arc::new(
            MockVocabularyClient::new()
                .with_candidates("aspirin", &[("1191", "aspirin", 1.0)])
                .with_delay("warfarin", Duration::from_secs(10)),
        );
        let started = std::time::Instant::now();
        let result = normalizer(client)
            .normalize_all(
                vec![mention("Warfarin", 0.9), mention("Aspirin", 0.9)],
                &tables,
                far_deadline(),
            )
            .await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!result.medications[0].is_resolved());
        assert!(result.medications[1].is_resolved());
        assert!(result.failures[0].reason.contains("timed out"));
    }
}
