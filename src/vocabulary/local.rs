use async_trait::async_trait;
use strsim::{jaro_winkler, normalized_levenshtein};

use crate::reference::{ReferenceTables, VocabularyEntry};

use super::{merge_candidates, LookupError, VocabularyCandidate, VocabularyClient};

/// Candidates scoring below this are noise, not matches.
const MIN_SIMILARITY: f64 = 0.5;

/// Offline lookup against the vocabulary table of the request's snapshot.
///
/// Exact name or synonym hits score 1.0; everything else gets a blended
/// Jaro-Winkler / normalized Levenshtein similarity.
pub struct LocalVocabulary {
    max_candidates: usize,
}

impl LocalVocabulary {
    pub fn new(max_candidates: usize) -> Self {
        Self { max_candidates }
    }
}

/// Jaro-Winkler favours shared prefixes (typos), Levenshtein overall shape.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    jaro_winkler(a, b) * 0.6 + normalized_levenshtein(a, b) * 0.4
}

fn score_entry(query: &str, entry: &VocabularyEntry) -> f64 {
    if entry.matches_name(query) {
        return 1.0;
    }
    std::iter::once(entry.name.as_str())
        .chain(entry.synonyms.iter().map(String::as_str))
        .map(|name| name_similarity(query, &name.to_lowercase()))
        .fold(0.0, f64::max)
}

#[async_trait]
impl VocabularyClient for LocalVocabulary {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn lookup(
        &self,
        name: &str,
        tables: &ReferenceTables,
    ) -> Result<Vec<VocabularyCandidate>, LookupError> {
        let query = name.trim().to_lowercase();
        if query.is_empty() {
            return Err(LookupError::EmptyQuery);
        }

        let scored = tables.vocabulary().iter().filter_map(|entry| {
            let score = score_entry(&query, entry);
            (score >= MIN_SIMILARITY).then(|| VocabularyCandidate {
                candidate_id: entry.id.clone(),
                canonical_name: entry.name.clone(),
                match_score: score,
            })
        });
        Ok(merge_candidates(scored, self.max_candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{ReferenceStore, TherapeuticClass};

    async fn lookup(name: &str) -> Result<Vec<VocabularyCandidate>, LookupError> {
        LocalVocabulary::new(5)
            .lookup(name, &ReferenceTables::builtin())
            .await
    }

    #[tokio::test]
    async fn exact_and_synonym_hits_score_one() {
        let hits = lookup("Aspirin").await.unwrap();
        assert_eq!(hits[0].candidate_id, "1191");
        assert!((hits[0].match_score - 1.0).abs() < f64::EPSILON);

        let hits = lookup("Coumadin").await.unwrap();
        assert_eq!(hits[0].canonical_name, "warfarin");
        assert!((hits[0].match_score - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn misspelling_scores_high_but_below_one() {
        let hits = lookup("amoxicilin").await.unwrap();
        assert_eq!(hits[0].canonical_name, "amoxicillin");
        assert!(hits[0].match_score > 0.85 && hits[0].match_score < 1.0);
    }

    #[tokio::test]
    async fn unknown_name_has_no_strong_candidate() {
        let hits = lookup("qxvbelmtrap").await.unwrap();
        assert!(hits.iter().all(|c| c.match_score < 0.6));
    }

    #[tokio::test]
    async fn blank_query_rejected() {
        assert_eq!(lookup("  ").await.unwrap_err(), LookupError::EmptyQuery);
    }

    #[tokio::test]
    async fn reads_the_tables_it_is_given() {
        let store = ReferenceStore::builtin();
        let before = store.snapshot().unwrap();
        let replacement = ReferenceTables::from_parts(
            vec![VocabularyEntry {
                id: "99999".into(),
                name: "zyntrafen".into(),
                synonyms: vec![],
                therapeutic_class: "analgesic".into(),
                typical_single_dose_mg: Some(50.0),
                typical_times_per_day: Some(2),
                evidence_confidence: 0.8,
            }],
            vec![TherapeuticClass {
                name: "analgesic".into(),
                substitute_classes: vec![],
            }],
            vec![],
            vec![],
        )
        .unwrap();
        store.replace(replacement).unwrap();

        // a request that snapshotted before the swap still sees the old table
        let local = LocalVocabulary::new(5);
        let hits = local.lookup("warfarin", &before).await.unwrap();
        assert_eq!(hits[0].candidate_id, "11289");
        let stale = local.lookup("zyntrafen", &before).await.unwrap();
        assert!(stale.iter().all(|c| c.candidate_id != "99999"));

        let after = store.snapshot().unwrap();
        let hits = local.lookup("zyntrafen", &after).await.unwrap();
        assert_eq!(hits[0].candidate_id, "99999");
    }

    #[test]
    fn similarity_is_symmetric_for_identical() {
        assert!((name_similarity("warfarin", "warfarin") - 1.0).abs() < f64::EPSILON);
        assert!(name_similarity("warfarin", "metformin") < 0.8);
    }
}
