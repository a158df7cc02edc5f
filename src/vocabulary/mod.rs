//! Canonical drug vocabulary lookup.
//!
//! [`VocabularyClient`] is the request/response contract with the lookup
//! service: a drug name in, an ordered candidate list out. An empty list is a
//! valid "no match"; transport problems are [`LookupError`]s that the
//! normalizer turns into unresolved medications.

mod cached;
mod local;
mod mock;
mod rxnav;

pub use cached::CachedVocabulary;
pub use local::LocalVocabulary;
pub use mock::MockVocabularyClient;
pub use rxnav::RxNavClient;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{PipelineSettings, VocabularyMode};
use crate::reference::ReferenceTables;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LookupError {
    #[error("Empty lookup query")]
    EmptyQuery,

    #[error("Vocabulary service not reachable at {0}")]
    Connection(String),

    #[error("Vocabulary lookup timed out after {0}ms")]
    Timeout(u128),

    #[error("Vocabulary service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing failed: {0}")]
    ResponseParsing(String),
}

/// One vocabulary match for a looked-up name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyCandidate {
    pub candidate_id: String,
    pub canonical_name: String,
    /// Similarity in `[0, 1]`.
    pub match_score: f64,
}

#[async_trait]
pub trait VocabularyClient: Send + Sync {
    fn name(&self) -> &'static str;

    /// Candidates ordered by descending score. `tables` is the request's
    /// reference snapshot; remote services ignore it.
    async fn lookup(
        &self,
        name: &str,
        tables: &ReferenceTables,
    ) -> Result<Vec<VocabularyCandidate>, LookupError>;
}

/// Merge candidate lists: one entry per id (highest score wins), ordered by
/// score descending, then id.
pub(crate) fn merge_candidates(
    lists: impl IntoIterator<Item = VocabularyCandidate>,
    limit: usize,
) -> Vec<VocabularyCandidate> {
    let mut merged: Vec<VocabularyCandidate> = Vec::new();
    for candidate in lists {
        match merged
            .iter_mut()
            .find(|c| c.candidate_id == candidate.candidate_id)
        {
            Some(existing) if existing.match_score < candidate.match_score => *existing = candidate,
            Some(_) => {}
            None => merged.push(candidate),
        }
    }
    merged.sort_by(|a, b| {
        b.match_score
            .total_cmp(&a.match_score)
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });
    merged.truncate(limit);
    merged
}

/// Select the vocabulary client for this process.
pub fn build_vocabulary(
    settings: &PipelineSettings,
) -> Result<Arc<dyn VocabularyClient>, LookupError> {
    let local = LocalVocabulary::new(settings.max_candidates);
    let client: Arc<dyn VocabularyClient> = match settings.vocabulary.mode {
        VocabularyMode::Offline => Arc::new(local),
        VocabularyMode::Rxnav => {
            let remote = RxNavClient::new(
                &settings.vocabulary.base_url,
                settings.lookup_timeout(),
                settings.max_candidates,
            )?;
            Arc::new(CachedVocabulary::new(local, Arc::new(remote)))
        }
    };
    tracing::info!(vocabulary = client.name(), "Vocabulary client selected");
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, score: f64) -> VocabularyCandidate {
        VocabularyCandidate {
            candidate_id: id.into(),
            canonical_name: format!("drug {id}"),
            match_score: score,
        }
    }

    #[test]
    fn merge_keeps_best_score_per_id() {
        let merged = merge_candidates(
            vec![candidate("2", 0.7), candidate("1", 0.5), candidate("1", 0.9)],
            5,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].candidate_id, "1");
        assert!((merged[0].match_score - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn merge_orders_ties_by_id_and_truncates() {
        let merged = merge_candidates(
            vec![candidate("b", 0.8), candidate("a", 0.8), candidate("c", 0.1)],
            2,
        );
        let ids: Vec<&str> = merged.iter().map(|c| c.candidate_id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn builds_offline_client_by_default() {
        let client = build_vocabulary(&PipelineSettings::default()).unwrap();
        assert_eq!(client.name(), "offline");
    }
}
