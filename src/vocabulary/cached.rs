use std::sync::Arc;

use async_trait::async_trait;

use crate::reference::ReferenceTables;

use super::{merge_candidates, LocalVocabulary, LookupError, VocabularyCandidate, VocabularyClient};

/// Remote vocabulary fronted by the offline table.
///
/// An exact local hit answers without touching the network. Anything else
/// goes to the remote service and its candidates are merged with the local
/// fuzzy ones. Remote failures propagate so the caller can retry or degrade.
pub struct CachedVocabulary {
    local: LocalVocabulary,
    remote: Arc<dyn VocabularyClient>,
}

impl CachedVocabulary {
    pub fn new(local: LocalVocabulary, remote: Arc<dyn VocabularyClient>) -> Self {
        Self { local, remote }
    }
}

#[async_trait]
impl VocabularyClient for CachedVocabulary {
    fn name(&self) -> &'static str {
        "cached"
    }

    async fn lookup(
        &self,
        name: &str,
        tables: &ReferenceTables,
    ) -> Result<Vec<VocabularyCandidate>, LookupError> {
        let local = self.local.lookup(name, tables).await?;
        if local.first().is_some_and(|c| c.match_score >= 1.0) {
            tracing::debug!(name = %name, "Vocabulary answered locally");
            return Ok(local);
        }

        let remote = self.remote.lookup(name, tables).await?;
        let limit = local.len().max(remote.len());
        Ok(merge_candidates(local.into_iter().chain(remote), limit))
    }
}
