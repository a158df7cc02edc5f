use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::reference::ReferenceTables;

use super::{LookupError, VocabularyCandidate, VocabularyClient};

/// Scripted vocabulary for tests. Unknown names return no candidates.
#[derive(Default)]
pub struct MockVocabularyClient {
    candidates: HashMap<String, Vec<VocabularyCandidate>>,
    always_fail: Vec<String>,
    /// Remaining failures before a name starts succeeding.
    transient_failures: Mutex<HashMap<String, usize>>,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
}

impl MockVocabularyClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candidates(mut self, name: &str, candidates: &[(&str, &str, f64)]) -> Self {
        self.candidates.insert(
            name.to_lowercase(),
            candidates
                .iter()
                .map(|(id, canonical, score)| VocabularyCandidate {
                    candidate_id: (*id).to_string(),
                    canonical_name: (*canonical).to_string(),
                    match_score: *score,
                })
                .collect(),
        );
        self
    }

    pub fn failing_for(mut self, name: &str) -> Self {
        self.always_fail.push(name.to_lowercase());
        self
    }

    pub fn failing_times(self, name: &str, times: usize) -> Self {
        if let Ok(mut failures) = self.transient_failures.lock() {
            failures.insert(name.to_lowercase(), times);
        }
        self
    }

    pub fn with_delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_lowercase(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VocabularyClient for MockVocabularyClient {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn lookup(
        &self,
        name: &str,
        _tables: &ReferenceTables,
    ) -> Result<Vec<VocabularyCandidate>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = name.trim().to_lowercase();

        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        if self.always_fail.contains(&key) {
            return Err(LookupError::Connection("mock".into()));
        }
        if let Ok(mut failures) = self.transient_failures.lock() {
            if let Some(remaining) = failures.get_mut(&key).filter(|n| **n > 0) {
                *remaining -= 1;
                return Err(LookupError::Connection("mock".into()));
            }
        }
        Ok(self.candidates.get(&key).cloned().unwrap_or_default())
    }
}
