use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::reference::ReferenceTables;

use super::{merge_candidates, LookupError, VocabularyCandidate, VocabularyClient};

static RE_UNSAFE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s-]").unwrap());

/// NLM RxNav approximate-term client.
pub struct RxNavClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
    max_entries: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApproximateTermResponse {
    #[serde(default)]
    approximate_group: ApproximateGroup,
}

#[derive(Debug, Default, Deserialize)]
struct ApproximateGroup {
    #[serde(default)]
    candidate: Vec<RxCandidate>,
}

#[derive(Debug, Deserialize)]
struct RxCandidate {
    rxcui: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    score: Option<RxScore>,
}

/// RxNav has shipped the score both as a string and as a number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RxScore {
    Number(f64),
    Text(String),
}

impl RxScore {
    /// RxNav scores run 0..100.
    fn normalized(&self) -> Option<f64> {
        let raw = match self {
            RxScore::Number(n) => *n,
            RxScore::Text(s) => s.trim().parse().ok()?,
        };
        raw.is_finite().then(|| (raw / 100.0).clamp(0.0, 1.0))
    }
}

/// Strip characters RxNav rejects in a term.
pub fn clean_term(name: &str) -> String {
    RE_UNSAFE.replace_all(name, "").trim().to_string()
}

impl RxNavClient {
    pub fn new(base_url: &str, timeout: Duration, max_entries: usize) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .user_agent(crate::config::user_agent())
            .timeout(timeout)
            .build()
            .map_err(|e| LookupError::HttpClient(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
            max_entries,
        })
    }
}

#[async_trait]
impl VocabularyClient for RxNavClient {
    fn name(&self) -> &'static str {
        "rxnav"
    }

    async fn lookup(
        &self,
        name: &str,
        _tables: &ReferenceTables,
    ) -> Result<Vec<VocabularyCandidate>, LookupError> {
        let term = clean_term(name);
        if term.is_empty() {
            return Err(LookupError::EmptyQuery);
        }

        let url = format!("{}/approximateTerm.json", self.base_url);
        let max_entries = self.max_entries.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[("term", term.as_str()), ("maxEntries", max_entries.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    LookupError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    LookupError::Timeout(self.timeout.as_millis())
                } else {
                    LookupError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LookupError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ApproximateTermResponse = response
            .json()
            .await
            .map_err(|e| LookupError::ResponseParsing(e.to_string()))?;

        let candidates = parsed
            .approximate_group
            .candidate
            .into_iter()
            .filter(|c| !c.rxcui.is_empty())
            .map(|c| VocabularyCandidate {
                match_score: c.score.as_ref().and_then(RxScore::normalized).unwrap_or(0.0),
                canonical_name: c
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| term.clone())
                    .to_lowercase(),
                candidate_id: c.rxcui,
            });
        let candidates = merge_candidates(candidates, self.max_entries);

        tracing::debug!(term = %term, count = candidates.len(), "RxNav lookup");
        Ok(candidates)
    }
}
