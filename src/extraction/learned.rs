use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{ExtractionSource, MedicationMention, TextSpan};
use crate::reference::Gazetteer;

use super::grammar::{parse_duration_days, parse_frequency, parse_route, parse_strength};
use super::pattern::PatternExtractor;
use super::{Extraction, ExtractionError, MedicationExtractor};

/// One aggregated entity from a token-classification model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenEntity {
    #[serde(alias = "entity")]
    pub entity_group: String,
    pub word: String,
    pub score: f64,
    pub start: usize,
    pub end: usize,
}

/// Seam over the NER model so the extractor can be tested without a server.
#[async_trait]
pub trait TokenClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Vec<TokenEntity>, ExtractionError>;
}

// ═══════════════════════════════════════════════════════════
// HTTP classifier
// ═══════════════════════════════════════════════════════════

/// HuggingFace-inference style token-classification endpoint.
pub struct HttpTokenClassifier {
    endpoint: String,
    api_token: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    inputs: &'a str,
    parameters: ClassifyParameters,
}

#[derive(Serialize)]
struct ClassifyParameters {
    aggregation_strategy: &'static str,
}

impl HttpTokenClassifier {
    pub fn new(
        endpoint: &str,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .user_agent(crate::config::user_agent())
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractionError::HttpClient(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_token,
            client,
            timeout,
        })
    }
}

#[async_trait]
impl TokenClassifier for HttpTokenClassifier {
    async fn classify(&self, text: &str) -> Result<Vec<TokenEntity>, ExtractionError> {
        let body = ClassifyRequest {
            inputs: text,
            parameters: ClassifyParameters {
                aggregation_strategy: "simple",
            },
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                ExtractionError::ClassifierConnection(self.endpoint.clone())
            } else if e.is_timeout() {
                ExtractionError::HttpClient(format!(
                    "Request timed out after {}ms",
                    self.timeout.as_millis()
                ))
            } else {
                ExtractionError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::ClassifierStatus {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Vec<TokenEntity>>()
            .await
            .map_err(|e| ExtractionError::ResponseParsing(e.to_string()))
    }
}

/// Mock classifier for testing: returns fixed entities or a fixed failure.
pub struct MockTokenClassifier {
    entities: Vec<TokenEntity>,
    failure: Option<String>,
}

impl MockTokenClassifier {
    pub fn new(entities: Vec<TokenEntity>) -> Self {
        Self {
            entities,
            failure: None,
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            entities: vec![],
            failure: Some(reason.to_string()),
        }
    }
}

#[async_trait]
impl TokenClassifier for MockTokenClassifier {
    async fn classify(&self, _text: &str) -> Result<Vec<TokenEntity>, ExtractionError> {
        match &self.failure {
            Some(reason) => Err(ExtractionError::HttpClient(reason.clone())),
            None => Ok(self.entities.clone()),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Learned extractor
// ═══════════════════════════════════════════════════════════

/// Model-backed extractor with the pattern extractor as its safety net.
///
/// Falls back when the classifier fails, finds no medication, or every
/// medication it finds is below `min_confidence`.
pub struct LearnedExtractor {
    classifier: Arc<dyn TokenClassifier>,
    fallback: PatternExtractor,
    min_confidence: f64,
}

impl LearnedExtractor {
    pub fn new(
        classifier: Arc<dyn TokenClassifier>,
        fallback: PatternExtractor,
        min_confidence: f64,
    ) -> Self {
        Self {
            classifier,
            fallback,
            min_confidence,
        }
    }

    fn fall_back(&self, text: &str, gazetteer: &Gazetteer, reason: String) -> Extraction {
        tracing::warn!(reason = %reason, "Learned extraction degraded, using pattern fallback");
        Extraction {
            mentions: self.fallback.extract_mentions(text, gazetteer),
            source: ExtractionSource::PatternFallback,
            degraded: Some(reason),
        }
    }
}

#[async_trait]
impl MedicationExtractor for LearnedExtractor {
    fn name(&self) -> &'static str {
        "learned"
    }

    async fn extract(&self, text: &str, gazetteer: &Gazetteer) -> Extraction {
        let entities = match self.classifier.classify(text).await {
            Ok(entities) => entities,
            Err(e) => {
                return self.fall_back(text, gazetteer, format!("token classifier failed: {e}"))
            }
        };

        let mentions = group_entities(text, entities);
        if mentions.is_empty() {
            return self.fall_back(
                text,
                gazetteer,
                "token classifier found no medications".into(),
            );
        }

        let total = mentions.len();
        let confident: Vec<MedicationMention> = mentions
            .into_iter()
            .filter(|m| m.extraction_confidence >= self.min_confidence)
            .collect();
        if confident.is_empty() {
            return self.fall_back(
                text,
                gazetteer,
                format!(
                    "all {total} learned mentions below confidence {}",
                    self.min_confidence
                ),
            );
        }
        if confident.len() < total {
            tracing::debug!(
                dropped = total - confident.len(),
                "Dropped low-confidence learned mentions"
            );
        }

        Extraction {
            mentions: confident,
            source: ExtractionSource::Learned,
            degraded: None,
        }
    }
}

enum EntityKind {
    Drug,
    Strength,
    Frequency,
    Duration,
    Route,
    Other,
}

fn entity_kind(label: &str) -> EntityKind {
    match label.to_uppercase().as_str() {
        "DRUG" | "MEDICATION" | "CHEMICAL" => EntityKind::Drug,
        "DOSAGE" | "STRENGTH" | "DOSE" => EntityKind::Strength,
        "FREQUENCY" => EntityKind::Frequency,
        "DURATION" => EntityKind::Duration,
        "ROUTE" | "ADMINISTRATION" => EntityKind::Route,
        _ => EntityKind::Other,
    }
}

/// Attach each attribute entity to the nearest preceding drug entity.
///
/// Entity offsets count characters; spans on the mentions are byte offsets
/// like everywhere else.
fn group_entities(text: &str, mut entities: Vec<TokenEntity>) -> Vec<MedicationMention> {
    let offsets = CharOffsets::new(text);
    for entity in &mut entities {
        entity.start = offsets.byte_offset(entity.start);
        entity.end = offsets.byte_offset(entity.end).max(entity.start);
    }
    entities.sort_by_key(|e| e.start);

    let mut mentions: Vec<MedicationMention> = Vec::new();
    for entity in entities {
        let surface = text
            .get(entity.start..entity.end)
            .unwrap_or(entity.word.as_str())
            .trim()
            .to_string();

        match entity_kind(&entity.entity_group) {
            EntityKind::Drug => mentions.push(MedicationMention {
                raw_text: surface.clone(),
                span: TextSpan {
                    start: entity.start,
                    end: entity.end,
                },
                drug_name: surface,
                strength: None,
                route: None,
                frequency: None,
                duration_days: None,
                extraction_confidence: entity.score.clamp(0.0, 1.0),
                extraction_source: ExtractionSource::Learned,
            }),
            kind => {
                let Some(current) = mentions.last_mut() else {
                    continue;
                };
                match kind {
                    EntityKind::Strength => current.strength = parse_strength(&surface),
                    EntityKind::Frequency => current.frequency = parse_frequency(&surface),
                    EntityKind::Duration => current.duration_days = parse_duration_days(&surface),
                    EntityKind::Route => current.route = parse_route(&surface),
                    EntityKind::Drug | EntityKind::Other => continue,
                }
                current.span.end = current.span.end.max(entity.end);
                if let Some(raw) = text.get(current.span.start..current.span.end) {
                    current.raw_text = raw.to_string();
                }
            }
        }
    }
    mentions.retain(|m| !m.drug_name.is_empty());
    mentions
}

/// Character index to byte index over one text.
struct CharOffsets {
    /// Byte offset of every char boundary, including the end of the text.
    boundaries: Vec<usize>,
}

impl CharOffsets {
    fn new(text: &str) -> Self {
        let boundaries = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        Self { boundaries }
    }

    /// Offsets past the end clamp to the text length.
    fn byte_offset(&self, char_offset: usize) -> usize {
        self.boundaries
            .get(char_offset)
            .or(self.boundaries.last())
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Frequency, Strength};
    use crate::reference::ReferenceTables;

    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    const TEXT: &str = "Aspirin 100mg OD for 7 days";

    fn entity(group: &str, start: usize, end: usize, score: f64) -> TokenEntity {
        TokenEntity {
            entity_group: group.into(),
            word: TEXT[start..end].to_lowercase(),
            score,
            start,
            end,
        }
    }

    fn aspirin_entities(score: f64) -> Vec<TokenEntity> {
        vec![
            entity("Medication", 0, 7, score),
            entity("Dosage", 8, 13, 0.9),
            entity("Frequency", 14, 16, 0.9),
            entity("Duration", 17, 27, 0.9),
        ]
    }

    async fn extract_with(classifier: MockTokenClassifier) -> Extraction {
        let tables = ReferenceTables::builtin();
        LearnedExtractor::new(Arc::new(classifier), PatternExtractor::new(), 0.5)
            .extract(TEXT, tables.gazetteer())
            .await
    }

    #[test]
    fn groups_attributes_onto_drug() {
        let mentions = group_entities(TEXT, aspirin_entities(0.97));
        assert_eq!(mentions.len(), 1);
        let m = &mentions[0];
        assert_eq!(m.drug_name, "Aspirin");
        assert_eq!(m.strength, Some(Strength::mg(100.0)));
        assert_eq!(m.frequency, Some(Frequency::TimesPerDay { times: 1 }));
        assert_eq!(m.duration_days, Some(7));
        assert_eq!(m.raw_text, TEXT);
        assert_eq!(m.extraction_source, ExtractionSource::Learned);
    }

    #[test]
    fn char_offsets_after_non_ascii_text() {
        let text = "Café à 9h: Aspirin 100mg OD";
        // character offsets, as the classification service reports them
        let entities = vec![
            TokenEntity {
                entity_group: "Medication".into(),
                word: "aspirin".into(),
                score: 0.9,
                start: 11,
                end: 18,
            },
            TokenEntity {
                entity_group: "Dosage".into(),
                word: "100mg".into(),
                score: 0.9,
                start: 19,
                end: 24,
            },
        ];
        let mentions = group_entities(text, entities);
        assert_eq!(mentions.len(), 1);
        let m = &mentions[0];
        assert_eq!(m.drug_name, "Aspirin");
        assert_eq!(m.strength, Some(Strength::mg(100.0)));
        assert_eq!(m.raw_text, "Aspirin 100mg");
        assert_eq!(&text[m.span.start..m.span.end], "Aspirin 100mg");
    }

    #[test]
    fn offsets_past_the_end_clamp() {
        let offsets = CharOffsets::new("né");
        assert_eq!(offsets.byte_offset(1), 1);
        assert_eq!(offsets.byte_offset(2), 3);
        assert_eq!(offsets.byte_offset(40), 3);
    }

    #[test]
    fn orphan_attributes_ignored() {
        let entities = vec![entity("Dosage", 8, 13, 0.9)];
        assert!(group_entities(TEXT, entities).is_empty());
    }

    #[tokio::test]
    async fn confident_model_output_used() {
        let extraction = extract_with(MockTokenClassifier::new(aspirin_entities(0.97))).await;
        assert_eq!(extraction.source, ExtractionSource::Learned);
        assert!(extraction.degraded.is_none());
        assert!((extraction.mentions[0].extraction_confidence - 0.97).abs() < 1e-9);
    }

    #[tokio::test]
    async fn classifier_failure_falls_back() {
        let extraction = extract_with(MockTokenClassifier::failing("connection refused")).await;
        assert_eq!(extraction.source, ExtractionSource::PatternFallback);
        assert_eq!(extraction.mentions.len(), 1);
        assert!(extraction
            .degraded
            .as_deref()
            .is_some_and(|r| r.contains("connection refused")));
    }

    #[tokio::test]
    async fn empty_output_falls_back() {
        let extraction = extract_with(MockTokenClassifier::new(vec![])).await;
        assert_eq!(extraction.source, ExtractionSource::PatternFallback);
        assert_eq!(extraction.mentions[0].drug_name, "Aspirin");
    }

    #[tokio::test]
    async fn low_confidence_falls_back() {
        let extraction = extract_with(MockTokenClassifier::new(aspirin_entities(0.3))).await;
        assert_eq!(extraction.source, ExtractionSource::PatternFallback);
        assert!(extraction.degraded.is_some());
    }

    /// Serve `app` on an ephemeral local port and return its base URL.
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn http_classifier_posts_inputs() {
        let entities = serde_json::to_value(aspirin_entities(0.9)).unwrap();
        let app = Router::new().route(
            "/models/ner",
            post(
                move |headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                    let authorized = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        == Some("Bearer secret");
                    if authorized && body["inputs"] == TEXT {
                        (StatusCode::OK, Json(entities))
                    } else {
                        (StatusCode::BAD_REQUEST, Json(serde_json::Value::Null))
                    }
                },
            ),
        );
        let base_url = serve(app).await;

        let classifier = HttpTokenClassifier::new(
            &format!("{base_url}/models/ner"),
            Some("secret".into()),
            Duration::from_secs(2),
        )
        .unwrap();
        let entities = classifier.classify(TEXT).await.unwrap();
        assert_eq!(entities.len(), 4);
        assert_eq!(entities[0].entity_group, "Medication");
    }

    #[tokio::test]
    async fn http_classifier_reports_status() {
        let app = Router::new()
            .fallback(|| async { (StatusCode::SERVICE_UNAVAILABLE, "model loading") });
        let base_url = serve(app).await;

        let classifier =
            HttpTokenClassifier::new(&base_url, None, Duration::from_secs(2)).unwrap();
        let err = classifier.classify(TEXT).await.unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::ClassifierStatus { status: 503, ref body } if body == "model loading"
        ));
    }
}
