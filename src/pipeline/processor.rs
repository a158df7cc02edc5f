use std::sync::Arc;

use tokio::time::Instant;

use crate::config::PipelineSettings;
use crate::extraction::{build_extractor, preprocess, truncate_chars, MedicationExtractor};
use crate::normalize::Normalizer;
use crate::reference::{ReferenceStore, ReferenceTables};
use crate::safety::{alternatives, dosage, interaction};
use crate::vocabulary::{build_vocabulary, VocabularyClient};

use super::types::{AnalysisReport, AnalysisRequest, PipelineNotice, Stage};
use super::{AnalysisError, SetupError};

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives one prescription through every stage against one reference
/// snapshot.
///
/// Holds no per-request state, so one instance serves concurrent requests.
pub struct SafetyPipeline {
    settings: PipelineSettings,
    store: Arc<ReferenceStore>,
    extractor: Arc<dyn MedicationExtractor>,
    normalizer: Normalizer,
}

impl SafetyPipeline {
    pub fn new(
        settings: PipelineSettings,
        store: Arc<ReferenceStore>,
        extractor: Arc<dyn MedicationExtractor>,
        vocabulary: Arc<dyn VocabularyClient>,
    ) -> Self {
        let normalizer = Normalizer::from_settings(vocabulary, &settings);
        Self {
            settings,
            store,
            extractor,
            normalizer,
        }
    }

    /// Production wiring: reference tables from `reference_dir` (or the
    /// bundled set), extractor and vocabulary per settings.
    pub fn build(settings: PipelineSettings) -> Result<Self, SetupError> {
        settings.validate()?;
        let tables = match &settings.reference_dir {
            Some(dir) => ReferenceTables::load(dir)?,
            None => ReferenceTables::builtin(),
        };
        let store = Arc::new(ReferenceStore::new(tables));

        let extractor = build_extractor(&settings.extractor)?;
        let vocabulary = build_vocabulary(&settings)?;
        Ok(Self::new(settings, store, extractor, vocabulary))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Shared reference store, for atomic table reloads.
    pub fn reference_store(&self) -> &Arc<ReferenceStore> {
        &self.store
    }

    /// Analyze one prescription.
    ///
    /// Fails only for an invalid patient profile. When the request deadline
    /// passes, the stages finished so far are returned with
    /// `analysis_complete = false`.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReport, AnalysisError> {
        let started = std::time::Instant::now();
        request.patient.validate()?;

        let deadline = Instant::now() + self.settings.request_timeout();
        let tables = self.store.snapshot()?;
        let include_alternatives = request
            .include_alternatives
            .unwrap_or(self.settings.include_alternatives);
        let mut report = AnalysisReport::empty(include_alternatives);

        self.run_stages(request, &tables, deadline, &mut report).await;

        report.analysis_confidence = mean_confidence(&report);
        report.processing_time_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            medications = report.medications.len(),
            safety_alerts = report.safety_alerts.len(),
            interactions = report.interaction_alerts.len(),
            alternatives = report.alternatives.len(),
            complete = report.analysis_complete,
            processing_ms = report.processing_time_ms,
            "Analysis complete"
        );
        Ok(report)
    }

    async fn run_stages(
        &self,
        request: &AnalysisRequest,
        tables: &ReferenceTables,
        deadline: Instant,
        report: &mut AnalysisReport,
    ) {
        // Input
        let (text, truncated) = truncate_chars(&request.text, self.settings.max_text_length);
        if truncated {
            let original_chars = request.text.chars().count();
            tracing::warn!(
                original_chars,
                kept_chars = self.settings.max_text_length,
                "Prescription text truncated"
            );
            report.notices.push(PipelineNotice::InputTruncated {
                original_chars,
                kept_chars: self.settings.max_text_length,
            });
        }
        let prepared = preprocess(text, tables.gazetteer().terms());

        // Extraction
        let extracting = self.extractor.extract(&prepared.text, tables.gazetteer());
        let extraction = match tokio::time::timeout_at(deadline, extracting).await {
            Ok(extraction) => extraction,
            Err(_) => return timed_out(report, Stage::Extraction),
        };
        if let Some(reason) = extraction.degraded {
            report
                .notices
                .push(PipelineNotice::ExtractionDegraded { reason });
        }
        tracing::info!(
            mentions = extraction.mentions.len(),
            source = %extraction.source,
            "Extraction complete"
        );

        // Normalization
        let normalization = self
            .normalizer
            .normalize_all(extraction.mentions, tables, deadline)
            .await;
        report.medications = normalization.medications;
        for failure in normalization.failures {
            report.notices.push(PipelineNotice::LookupServiceFailure {
                name: failure.name,
                reason: failure.reason,
            });
        }
        for (index, med) in report.medications.iter().enumerate() {
            if !med.is_resolved() {
                report.notices.push(PipelineNotice::NormalizationUnresolved {
                    medication: med.reference(index),
                });
            }
        }
        if Instant::now() >= deadline {
            return timed_out(report, Stage::Normalization);
        }

        // Validation and interactions read the same list.
        report.safety_alerts = dosage::validate_all(&report.medications, &request.patient, tables);
        if Instant::now() >= deadline {
            return timed_out(report, Stage::Validation);
        }

        let interactions = interaction::detect(&report.medications, tables);
        report.interaction_alerts = interactions.alerts;
        if !interactions.excluded.is_empty() {
            report.notices.push(PipelineNotice::InteractionCheckIncomplete {
                excluded: interactions.excluded,
            });
        }
        if Instant::now() >= deadline {
            return timed_out(report, Stage::Interactions);
        }

        // Alternatives
        if report.include_alternatives {
            report.alternatives = alternatives::suggest_all(
                &report.medications,
                &report.safety_alerts,
                &report.interaction_alerts,
                &request.patient,
                tables,
                self.settings.max_alternatives,
            );
            if Instant::now() >= deadline {
                timed_out(report, Stage::Alternatives);
            }
        }
    }
}

fn timed_out(report: &mut AnalysisReport, stage: Stage) {
    tracing::warn!(stage = %stage, "Request deadline reached, returning partial result");
    report.analysis_complete = false;
    report.notices.push(PipelineNotice::PipelineTimeout { stage });
}

fn mean_confidence(report: &AnalysisReport) -> f64 {
    if report.medications.is_empty() {
        return 0.0;
    }
    let total: f64 = report
        .medications
        .iter()
        .map(|m| m.mention.extraction_confidence)
        .sum();
    total / report.medications.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{LearnedExtractor, MockTokenClassifier, PatternExtractor};
    use crate::models::{
        ExtractionSource, Frequency, PatientProfile, Severity, Strength,
    };
    use crate::vocabulary::{LocalVocabulary, MockVocabularyClient};
    use std::time::Duration;

    fn offline_pipeline(settings: PipelineSettings) -> SafetyPipeline {
        let store = Arc::new(ReferenceStore::builtin());
        let vocabulary = Arc::new(LocalVocabulary::new(settings.max_candidates));
        SafetyPipeline::new(settings, store, Arc::new(PatternExtractor::new()), vocabulary)
    }

    fn pipeline() -> SafetyPipeline {
        offline_pipeline(PipelineSettings::default())
    }

    async fn analyze(text: &str, patient: PatientProfile) -> AnalysisReport {
        pipeline()
            .analyze(&AnalysisRequest::new(text, patient))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn routine_aspirin_is_clean() {
        let report = analyze(
            "Aspirin 100mg OD for 7 days",
            PatientProfile::new(45).with_weight(70.0),
        )
        .await;

        assert_eq!(report.medications.len(), 1);
        let med = &report.medications[0];
        assert_eq!(med.generic_name.as_deref(), Some("aspirin"));
        assert_eq!(med.mention.strength, Some(Strength::mg(100.0)));
        assert_eq!(med.mention.frequency, Some(Frequency::TimesPerDay { times: 1 }));
        assert_eq!(med.mention.duration_days, Some(7));
        assert!(report.safety_alerts.is_empty());
        assert!(report.interaction_alerts.is_empty());
        assert!(report.alternatives.is_empty());
        assert!(report.analysis_complete);
        assert!(report.notices.is_empty());
        assert!((report.analysis_confidence - 0.95).abs() < 1e-9);
    }

    #[tokio::test]
    async fn warfarin_with_aspirin_flags_bleeding_risk() {
        let report = analyze("Aspirin 100mg OD. Warfarin 5mg OD", PatientProfile::new(70)).await;

        assert_eq!(report.medications.len(), 2);
        assert_eq!(report.interaction_alerts.len(), 1);
        let alert = &report.interaction_alerts[0];
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.mechanism, "bleeding-risk");
        assert_eq!(alert.medications.len(), 2);
        assert!(!report.alternatives.is_empty());
        assert!(report.has_violation());
    }

    #[tokio::test]
    async fn penicillin_allergy_blocks_amoxicillin() {
        let patient = PatientProfile::new(30).with_allergy("Penicillin");
        let report = analyze("Amoxicillin", patient).await;

        assert_eq!(report.medications.len(), 1);
        let critical: Vec<_> = report
            .safety_alerts
            .iter()
            .filter(|a| a.severity == Severity::Critical)
            .collect();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].rule_id, "ALG-PENICILLIN");

        assert_eq!(report.alternatives.len(), 1);
        let rec = &report.alternatives[0];
        assert!(rec.no_safer_alternative_found || !rec.suggestions.is_empty());
        assert!(rec
            .suggestions
            .iter()
            .all(|s| s.therapeutic_class != "penicillin"));
    }

    #[tokio::test]
    async fn unresolved_medication_stays_in_report() {
        let report = analyze(
            "Zyntrafen 50mg TID. Warfarin 5mg OD",
            PatientProfile::new(50),
        )
        .await;

        assert_eq!(report.medications.len(), 2);
        let unresolved = &report.medications[0];
        assert!(unresolved.candidate_id.is_none());
        assert!(report.notices.iter().any(|n| matches!(
            n,
            PipelineNotice::NormalizationUnresolved { medication } if medication.index == 0
        )));
        assert!(report.notices.iter().any(|n| matches!(
            n,
            PipelineNotice::InteractionCheckIncomplete { excluded } if excluded.len() == 1
        )));
        // still a complete analysis: nothing timed out
        assert!(report.analysis_complete);
    }

    #[tokio::test]
    async fn identical_input_gives_identical_report() {
        let text = "Warfarin 5mg OD. Aspirin 100mg OD. Ibuprofen 400mg TDS. Zyntrafen 10mg BD";
        let patient = PatientProfile::new(72).with_weight(60.0).with_allergy("sulfa");
        let mut first = analyze(text, patient.clone()).await;
        let mut second = analyze(text, patient).await;
        first.processing_time_ms = 0;
        second.processing_time_ms = 0;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn invalid_patient_rejected_before_pipeline() {
        let err = pipeline()
            .analyze(&AnalysisRequest::new("Aspirin 100mg OD", PatientProfile::new(-3)))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidPatient(ref e) if e.field == "age"));
    }

    #[tokio::test]
    async fn long_input_truncated_with_notice() {
        let settings = PipelineSettings {
            max_text_length: 16,
            ..Default::default()
        };
        let report = offline_pipeline(settings)
            .analyze(&AnalysisRequest::new(
                "Aspirin 100mg OD and a long tail of notes",
                PatientProfile::new(40),
            ))
            .await
            .unwrap();
        assert!(report.notices.contains(&PipelineNotice::InputTruncated {
            original_chars: 41,
            kept_chars: 16,
        }));
        assert_eq!(report.medications.len(), 1);
    }

    #[tokio::test]
    async fn degraded_extraction_is_recorded() {
        let store = Arc::new(ReferenceStore::builtin());
        let extractor = LearnedExtractor::new(
            Arc::new(MockTokenClassifier::failing("model not loaded")),
            PatternExtractor::new(),
            0.5,
        );
        let pipeline = SafetyPipeline::new(
            PipelineSettings::default(),
            store,
            Arc::new(extractor),
            Arc::new(LocalVocabulary::new(5)),
        );
        let report = pipeline
            .analyze(&AnalysisRequest::new("Aspirin 100mg OD", PatientProfile::new(40)))
            .await
            .unwrap();
        assert!(matches!(
            report.notices[0],
            PipelineNotice::ExtractionDegraded { .. }
        ));
        assert_eq!(
            report.medications[0].mention.extraction_source,
            ExtractionSource::PatternFallback
        );
    }

    #[tokio::test]
    async fn request_deadline_returns_partial_result() {
        let settings = PipelineSettings {
            request_timeout_ms: 150,
            ..Default::default()
        };
        let store = Arc::new(ReferenceStore::builtin());
        let vocabulary = Arc::new(
            MockVocabularyClient::new().with_delay("aspirin", Duration::from_secs(10)),
        );
        let pipeline =
            SafetyPipeline::new(settings, store, Arc::new(PatternExtractor::new()), vocabulary);

        let report = pipeline
            .analyze(&AnalysisRequest::new("Aspirin 100mg OD", PatientProfile::new(40)))
            .await
            .unwrap();
        assert!(!report.analysis_complete);
        assert!(report.notices.contains(&PipelineNotice::PipelineTimeout {
            stage: Stage::Normalization
        }));
        assert_eq!(report.medications.len(), 1);
        assert!(report.processing_time_ms < 2000);
    }

    #[tokio::test]
    async fn lookup_failure_degrades_to_unresolved() {
        let store = Arc::new(ReferenceStore::builtin());
        let settings = PipelineSettings {
            lookup_retry_backoff_ms: 1,
            ..Default::default()
        };
        let pipeline = SafetyPipeline::new(
            settings,
            store,
            Arc::new(PatternExtractor::new()),
            Arc::new(MockVocabularyClient::new().failing_for("warfarin")),
        );
        let report = pipeline
            .analyze(&AnalysisRequest::new("Warfarin 5mg OD", PatientProfile::new(40)))
            .await
            .unwrap();
        assert!(report.analysis_complete);
        assert!(!report.medications[0].is_resolved());
        assert!(report
            .notices
            .iter()
            .any(|n| matches!(n, PipelineNotice::LookupServiceFailure { name, .. } if name == "warfarin")));
        // name-literal monitoring rule still applies, flagged unverified
        assert_eq!(report.safety_alerts[0].rule_id, "MON-WARFARIN");
        assert!(report.safety_alerts[0].unverified);
    }

    #[tokio::test]
    async fn alternatives_can_be_switched_off() {
        let mut request = AnalysisRequest::new(
            "Amoxicillin 500mg TDS",
            PatientProfile::new(30).with_allergy("penicillin"),
        );
        request.include_alternatives = Some(false);
        let report = pipeline().analyze(&request).await.unwrap();
        assert!(!report.include_alternatives);
        assert!(report.alternatives.is_empty());
        assert!(report.has_violation());
    }

    #[tokio::test]
    async fn salt_and_coating_suffixes_resolve_to_the_ingredient() {
        let report = analyze(
            "Warfarin sodium 5mg OD. Aspirin EC 81mg OD",
            PatientProfile::new(70),
        )
        .await;
        let names: Vec<Option<&str>> = report
            .medications
            .iter()
            .map(|m| m.generic_name.as_deref())
            .collect();
        assert_eq!(names, [Some("warfarin"), Some("aspirin")]);
        assert_eq!(report.interaction_alerts.len(), 1);
        assert_eq!(report.interaction_alerts[0].mechanism, "bleeding-risk");
    }

    #[tokio::test]
    async fn ocr_noise_is_repaired_before_extraction() {
        let report = analyze("Warfarln 5mg OD. AspirIn 1OOmg OD", PatientProfile::new(70)).await;
        let names: Vec<Option<&str>> = report
            .medications
            .iter()
            .map(|m| m.generic_name.as_deref())
            .collect();
        assert_eq!(names, [Some("warfarin"), Some("aspirin")]);
        assert_eq!(report.medications[1].mention.strength, Some(Strength::mg(100.0)));
    }

    #[tokio::test]
    async fn empty_text_is_a_valid_empty_report() {
        let report = analyze("", PatientProfile::new(40)).await;
        assert!(report.medications.is_empty());
        assert!(report.analysis_complete);
        assert_eq!(report.analysis_confidence, 0.0);
    }

    #[tokio::test]
    async fn reference_reload_applies_to_next_request() {
        let pipeline = pipeline();
        let bare_name = AnalysisRequest::new("continue zyntrafen daily", PatientProfile::new(40));
        let report = pipeline.analyze(&bare_name).await.unwrap();
        assert!(report.medications.is_empty());

        let tables = ReferenceTables::builtin();
        let mut vocabulary = serde_json::to_value(tables.vocabulary()).unwrap();
        vocabulary.as_array_mut().unwrap().push(serde_json::json!({
            "id": "99999",
            "name": "zyntrafen",
            "therapeutic_class": "analgesic",
        }));
        let dir = tempfile::tempdir().unwrap();
        for (file, value) in [
            ("vocabulary.json", vocabulary),
            ("classes.json", serde_json::to_value(tables.classes()).unwrap()),
            ("dosage_rules.json", serde_json::json!([])),
            (
                "interaction_rules.json",
                serde_json::to_value(tables.interaction_rules()).unwrap(),
            ),
        ] {
            std::fs::write(dir.path().join(file), value.to_string()).unwrap();
        }

        pipeline.reference_store().reload_from(dir.path()).unwrap();
        let report = pipeline
            .analyze(&AnalysisRequest::new(
                "Warfarin 5mg OD",
                PatientProfile::new(40),
            ))
            .await
            .unwrap();
        assert!(report.safety_alerts.is_empty());

        let report = pipeline.analyze(&bare_name).await.unwrap();
        assert_eq!(report.medications.len(), 1);
        let med = &report.medications[0];
        assert_eq!(med.mention.drug_name.to_lowercase(), "zyntrafen");
        assert_eq!(med.candidate_id.as_deref(), Some("99999"));
        assert_eq!(med.therapeutic_class.as_deref(), Some("analgesic"));
    }
}
