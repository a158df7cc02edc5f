use serde::{Deserialize, Serialize};

use crate::models::enums::{str_enum, ParseEnumError};
use crate::models::{
    AlternativeRecommendation, InteractionAlert, MedicationRef, NormalizedMedication,
    PatientProfile, SafetyAlert,
};

/// One analysis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub text: String,
    pub patient: PatientProfile,
    /// Overrides `PipelineSettings::include_alternatives` when set.
    #[serde(default)]
    pub include_alternatives: Option<bool>,
}

impl AnalysisRequest {
    pub fn new(text: impl Into<String>, patient: PatientProfile) -> Self {
        Self {
            text: text.into(),
            patient,
            include_alternatives: None,
        }
    }
}

str_enum!(
    /// Pipeline stage, as named in timeout notices.
    Stage {
        Extraction => "extraction",
        Normalization => "normalization",
        Validation => "validation",
        Interactions => "interactions",
        Alternatives => "alternatives",
    }
);

/// Non-fatal condition recorded during an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineNotice {
    /// Learned extraction was abandoned for the pattern path.
    ExtractionDegraded { reason: String },
    /// No vocabulary candidate reached the acceptance threshold.
    NormalizationUnresolved { medication: MedicationRef },
    /// Vocabulary lookup failed after its retry.
    LookupServiceFailure { name: String, reason: String },
    /// Unresolved medications were left out of the interaction check.
    InteractionCheckIncomplete { excluded: Vec<MedicationRef> },
    /// The request deadline passed; later stages did not run.
    PipelineTimeout { stage: Stage },
    InputTruncated {
        original_chars: usize,
        kept_chars: usize,
    },
}

/// Everything an analysis produced, complete or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub medications: Vec<NormalizedMedication>,
    pub safety_alerts: Vec<SafetyAlert>,
    pub interaction_alerts: Vec<InteractionAlert>,
    pub alternatives: Vec<AlternativeRecommendation>,
    /// False when a stage was cut short by the request deadline.
    pub analysis_complete: bool,
    pub notices: Vec<PipelineNotice>,
    /// Mean extraction confidence over the medications, 0.0 when none.
    pub analysis_confidence: f64,
    pub processing_time_ms: u64,
    pub include_alternatives: bool,
}

impl AnalysisReport {
    pub(crate) fn empty(include_alternatives: bool) -> Self {
        Self {
            medications: Vec::new(),
            safety_alerts: Vec::new(),
            interaction_alerts: Vec::new(),
            alternatives: Vec::new(),
            analysis_complete: true,
            notices: Vec::new(),
            analysis_confidence: 0.0,
            processing_time_ms: 0,
            include_alternatives,
        }
    }

    pub fn has_violation(&self) -> bool {
        self.safety_alerts.iter().any(|a| a.severity.is_violation())
            || self
                .interaction_alerts
                .iter()
                .any(|a| a.severity.is_violation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_serializes_with_kind_tag() {
        let notice = PipelineNotice::PipelineTimeout {
            stage: Stage::Normalization,
        };
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["kind"], "pipeline_timeout");
        assert_eq!(json["stage"], "normalization");
    }

    #[test]
    fn request_defaults_alternatives_override() {
        let request: AnalysisRequest =
            serde_json::from_str(r#"{"text": "Aspirin 100mg OD", "patient": {"age": 45}}"#)
                .unwrap();
        assert!(request.include_alternatives.is_none());
        assert_eq!(request.patient.age, 45);
    }

    #[test]
    fn stage_parses() {
        assert_eq!("interactions".parse::<Stage>().unwrap(), Stage::Interactions);
        assert!("bogus".parse::<Stage>().is_err());
    }
}
