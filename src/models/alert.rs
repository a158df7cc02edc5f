use serde::{Deserialize, Serialize};

use super::enums::{ConditionFlag, Severity};
use super::medication::MedicationRef;

/// Patient or prescription attribute that made a rule fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "attribute", content = "value", rename_all = "snake_case")]
pub enum TriggerAttribute {
    Age(u32),
    WeightKg(f64),
    Allergy(String),
    Condition(ConditionFlag),
    SingleDoseMg(f64),
    DailyDoseMg(f64),
    DailyDoseMgPerKg(f64),
    TimesPerDay(f64),
    Medication(String),
}

/// One violated dosage/patient rule for one medication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyAlert {
    pub medication: MedicationRef,
    pub rule_id: String,
    pub severity: Severity,
    pub reason: String,
    pub triggering_attributes: Vec<TriggerAttribute>,
    /// Set when the medication failed normalization and only name-literal
    /// rules were matched.
    pub unverified: bool,
    /// Confidence of the underlying medication data, discounted when unverified.
    pub confidence: f64,
}

/// Interaction among two or more medications.
///
/// `medications` is sorted by index so identity is order-independent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionAlert {
    pub medications: Vec<MedicationRef>,
    pub severity: Severity,
    pub mechanism: String,
    pub reason: String,
    pub rule_ids: Vec<String>,
}

impl InteractionAlert {
    pub fn involves(&self, index: usize) -> bool {
        self.medications.iter().any(|m| m.index == index)
    }
}

/// A safer substitute for a medication that triggered a violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeSuggestion {
    pub original: MedicationRef,
    pub candidate_id: String,
    pub canonical_name: String,
    pub therapeutic_class: String,
    pub rationale: String,
    pub safety_margin_score: f64,
    pub source_confidence: f64,
}

/// Recommender output for one offending medication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeRecommendation {
    pub medication: MedicationRef,
    /// Rule ids of the HIGH/CRITICAL alerts that triggered the search.
    pub triggering_rules: Vec<String>,
    pub suggestions: Vec<AlternativeSuggestion>,
    pub no_safer_alternative_found: bool,
}
