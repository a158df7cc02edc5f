use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::enums::ConditionFlag;

/// Upper bound on plausible patient age, in years.
pub const MAX_AGE_YEARS: i32 = 150;

/// Rejection of a malformed patient profile, naming the offending field.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid patient profile field `{field}`: {reason}")]
pub struct PatientValidationError {
    pub field: &'static str,
    pub reason: String,
}

/// Patient attributes for a single analysis request.
///
/// Created by the caller and only ever read by the pipeline. Allergen strings
/// are compared case-insensitively, so callers need not pre-normalize them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientProfile {
    /// Age in whole years. Signed so that bad input can be reported, not wrapped.
    pub age: i32,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub allergies: BTreeSet<String>,
    #[serde(default)]
    pub flags: BTreeSet<ConditionFlag>,
}

impl PatientProfile {
    pub fn new(age: i32) -> Self {
        Self {
            age,
            weight_kg: None,
            allergies: BTreeSet::new(),
            flags: BTreeSet::new(),
        }
    }

    pub fn with_weight(mut self, weight_kg: f64) -> Self {
        self.weight_kg = Some(weight_kg);
        self
    }

    pub fn with_allergy(mut self, allergen: &str) -> Self {
        self.allergies.insert(allergen.to_string());
        self
    }

    pub fn with_flag(mut self, flag: ConditionFlag) -> Self {
        self.flags.insert(flag);
        self
    }

    /// Reject malformed input before any pipeline stage runs.
    pub fn validate(&self) -> Result<(), PatientValidationError> {
        if self.age < 0 {
            return Err(PatientValidationError {
                field: "age",
                reason: format!("must be >= 0, got {}", self.age),
            });
        }
        if self.age > MAX_AGE_YEARS {
            return Err(PatientValidationError {
                field: "age",
                reason: format!("must be <= {MAX_AGE_YEARS}, got {}", self.age),
            });
        }
        if let Some(weight) = self.weight_kg {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(PatientValidationError {
                    field: "weight_kg",
                    reason: format!("must be a positive number, got {weight}"),
                });
            }
        }
        if self.allergies.iter().any(|a| a.trim().is_empty()) {
            return Err(PatientValidationError {
                field: "allergies",
                reason: "allergen entries must not be blank".into(),
            });
        }
        Ok(())
    }

    /// Age in years. Only meaningful after `validate()` succeeded.
    pub fn age_years(&self) -> u32 {
        self.age.max(0) as u32
    }

    pub fn has_flag(&self, flag: ConditionFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Lowercased, trimmed allergen set in stable order.
    pub fn normalized_allergies(&self) -> BTreeSet<String> {
        self.allergies
            .iter()
            .map(|a| a.trim().to_lowercase())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_profile_passes() {
        let patient = PatientProfile::new(45)
            .with_weight(70.0)
            .with_allergy("Penicillin")
            .with_flag(ConditionFlag::Pregnant);
        assert!(patient.validate().is_ok());
        assert!(patient.has_flag(ConditionFlag::Pregnant));
        assert!(patient.normalized_allergies().contains("penicillin"));
    }

    #[test]
    fn negative_age_names_field() {
        let err = PatientProfile::new(-1).validate().unwrap_err();
        assert_eq!(err.field, "age");
        assert!(err.to_string().contains("age"));
    }

    #[test]
    fn implausible_age_rejected() {
        assert_eq!(PatientProfile::new(151).validate().unwrap_err().field, "age");
        assert!(PatientProfile::new(0).validate().is_ok());
    }

    #[test]
    fn non_positive_weight_rejected() {
        let err = PatientProfile::new(30).with_weight(0.0).validate().unwrap_err();
        assert_eq!(err.field, "weight_kg");
        let err = PatientProfile::new(30)
            .with_weight(f64::NAN)
            .validate()
            .unwrap_err();
        assert_eq!(err.field, "weight_kg");
    }

    #[test]
    fn blank_allergen_rejected() {
        let err = PatientProfile::new(30).with_allergy("  ").validate().unwrap_err();
        assert_eq!(err.field, "allergies");
    }

    #[test]
    fn deserializes_with_defaults() {
        let patient: PatientProfile = serde_json::from_str(r#"{"age": 70}"#).unwrap();
        assert_eq!(patient.age, 70);
        assert!(patient.weight_kg.is_none());
        assert!(patient.allergies.is_empty());

        let patient: PatientProfile =
            serde_json::from_str(r#"{"age": 30, "flags": ["renal-impairment"]}"#).unwrap();
        assert!(patient.has_flag(ConditionFlag::RenalImpairment));
    }
}
