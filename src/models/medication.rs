use std::fmt;

use serde::{Deserialize, Serialize};

use super::enums::{ExtractionSource, Route};

// ---------------------------------------------------------------------------
// Strength
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrengthUnit {
    Mg,
    Mcg,
    G,
    Ml,
    Iu,
    Units,
}

impl StrengthUnit {
    /// Parse a unit token as written on prescriptions.
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_lowercase().trim_end_matches('.') {
            "mg" | "mgs" | "milligram" | "milligrams" => Some(Self::Mg),
            "mcg" | "ug" | "µg" | "microgram" | "micrograms" => Some(Self::Mcg),
            "g" | "gm" | "gram" | "grams" => Some(Self::G),
            "ml" | "millilitre" | "milliliter" | "millilitres" | "milliliters" => Some(Self::Ml),
            "iu" => Some(Self::Iu),
            "unit" | "units" | "u" => Some(Self::Units),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mg => "mg",
            Self::Mcg => "mcg",
            Self::G => "g",
            Self::Ml => "ml",
            Self::Iu => "IU",
            Self::Units => "units",
        }
    }
}

/// Quantity + unit of a single dose, e.g. 100 mg.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Strength {
    pub value: f64,
    pub unit: StrengthUnit,
}

impl Strength {
    pub fn new(value: f64, unit: StrengthUnit) -> Self {
        Self { value, unit }
    }

    pub fn mg(value: f64) -> Self {
        Self::new(value, StrengthUnit::Mg)
    }

    /// Mass in milligrams; `None` for volume and unit-based strengths.
    pub fn to_mg(&self) -> Option<f64> {
        match self.unit {
            StrengthUnit::Mg => Some(self.value),
            StrengthUnit::Mcg => Some(self.value / 1000.0),
            StrengthUnit::G => Some(self.value * 1000.0),
            StrengthUnit::Ml | StrengthUnit::Iu | StrengthUnit::Units => None,
        }
    }
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.as_str())
    }
}

// ---------------------------------------------------------------------------
// Frequency
// ---------------------------------------------------------------------------

/// Structured dosing frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frequency {
    TimesPerDay { times: u32 },
    EveryHours { hours: u32 },
    AsNeeded,
    /// Single immediate dose (STAT).
    Once,
}

impl Frequency {
    /// Administrations per day, or `None` when not scheduled (PRN).
    pub fn times_per_day(&self) -> Option<f64> {
        match self {
            Self::TimesPerDay { times } => Some(f64::from(*times)),
            Self::EveryHours { hours } if *hours > 0 => Some(24.0 / f64::from(*hours)),
            Self::EveryHours { .. } => None,
            Self::AsNeeded => None,
            Self::Once => Some(1.0),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimesPerDay { times: 1 } => write!(f, "once daily"),
            Self::TimesPerDay { times: 2 } => write!(f, "twice daily"),
            Self::TimesPerDay { times } => write!(f, "{times} times daily"),
            Self::EveryHours { hours } => write!(f, "every {hours} hours"),
            Self::AsNeeded => write!(f, "as needed"),
            Self::Once => write!(f, "single dose"),
        }
    }
}

// ---------------------------------------------------------------------------
// MedicationMention
// ---------------------------------------------------------------------------

/// Byte range into the preprocessed prescription text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

/// One detected medication occurrence, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationMention {
    pub raw_text: String,
    pub span: TextSpan,
    pub drug_name: String,
    pub strength: Option<Strength>,
    pub route: Option<Route>,
    pub frequency: Option<Frequency>,
    pub duration_days: Option<u32>,
    pub extraction_confidence: f64,
    pub extraction_source: ExtractionSource,
}

impl MedicationMention {
    /// Single dose in mg, when the strength is mass-based.
    pub fn single_dose_mg(&self) -> Option<f64> {
        self.strength.and_then(|s| s.to_mg())
    }

    /// Total daily dose in mg (single dose × administrations per day).
    pub fn daily_dose_mg(&self) -> Option<f64> {
        let single = self.single_dose_mg()?;
        let times = self.frequency?.times_per_day()?;
        Some(single * times)
    }
}

// ---------------------------------------------------------------------------
// NormalizedMedication
// ---------------------------------------------------------------------------

/// A mention mapped against the canonical vocabulary.
///
/// `candidate_id` is `None` when no candidate reached the acceptance
/// threshold; such medications are "unverified" downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMedication {
    pub mention: MedicationMention,
    pub candidate_id: Option<String>,
    pub canonical_name: Option<String>,
    /// Generic ingredient key from the reference vocabulary, when known.
    pub generic_name: Option<String>,
    pub therapeutic_class: Option<String>,
    pub match_score: Option<f64>,
    pub normalization_confidence: f64,
}

impl NormalizedMedication {
    /// Build an unresolved medication: no candidate, zero normalization confidence.
    pub fn unresolved(mention: MedicationMention) -> Self {
        Self {
            mention,
            candidate_id: None,
            canonical_name: None,
            generic_name: None,
            therapeutic_class: None,
            match_score: None,
            normalization_confidence: 0.0,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.candidate_id.is_some()
    }

    /// Lowercase key used for rule lookups: generic name, then canonical
    /// name, then the literal mention text for unresolved medications.
    pub fn rule_key(&self) -> String {
        self.generic_name
            .as_deref()
            .or(self.canonical_name.as_deref())
            .unwrap_or(&self.mention.drug_name)
            .trim()
            .to_lowercase()
    }

    pub fn display_name(&self) -> String {
        self.canonical_name
            .clone()
            .unwrap_or_else(|| self.mention.drug_name.clone())
    }

    pub fn reference(&self, index: usize) -> MedicationRef {
        MedicationRef {
            index,
            name: self.display_name(),
        }
    }
}

/// Stable pointer to a medication in the report's `medications` list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MedicationRef {
    pub index: usize,
    pub name: String,
}
