use serde::{Deserialize, Serialize};

use crate::models::{ConditionFlag, Severity};

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

fn default_evidence_confidence() -> f64 {
    0.8
}

/// Canonical drug in the vocabulary cache (keyed by RxNorm RxCUI).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub id: String,
    /// Lowercase generic ingredient name.
    pub name: String,
    /// Brand names and common spellings.
    #[serde(default)]
    pub synonyms: Vec<String>,
    pub therapeutic_class: String,
    /// Standard adult regimen, used when a substitute is evaluated hypothetically.
    #[serde(default)]
    pub typical_single_dose_mg: Option<f64>,
    #[serde(default)]
    pub typical_times_per_day: Option<u32>,
    /// Strength of the evidence behind this entry's class and regimen, 0.0-1.0.
    #[serde(default = "default_evidence_confidence")]
    pub evidence_confidence: f64,
}

impl VocabularyEntry {
    /// Case-insensitive match against the generic name or any synonym.
    pub fn matches_name(&self, name: &str) -> bool {
        let lower = name.trim().to_lowercase();
        self.name == lower || self.synonyms.iter().any(|s| s.to_lowercase() == lower)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TherapeuticClass {
    pub name: String,
    /// Classes that may stand in when the whole class is contraindicated.
    #[serde(default)]
    pub substitute_classes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Dosage rules
// ---------------------------------------------------------------------------

/// What a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RuleTarget {
    /// Generic name; also matched literally against unresolved mentions.
    Drug(String),
    Class(String),
    /// Every medication (e.g. exact allergy match).
    Any,
}

impl RuleTarget {
    pub fn signature(&self) -> String {
        match self {
            Self::Drug(name) => format!("drug:{}", name.to_lowercase()),
            Self::Class(name) => format!("class:{}", name.to_lowercase()),
            Self::Any => "any".to_string(),
        }
    }
}

/// Half-open age band `[min_years, max_years)`; open ends are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgeBand {
    #[serde(default)]
    pub min_years: Option<u32>,
    #[serde(default)]
    pub max_years: Option<u32>,
}

impl AgeBand {
    pub fn contains(&self, age: u32) -> bool {
        self.min_years.is_none_or(|min| age >= min) && self.max_years.is_none_or(|max| age < max)
    }

    pub fn label(&self) -> String {
        match (self.min_years, self.max_years) {
            (None, None) => "all ages".into(),
            (Some(min), None) => format!("age {min}+"),
            (None, Some(max)) => format!("under {max}"),
            (Some(min), Some(max)) => format!("age {min}-{}", max.saturating_sub(1)),
        }
    }
}

/// Half-open weight band `[min_kg, max_kg)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WeightBand {
    #[serde(default)]
    pub min_kg: Option<f64>,
    #[serde(default)]
    pub max_kg: Option<f64>,
}

impl WeightBand {
    pub fn contains(&self, weight_kg: f64) -> bool {
        self.min_kg.is_none_or(|min| weight_kg >= min)
            && self.max_kg.is_none_or(|max| weight_kg < max)
    }
}

/// The check a dosage rule performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCheck {
    MaxSingleDose {
        max_mg: f64,
        #[serde(default)]
        age: AgeBand,
    },
    MaxDailyDose {
        max_mg: f64,
        #[serde(default)]
        age: AgeBand,
    },
    MaxDailyDosePerKg {
        max_mg_per_kg: f64,
        #[serde(default)]
        weight: WeightBand,
        #[serde(default)]
        age: AgeBand,
    },
    MinimumAge {
        min_years: u32,
    },
    /// Patient allergic to the medication itself (name, canonical name or synonym).
    AllergyExact,
    /// Patient allergic to any listed allergen that cross-reacts with the target.
    AllergyCrossReactive {
        allergens: Vec<String>,
    },
    /// Contraindicated under the condition, or capped at `max_daily_mg` when set.
    OrganImpairment {
        condition: ConditionFlag,
        #[serde(default)]
        max_daily_mg: Option<f64>,
    },
    Pregnancy {
        category: String,
    },
    MaxFrequency {
        max_times_per_day: f64,
    },
    /// Narrow therapeutic index drug that always warrants monitoring.
    Monitoring,
}

impl RuleCheck {
    /// Identity of the violation type, independent of thresholds and severity.
    pub fn signature(&self) -> String {
        match self {
            Self::MaxSingleDose { age, .. } => {
                format!("max_single_dose:{:?}-{:?}", age.min_years, age.max_years)
            }
            Self::MaxDailyDose { age, .. } => {
                format!("max_daily_dose:{:?}-{:?}", age.min_years, age.max_years)
            }
            Self::MaxDailyDosePerKg { weight, age, .. } => format!(
                "max_daily_dose_per_kg:{:?}-{:?}:{:?}-{:?}",
                weight.min_kg, weight.max_kg, age.min_years, age.max_years
            ),
            Self::MinimumAge { .. } => "minimum_age".to_string(),
            Self::AllergyExact => "allergy_exact".to_string(),
            Self::AllergyCrossReactive { allergens } => {
                let mut sorted: Vec<String> = allergens.iter().map(|a| a.to_lowercase()).collect();
                sorted.sort();
                format!("allergy_cross_reactive:{}", sorted.join(","))
            }
            Self::OrganImpairment { condition, .. } => format!("organ_impairment:{condition}"),
            Self::Pregnancy { .. } => "pregnancy".to_string(),
            Self::MaxFrequency { .. } => "max_frequency".to_string(),
            Self::Monitoring => "monitoring".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DosageRule {
    pub id: String,
    pub target: RuleTarget,
    pub severity: Severity,
    pub check: RuleCheck,
}

impl DosageRule {
    pub fn signature(&self) -> String {
        format!("{}|{}", self.target.signature(), self.check.signature())
    }
}

// ---------------------------------------------------------------------------
// Interaction rules
// ---------------------------------------------------------------------------

/// One slot of an interaction pattern, matched by generic name or class.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InteractionMember {
    #[serde(default)]
    pub drugs: Vec<String>,
    #[serde(default)]
    pub classes: Vec<String>,
}

impl InteractionMember {
    pub fn drug(name: &str) -> Self {
        Self {
            drugs: vec![name.to_string()],
            classes: vec![],
        }
    }

    pub fn class(name: &str) -> Self {
        Self {
            drugs: vec![],
            classes: vec![name.to_string()],
        }
    }

    pub fn matches(&self, generic: &str, class: Option<&str>) -> bool {
        self.drugs.iter().any(|d| d.eq_ignore_ascii_case(generic))
            || class.is_some_and(|c| self.classes.iter().any(|k| k.eq_ignore_ascii_case(c)))
    }

    pub fn is_empty(&self) -> bool {
        self.drugs.is_empty() && self.classes.is_empty()
    }
}

/// Pairwise (two members) or multi-drug (three or more) interaction pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRule {
    pub id: String,
    pub members: Vec<InteractionMember>,
    pub severity: Severity,
    pub mechanism: String,
    pub reason: String,
}
