use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use serde::de::DeserializeOwned;

use super::types::{
    DosageRule, InteractionRule, RuleCheck, RuleTarget, TherapeuticClass, VocabularyEntry,
};
use super::ReferenceError;

const VOCABULARY_FILE: &str = "vocabulary.json";
const CLASSES_FILE: &str = "classes.json";
const DOSAGE_RULES_FILE: &str = "dosage_rules.json";
const INTERACTION_RULES_FILE: &str = "interaction_rules.json";

/// Every known drug name and synonym, lowercased.
///
/// Built once per table version and used as the spelling dictionary during
/// preprocessing and as the name list for pattern extraction.
#[derive(Debug, Clone, Default)]
pub struct Gazetteer {
    terms: Vec<String>,
    lookup: HashSet<String>,
    longest_term_words: usize,
}

impl Gazetteer {
    pub fn new<S: AsRef<str>>(terms: impl IntoIterator<Item = S>) -> Self {
        let sorted: BTreeSet<String> = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        let terms: Vec<String> = sorted.into_iter().collect();
        let longest_term_words = terms
            .iter()
            .map(|t| t.split_whitespace().count())
            .max()
            .unwrap_or(1);
        Self {
            lookup: terms.iter().cloned().collect(),
            terms,
            longest_term_words,
        }
    }

    fn from_vocabulary(vocabulary: &[VocabularyEntry]) -> Self {
        Self::new(vocabulary.iter().flat_map(|e| {
            std::iter::once(e.name.as_str()).chain(e.synonyms.iter().map(String::as_str))
        }))
    }

    /// Sorted, deduplicated terms.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Case-insensitive membership.
    pub fn contains(&self, term: &str) -> bool {
        self.lookup.contains(&term.trim().to_lowercase())
    }

    pub fn longest_term_words(&self) -> usize {
        self.longest_term_words
    }
}

/// One consistent version of every reference table.
///
/// Built through `from_parts`/`load`, which validate the whole set, or from
/// the bundled tables.
#[derive(Debug, Clone)]
pub struct ReferenceTables {
    vocabulary: Vec<VocabularyEntry>,
    classes: Vec<TherapeuticClass>,
    dosage_rules: Vec<DosageRule>,
    interaction_rules: Vec<InteractionRule>,
    gazetteer: Gazetteer,
}

impl ReferenceTables {
    /// Validate and assemble tables.
    pub fn from_parts(
        vocabulary: Vec<VocabularyEntry>,
        classes: Vec<TherapeuticClass>,
        dosage_rules: Vec<DosageRule>,
        interaction_rules: Vec<InteractionRule>,
    ) -> Result<Self, ReferenceError> {
        let mut vocabulary = vocabulary;
        for entry in &mut vocabulary {
            entry.name = entry.name.trim().to_lowercase();
            entry.therapeutic_class = entry.therapeutic_class.trim().to_lowercase();
        }
        let tables = Self {
            gazetteer: Gazetteer::from_vocabulary(&vocabulary),
            vocabulary,
            classes,
            dosage_rules,
            interaction_rules,
        };
        tables.validate()?;
        Ok(tables)
    }

    /// Load all four tables from JSON files in `dir`.
    pub fn load(dir: &Path) -> Result<Self, ReferenceError> {
        let tables = Self::from_parts(
            read_table(dir, VOCABULARY_FILE)?,
            read_table(dir, CLASSES_FILE)?,
            read_table(dir, DOSAGE_RULES_FILE)?,
            read_table(dir, INTERACTION_RULES_FILE)?,
        )?;
        tracing::info!(
            dir = %dir.display(),
            vocabulary = tables.vocabulary.len(),
            dosage_rules = tables.dosage_rules.len(),
            interaction_rules = tables.interaction_rules.len(),
            "Reference tables loaded"
        );
        Ok(tables)
    }

    /// Bundled tables (no file I/O). Their validity is covered by tests.
    pub fn builtin() -> Self {
        let vocabulary = super::builtin::vocabulary();
        Self {
            gazetteer: Gazetteer::from_vocabulary(&vocabulary),
            vocabulary,
            classes: super::builtin::classes(),
            dosage_rules: super::builtin::dosage_rules(),
            interaction_rules: super::builtin::interaction_rules(),
        }
    }

    // ── Accessors ────────────────────────────────────────────

    pub fn vocabulary(&self) -> &[VocabularyEntry] {
        &self.vocabulary
    }

    pub fn classes(&self) -> &[TherapeuticClass] {
        &self.classes
    }

    pub fn dosage_rules(&self) -> &[DosageRule] {
        &self.dosage_rules
    }

    pub fn interaction_rules(&self) -> &[InteractionRule] {
        &self.interaction_rules
    }

    pub fn entry_by_id(&self, id: &str) -> Option<&VocabularyEntry> {
        self.vocabulary.iter().find(|e| e.id == id)
    }

    /// Entry whose generic name or synonym equals `name` (case-insensitive).
    pub fn entry_by_name(&self, name: &str) -> Option<&VocabularyEntry> {
        self.vocabulary.iter().find(|e| e.matches_name(name))
    }

    pub fn class(&self, name: &str) -> Option<&TherapeuticClass> {
        self.classes
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Entries belonging to `class`, in table order.
    pub fn class_members<'a>(
        &'a self,
        class: &'a str,
    ) -> impl Iterator<Item = &'a VocabularyEntry> + 'a {
        self.vocabulary
            .iter()
            .filter(move |e| e.therapeutic_class.eq_ignore_ascii_case(class))
    }

    pub fn gazetteer(&self) -> &Gazetteer {
        &self.gazetteer
    }

    // ── Validation ───────────────────────────────────────────

    fn validate(&self) -> Result<(), ReferenceError> {
        self.validate_classes()?;
        self.validate_vocabulary()?;
        self.validate_dosage_rules()?;
        self.validate_interaction_rules()?;
        Ok(())
    }

    fn validate_classes(&self) -> Result<(), ReferenceError> {
        let mut seen = HashSet::new();
        for class in &self.classes {
            if class.name.trim().is_empty() {
                return Err(malformed("classes", &class.name, "empty class name"));
            }
            if !seen.insert(class.name.to_lowercase()) {
                return Err(malformed("classes", &class.name, "duplicate class"));
            }
        }
        for class in &self.classes {
            if let Some(missing) = class
                .substitute_classes
                .iter()
                .find(|s| self.class(s).is_none())
            {
                return Err(malformed(
                    "classes",
                    &class.name,
                    &format!("unknown substitute class `{missing}`"),
                ));
            }
        }
        Ok(())
    }

    fn validate_vocabulary(&self) -> Result<(), ReferenceError> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for entry in &self.vocabulary {
            if entry.id.trim().is_empty() {
                return Err(malformed("vocabulary", &entry.name, "empty id"));
            }
            if entry.name.is_empty() {
                return Err(malformed("vocabulary", &entry.id, "empty name"));
            }
            if !ids.insert(entry.id.as_str()) {
                return Err(malformed("vocabulary", &entry.id, "duplicate id"));
            }
            if !names.insert(entry.name.as_str()) {
                return Err(malformed("vocabulary", &entry.id, "duplicate name"));
            }
            if self.class(&entry.therapeutic_class).is_none() {
                return Err(malformed(
                    "vocabulary",
                    &entry.id,
                    &format!("unknown class `{}`", entry.therapeutic_class),
                ));
            }
            if !(0.0..=1.0).contains(&entry.evidence_confidence) {
                return Err(malformed(
                    "vocabulary",
                    &entry.id,
                    "evidence_confidence outside 0.0-1.0",
                ));
            }
            if entry
                .typical_single_dose_mg
                .is_some_and(|d| !d.is_finite() || d <= 0.0)
            {
                return Err(malformed(
                    "vocabulary",
                    &entry.id,
                    "typical_single_dose_mg must be positive",
                ));
            }
            if entry.typical_times_per_day == Some(0) {
                return Err(malformed(
                    "vocabulary",
                    &entry.id,
                    "typical_times_per_day must be positive",
                ));
            }
        }
        Ok(())
    }

    fn validate_dosage_rules(&self) -> Result<(), ReferenceError> {
        let mut ids = HashSet::new();
        let mut signatures: HashMap<String, &DosageRule> = HashMap::new();

        for rule in &self.dosage_rules {
            if rule.id.trim().is_empty() {
                return Err(malformed("dosage_rules", "<blank>", "empty id"));
            }
            if !ids.insert(rule.id.as_str()) {
                return Err(malformed("dosage_rules", &rule.id, "duplicate id"));
            }
            match &rule.target {
                RuleTarget::Drug(name) if name.trim().is_empty() => {
                    return Err(malformed("dosage_rules", &rule.id, "empty drug target"));
                }
                RuleTarget::Class(name) if self.class(name).is_none() => {
                    return Err(malformed(
                        "dosage_rules",
                        &rule.id,
                        &format!("unknown class `{name}`"),
                    ));
                }
                _ => {}
            }
            check_rule_values(rule)?;

            let signature = rule.signature();
            if let Some(existing) = signatures.get(&signature) {
                if existing.severity != rule.severity {
                    return Err(ReferenceError::RuleConflict {
                        first: existing.id.clone(),
                        second: rule.id.clone(),
                        signature,
                    });
                }
                return Err(malformed(
                    "dosage_rules",
                    &rule.id,
                    &format!("duplicates rule `{}`", existing.id),
                ));
            }
            signatures.insert(signature, rule);
        }
        Ok(())
    }

    fn validate_interaction_rules(&self) -> Result<(), ReferenceError> {
        let mut ids = HashSet::new();
        for rule in &self.interaction_rules {
            if !ids.insert(rule.id.as_str()) {
                return Err(malformed("interaction_rules", &rule.id, "duplicate id"));
            }
            if rule.members.len() < 2 {
                return Err(malformed(
                    "interaction_rules",
                    &rule.id,
                    "needs at least two members",
                ));
            }
            if rule.members.iter().any(|m| m.is_empty()) {
                return Err(malformed("interaction_rules", &rule.id, "empty member"));
            }
            if rule.mechanism.trim().is_empty() {
                return Err(malformed("interaction_rules", &rule.id, "empty mechanism"));
            }
            let unknown_class = rule
                .members
                .iter()
                .flat_map(|m| m.classes.iter())
                .find(|c| self.class(c).is_none());
            if let Some(class) = unknown_class {
                return Err(malformed(
                    "interaction_rules",
                    &rule.id,
                    &format!("unknown class `{class}`"),
                ));
            }
        }
        Ok(())
    }
}

fn check_rule_values(rule: &DosageRule) -> Result<(), ReferenceError> {
    let positive = |v: f64| v.is_finite() && v > 0.0;
    let problem = match &rule.check {
        RuleCheck::MaxSingleDose { max_mg, age } | RuleCheck::MaxDailyDose { max_mg, age } => {
            if !positive(*max_mg) {
                Some("max_mg must be positive")
            } else if matches!((age.min_years, age.max_years), (Some(a), Some(b)) if a >= b) {
                Some("empty age band")
            } else {
                None
            }
        }
        RuleCheck::MaxDailyDosePerKg {
            max_mg_per_kg,
            weight,
            ..
        } => {
            if !positive(*max_mg_per_kg) {
                Some("max_mg_per_kg must be positive")
            } else if matches!((weight.min_kg, weight.max_kg), (Some(a), Some(b)) if a >= b) {
                Some("empty weight band")
            } else {
                None
            }
        }
        RuleCheck::AllergyCrossReactive { allergens } if allergens.is_empty() => {
            Some("allergen list is empty")
        }
        RuleCheck::AllergyExact if rule.target != RuleTarget::Any => {
            Some("exact allergy rule must target any medication")
        }
        RuleCheck::OrganImpairment {
            max_daily_mg: Some(max),
            ..
        } if !positive(*max) => Some("max_daily_mg must be positive"),
        RuleCheck::MaxFrequency { max_times_per_day } if !positive(*max_times_per_day) => {
            Some("max_times_per_day must be positive")
        }
        _ => None,
    };
    match problem {
        Some(reason) => Err(malformed("dosage_rules", &rule.id, reason)),
        None => Ok(()),
    }
}

fn malformed(table: &'static str, id: &str, reason: &str) -> ReferenceError {
    ReferenceError::MalformedRow {
        table,
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

fn read_table<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<Vec<T>, ReferenceError> {
    let path = dir.join(file);
    let json = std::fs::read_to_string(&path)
        .map_err(|e| ReferenceError::Load(path.display().to_string(), e.to_string()))?;
    serde_json::from_str(&json).map_err(|e| ReferenceError::Parse(file.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use crate::reference::types::{AgeBand, InteractionMember};

    fn class(name: &str) -> TherapeuticClass {
        TherapeuticClass {
            name: name.into(),
            substitute_classes: vec![],
        }
    }

    fn entry(id: &str, name: &str, class: &str) -> VocabularyEntry {
        VocabularyEntry {
            id: id.into(),
            name: name.into(),
            synonyms: vec![],
            therapeutic_class: class.into(),
            typical_single_dose_mg: Some(100.0),
            typical_times_per_day: Some(1),
            evidence_confidence: 0.9,
        }
    }

    fn daily_rule(id: &str, max_mg: f64, severity: Severity) -> DosageRule {
        DosageRule {
            id: id.into(),
            target: RuleTarget::Drug("aspirin".into()),
            severity,
            check: RuleCheck::MaxDailyDose {
                max_mg,
                age: AgeBand::default(),
            },
        }
    }

    #[test]
    fn builtin_tables_are_valid() {
        let tables = ReferenceTables::builtin();
        let revalidated = ReferenceTables::from_parts(
            tables.vocabulary().to_vec(),
            tables.classes().to_vec(),
            tables.dosage_rules().to_vec(),
            tables.interaction_rules().to_vec(),
        );
        assert!(revalidated.is_ok(), "{:?}", revalidated.err());
        assert!(tables.vocabulary().len() > 20);
        assert!(tables.entry_by_name("ASPIRIN").is_some());
        assert!(tables.entry_by_name("Tylenol").is_some());
        assert_eq!(tables.entry_by_id("11289").unwrap().name, "warfarin");
        assert!(tables.class("penicillin").is_some());
    }

    #[test]
    fn gazetteer_is_sorted_and_deduplicated() {
        let tables = ReferenceTables::builtin();
        let terms = tables.gazetteer().terms();
        let mut sorted = terms.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(terms, sorted.as_slice());
        assert!(tables.gazetteer().contains("Amoxicillin"));
        assert!(tables.gazetteer().contains("penicillin v"));
        assert_eq!(tables.gazetteer().longest_term_words(), 2);
    }

    #[test]
    fn gazetteer_follows_loaded_vocabulary() {
        let tables = ReferenceTables::from_parts(
            vec![entry("1191", "Aspirin", "antiplatelet")],
            vec![class("antiplatelet")],
            vec![],
            vec![],
        )
        .unwrap();
        assert_eq!(tables.gazetteer().terms(), ["aspirin".to_string()]);
        assert!(!tables.gazetteer().contains("warfarin"));
    }

    #[test]
    fn conflicting_severities_rejected() {
        let result = ReferenceTables::from_parts(
            vec![entry("1191", "aspirin", "antiplatelet")],
            vec![class("antiplatelet")],
            vec![
                daily_rule("A", 4000.0, Severity::Warning),
                daily_rule("B", 3000.0, Severity::High),
            ],
            vec![],
        );
        assert!(matches!(
            result,
            Err(ReferenceError::RuleConflict { ref first, ref second, .. })
                if first == "A" && second == "B"
        ));
    }

    #[test]
    fn duplicate_vocabulary_id_rejected() {
        let result = ReferenceTables::from_parts(
            vec![
                entry("1", "aspirin", "antiplatelet"),
                entry("1", "clopidogrel", "antiplatelet"),
            ],
            vec![class("antiplatelet")],
            vec![],
            vec![],
        );
        assert!(matches!(
            result,
            Err(ReferenceError::MalformedRow { table: "vocabulary", .. })
        ));
    }

    #[test]
    fn unknown_class_rejected() {
        let result = ReferenceTables::from_parts(
            vec![entry("1", "aspirin", "antiplatelet")],
            vec![],
            vec![],
            vec![],
        );
        assert!(matches!(result, Err(ReferenceError::MalformedRow { .. })));
    }

    #[test]
    fn single_member_interaction_rejected() {
        let result = ReferenceTables::from_parts(
            vec![],
            vec![],
            vec![],
            vec![InteractionRule {
                id: "INT-1".into(),
                members: vec![InteractionMember::drug("warfarin")],
                severity: Severity::High,
                mechanism: "bleeding-risk".into(),
                reason: "x".into(),
            }],
        );
        assert!(matches!(result, Err(ReferenceError::MalformedRow { .. })));
    }

    #[test]
    fn non_positive_limit_rejected() {
        let result = ReferenceTables::from_parts(
            vec![],
            vec![],
            vec![daily_rule("A", 0.0, Severity::High)],
            vec![],
        );
        assert!(matches!(result, Err(ReferenceError::MalformedRow { .. })));
    }

    #[test]
    fn load_round_trips_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let builtin = ReferenceTables::builtin();
        let write = |file: &str, json: String| std::fs::write(dir.path().join(file), json).unwrap();
        write(VOCABULARY_FILE, serde_json::to_string(builtin.vocabulary()).unwrap());
        write(CLASSES_FILE, serde_json::to_string(builtin.classes()).unwrap());
        write(DOSAGE_RULES_FILE, serde_json::to_string(builtin.dosage_rules()).unwrap());
        write(
            INTERACTION_RULES_FILE,
            serde_json::to_string(builtin.interaction_rules()).unwrap(),
        );

        let loaded = ReferenceTables::load(dir.path()).unwrap();
        assert_eq!(loaded.vocabulary(), builtin.vocabulary());
        assert_eq!(loaded.dosage_rules(), builtin.dosage_rules());
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReferenceTables::load(dir.path()).unwrap_err();
        assert!(matches!(err, ReferenceError::Load(ref path, _) if path.contains(VOCABULARY_FILE)));
    }

    #[test]
    fn malformed_json_reports_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(VOCABULARY_FILE), "{not json").unwrap();
        let err = ReferenceTables::load(dir.path()).unwrap_err();
        assert!(matches!(err, ReferenceError::Parse(ref file, _) if file == VOCABULARY_FILE));
    }
}
