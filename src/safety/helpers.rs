use std::collections::BTreeSet;

use crate::models::{NormalizedMedication, Severity};
use crate::reference::{ReferenceTables, RuleTarget, VocabularyEntry};

/// Format a milligram value for display.
pub fn format_dose_mg(mg: f64) -> String {
    if mg >= 1000.0 {
        format!("{}g", trim_float(mg / 1000.0))
    } else if mg < 1.0 {
        format!("{}mcg", trim_float(mg * 1000.0))
    } else {
        format!("{}mg", trim_float(mg))
    }
}

/// Up to two decimals, no trailing zeros.
pub fn trim_float(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    let text = format!("{rounded:.2}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Reference entry behind a medication, when it has one.
pub fn reference_entry<'a>(
    med: &NormalizedMedication,
    tables: &'a ReferenceTables,
) -> Option<&'a VocabularyEntry> {
    med.candidate_id
        .as_deref()
        .and_then(|id| tables.entry_by_id(id))
        .or_else(|| {
            med.generic_name
                .as_deref()
                .and_then(|name| tables.entry_by_name(name))
        })
}

/// Every lowercase name the medication may be listed under in an allergy
/// list: generic, canonical, as written, plus vocabulary synonyms.
pub fn allergy_names(med: &NormalizedMedication, tables: &ReferenceTables) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    names.insert(med.rule_key());
    names.insert(med.mention.drug_name.trim().to_lowercase());
    if let Some(canonical) = &med.canonical_name {
        names.insert(canonical.trim().to_lowercase());
    }
    if let Some(entry) = reference_entry(med, tables) {
        names.insert(entry.name.clone());
        names.extend(entry.synonyms.iter().map(|s| s.to_lowercase()));
    }
    names
}

/// Does the rule target this medication?
///
/// Unresolved medications only match `Any` and drug-literal targets; the
/// literal is compared against the name as written and against the generic
/// it is a known synonym of.
pub fn target_matches(
    target: &RuleTarget,
    med: &NormalizedMedication,
    tables: &ReferenceTables,
) -> bool {
    match target {
        RuleTarget::Any => true,
        RuleTarget::Drug(name) => {
            let name = name.to_lowercase();
            if med.rule_key() == name {
                return true;
            }
            !med.is_resolved()
                && tables
                    .entry_by_name(&med.mention.drug_name)
                    .is_some_and(|e| e.name == name)
        }
        RuleTarget::Class(class) => {
            med.is_resolved()
                && med
                    .therapeutic_class
                    .as_deref()
                    .is_some_and(|c| c.eq_ignore_ascii_case(class))
        }
    }
}

/// Margin multiplier for the worst non-violation alert a substitute keeps.
pub fn severity_penalty(worst: Option<Severity>) -> f64 {
    match worst {
        None => 1.0,
        Some(Severity::Info) => 0.9,
        Some(Severity::Warning) => 0.75,
        Some(Severity::High | Severity::Critical) => 0.0,
    }
}
