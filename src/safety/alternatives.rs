use std::collections::{BTreeMap, BTreeSet};

use crate::models::{
    AlternativeRecommendation, AlternativeSuggestion, Frequency, InteractionAlert,
    MedicationMention, NormalizedMedication, PatientProfile, SafetyAlert, Severity, Strength,
};
use crate::reference::{ReferenceTables, RuleCheck, VocabularyEntry};

use super::helpers::{severity_penalty, target_matches};
use super::messages::MessageTemplates;
use super::{dosage, interaction};

/// Recommend substitutes for every medication referenced by a HIGH or
/// CRITICAL alert, in medication order.
pub fn suggest_all(
    meds: &[NormalizedMedication],
    safety_alerts: &[SafetyAlert],
    interaction_alerts: &[InteractionAlert],
    patient: &PatientProfile,
    tables: &ReferenceTables,
    limit: usize,
) -> Vec<AlternativeRecommendation> {
    let mut triggers: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();
    for alert in safety_alerts.iter().filter(|a| a.severity.is_violation()) {
        triggers
            .entry(alert.medication.index)
            .or_default()
            .insert(alert.rule_id.clone());
    }
    for alert in interaction_alerts.iter().filter(|a| a.severity.is_violation()) {
        for med in &alert.medications {
            triggers
                .entry(med.index)
                .or_default()
                .extend(alert.rule_ids.iter().cloned());
        }
    }

    triggers
        .into_iter()
        .filter_map(|(index, rules)| {
            suggest(
                index,
                rules.into_iter().collect(),
                meds,
                patient,
                tables,
                limit,
            )
        })
        .collect()
}

/// Safer substitutes for `meds[index]`.
///
/// Candidates come from the medication's therapeutic class; when none
/// survives, from the class's declared substitute classes. Each candidate is
/// swapped into a copy of the medication list and re-checked by the dosage
/// validator and interaction detector; any HIGH or CRITICAL alert on the
/// candidate rejects it. Returns `None` only for an out-of-range index.
pub fn suggest(
    index: usize,
    triggering_rules: Vec<String>,
    meds: &[NormalizedMedication],
    patient: &PatientProfile,
    tables: &ReferenceTables,
    limit: usize,
) -> Option<AlternativeRecommendation> {
    let original = meds.get(index)?;
    let present: BTreeSet<String> = meds.iter().map(NormalizedMedication::rule_key).collect();

    let mut suggestions = Vec::new();
    if let Some(class) = original.therapeutic_class.as_deref() {
        suggestions = evaluate_pool(index, class, false, &present, meds, patient, tables);

        if suggestions.is_empty() {
            let substitutes = tables
                .class(class)
                .map(|c| c.substitute_classes.clone())
                .unwrap_or_default();
            for substitute in &substitutes {
                suggestions.extend(evaluate_pool(
                    index, substitute, true, &present, meds, patient, tables,
                ));
            }
        }
    }

    suggestions.sort_by(|a, b| {
        b.safety_margin_score
            .total_cmp(&a.safety_margin_score)
            .then_with(|| b.source_confidence.total_cmp(&a.source_confidence))
            .then_with(|| a.canonical_name.cmp(&b.canonical_name))
    });
    suggestions.truncate(limit);

    tracing::debug!(
        index,
        suggestions = suggestions.len(),
        "Alternative search complete"
    );
    Some(AlternativeRecommendation {
        medication: original.reference(index),
        triggering_rules,
        no_safer_alternative_found: suggestions.is_empty(),
        suggestions,
    })
}

fn evaluate_pool(
    index: usize,
    class: &str,
    substitute_class: bool,
    present: &BTreeSet<String>,
    meds: &[NormalizedMedication],
    patient: &PatientProfile,
    tables: &ReferenceTables,
) -> Vec<AlternativeSuggestion> {
    tables
        .class_members(class)
        .filter(|entry| !present.contains(&entry.name))
        .filter_map(|entry| evaluate(index, entry, substitute_class, meds, patient, tables))
        .collect()
}

fn evaluate(
    index: usize,
    entry: &VocabularyEntry,
    substitute_class: bool,
    meds: &[NormalizedMedication],
    patient: &PatientProfile,
    tables: &ReferenceTables,
) -> Option<AlternativeSuggestion> {
    let original = meds.get(index)?;
    let candidate = hypothetical(original, entry);

    let mut swapped = meds.to_vec();
    swapped[index] = candidate.clone();

    let safety = dosage::validate(&candidate, index, patient, tables);
    let interactions = interaction::detect(&swapped, tables);
    let worst = safety
        .iter()
        .map(|a| a.severity)
        .chain(
            interactions
                .alerts
                .iter()
                .filter(|a| a.involves(index))
                .map(|a| a.severity),
        )
        .max();

    if worst.is_some_and(|s: Severity| s.is_violation()) {
        tracing::debug!(candidate = %entry.name, "Alternative rejected on re-validation");
        return None;
    }

    let original_name = original.display_name();
    let rationale = if substitute_class {
        MessageTemplates::alternative_substitute_class(
            &entry.name,
            &entry.therapeutic_class,
            original.therapeutic_class.as_deref().unwrap_or(&original_name),
        )
    } else {
        MessageTemplates::alternative_same_class(&entry.name, &entry.therapeutic_class, &original_name)
    };

    Some(AlternativeSuggestion {
        original: original.reference(index),
        candidate_id: entry.id.clone(),
        canonical_name: entry.name.clone(),
        therapeutic_class: entry.therapeutic_class.clone(),
        rationale,
        safety_margin_score: dose_headroom(&candidate, patient, tables) * severity_penalty(worst),
        source_confidence: entry.evidence_confidence,
    })
}

/// The original prescription with the drug swapped for `entry` at its
/// standard regimen.
fn hypothetical(original: &NormalizedMedication, entry: &VocabularyEntry) -> NormalizedMedication {
    let mention = MedicationMention {
        raw_text: entry.name.clone(),
        span: original.mention.span,
        drug_name: entry.name.clone(),
        strength: entry.typical_single_dose_mg.map(Strength::mg),
        route: original.mention.route,
        frequency: entry
            .typical_times_per_day
            .map(|times| Frequency::TimesPerDay { times }),
        duration_days: original.mention.duration_days,
        extraction_confidence: original.mention.extraction_confidence,
        extraction_source: original.mention.extraction_source,
    };
    NormalizedMedication {
        candidate_id: Some(entry.id.clone()),
        canonical_name: Some(entry.name.clone()),
        generic_name: Some(entry.name.clone()),
        therapeutic_class: Some(entry.therapeutic_class.clone()),
        match_score: Some(1.0),
        normalization_confidence: mention.extraction_confidence,
        mention,
    }
}

/// Smallest fractional distance below any applicable dose limit, in [0, 1].
/// 1.0 when no dose limit applies.
fn dose_headroom(
    med: &NormalizedMedication,
    patient: &PatientProfile,
    tables: &ReferenceTables,
) -> f64 {
    let age = patient.age_years();
    let single = med.mention.single_dose_mg();
    let daily = med.mention.daily_dose_mg();

    tables
        .dosage_rules()
        .iter()
        .filter(|rule| target_matches(&rule.target, med, tables))
        .filter_map(|rule| match &rule.check {
            RuleCheck::MaxSingleDose { max_mg, age: band } if band.contains(age) => {
                Some(single? / max_mg)
            }
            RuleCheck::MaxDailyDose { max_mg, age: band } if band.contains(age) => {
                Some(daily? / max_mg)
            }
            RuleCheck::MaxDailyDosePerKg {
                max_mg_per_kg,
                weight,
                age: band,
            } if band.contains(age) => {
                let kg = patient.weight_kg.filter(|kg| weight.contains(*kg))?;
                Some(daily? / kg / max_mg_per_kg)
            }
            _ => None,
        })
        .map(|ratio| (1.0 - ratio).clamp(0.0, 1.0))
        .fold(1.0, f64::min)
}
