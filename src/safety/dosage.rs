use crate::models::{
    ConditionFlag, NormalizedMedication, PatientProfile, SafetyAlert, TriggerAttribute,
};
use crate::reference::{DosageRule, ReferenceTables, RuleCheck};

use super::helpers::{allergy_names, format_dose_mg, target_matches, trim_float};
use super::messages::MessageTemplates;

/// Confidence multiplier for alerts on medications that failed normalization.
const UNVERIFIED_DISCOUNT: f64 = 0.5;

/// Check one medication against every applicable dosage rule, in table order.
///
/// All matching rules fire; the medication and patient are only read.
pub fn validate(
    med: &NormalizedMedication,
    index: usize,
    patient: &PatientProfile,
    tables: &ReferenceTables,
) -> Vec<SafetyAlert> {
    let unverified = !med.is_resolved();
    let confidence = if unverified {
        med.mention.extraction_confidence * UNVERIFIED_DISCOUNT
    } else {
        med.normalization_confidence
    };

    tables
        .dosage_rules()
        .iter()
        .filter(|rule| target_matches(&rule.target, med, tables))
        .filter_map(|rule| {
            let (reason, triggering_attributes) = evaluate(rule, med, patient, tables)?;
            Some(SafetyAlert {
                medication: med.reference(index),
                rule_id: rule.id.clone(),
                severity: rule.severity,
                reason: if unverified {
                    MessageTemplates::unverified_suffix(&reason)
                } else {
                    reason
                },
                triggering_attributes,
                unverified,
                confidence,
            })
        })
        .collect()
}

/// Validate every medication; alerts come out grouped by medication index.
pub fn validate_all(
    meds: &[NormalizedMedication],
    patient: &PatientProfile,
    tables: &ReferenceTables,
) -> Vec<SafetyAlert> {
    let alerts: Vec<SafetyAlert> = meds
        .iter()
        .enumerate()
        .flat_map(|(index, med)| validate(med, index, patient, tables))
        .collect();
    tracing::debug!(alerts = alerts.len(), "Dosage validation complete");
    alerts
}

/// `Some((reason, attributes))` when the rule is violated.
fn evaluate(
    rule: &DosageRule,
    med: &NormalizedMedication,
    patient: &PatientProfile,
    tables: &ReferenceTables,
) -> Option<(String, Vec<TriggerAttribute>)> {
    let name = med.display_name();
    let age = patient.age_years();

    match &rule.check {
        RuleCheck::MaxSingleDose { max_mg, age: band } => {
            let dose = med.mention.single_dose_mg()?;
            (band.contains(age) && dose > *max_mg).then(|| {
                (
                    MessageTemplates::single_dose(
                        &name,
                        &format_dose_mg(dose),
                        &format_dose_mg(*max_mg),
                        &band.label(),
                    ),
                    vec![TriggerAttribute::SingleDoseMg(dose), TriggerAttribute::Age(age)],
                )
            })
        }
        RuleCheck::MaxDailyDose { max_mg, age: band } => {
            let daily = med.mention.daily_dose_mg()?;
            (band.contains(age) && daily > *max_mg).then(|| {
                (
                    MessageTemplates::daily_dose(
                        &name,
                        &format_dose_mg(daily),
                        &format_dose_mg(*max_mg),
                        &band.label(),
                    ),
                    vec![TriggerAttribute::DailyDoseMg(daily), TriggerAttribute::Age(age)],
                )
            })
        }
        RuleCheck::MaxDailyDosePerKg {
            max_mg_per_kg,
            weight: weight_band,
            age: age_band,
        } => {
            let weight = patient.weight_kg?;
            let daily = med.mention.daily_dose_mg()?;
            let per_kg = daily / weight;
            (age_band.contains(age) && weight_band.contains(weight) && per_kg > *max_mg_per_kg)
                .then(|| {
                    (
                        MessageTemplates::weight_based_dose(
                            &name,
                            &trim_float(per_kg),
                            &trim_float(*max_mg_per_kg),
                        ),
                        vec![
                            TriggerAttribute::DailyDoseMgPerKg(per_kg),
                            TriggerAttribute::WeightKg(weight),
                            TriggerAttribute::Age(age),
                        ],
                    )
                })
        }
        RuleCheck::MinimumAge { min_years } => (age < *min_years).then(|| {
            (
                MessageTemplates::minimum_age(&name, age, *min_years),
                vec![TriggerAttribute::Age(age)],
            )
        }),
        RuleCheck::AllergyExact => {
            let names = allergy_names(med, tables);
            let allergen = patient
                .normalized_allergies()
                .into_iter()
                .find(|a| names.contains(a))?;
            Some((
                MessageTemplates::allergy_exact(&name, &allergen),
                vec![TriggerAttribute::Allergy(allergen)],
            ))
        }
        RuleCheck::AllergyCrossReactive { allergens } => {
            let allergen = patient
                .normalized_allergies()
                .into_iter()
                .find(|a| allergens.iter().any(|x| x.eq_ignore_ascii_case(a)))?;
            Some((
                MessageTemplates::allergy_cross_reactive(&name, &allergen),
                vec![TriggerAttribute::Allergy(allergen)],
            ))
        }
        RuleCheck::OrganImpairment {
            condition,
            max_daily_mg,
        } => {
            if !patient.has_flag(*condition) {
                return None;
            }
            match max_daily_mg {
                None => Some((
                    MessageTemplates::organ_contraindicated(&name, *condition),
                    vec![TriggerAttribute::Condition(*condition)],
                )),
                Some(max) => {
                    let daily = med.mention.daily_dose_mg()?;
                    (daily > *max).then(|| {
                        (
                            MessageTemplates::organ_dose_limit(
                                &name,
                                *condition,
                                &format_dose_mg(daily),
                                &format_dose_mg(*max),
                            ),
                            vec![
                                TriggerAttribute::Condition(*condition),
                                TriggerAttribute::DailyDoseMg(daily),
                            ],
                        )
                    })
                }
            }
        }
        RuleCheck::Pregnancy { category } => patient.has_flag(ConditionFlag::Pregnant).then(|| {
            (
                MessageTemplates::pregnancy(&name, category),
                vec![TriggerAttribute::Condition(ConditionFlag::Pregnant)],
            )
        }),
        RuleCheck::MaxFrequency { max_times_per_day } => {
            let times = med.mention.frequency?.times_per_day()?;
            (times > *max_times_per_day).then(|| {
                (
                    MessageTemplates::frequency(
                        &name,
                        &trim_float(times),
                        &trim_float(*max_times_per_day),
                    ),
                    vec![TriggerAttribute::TimesPerDay(times)],
                )
            })
        }
        RuleCheck::Monitoring => Some((
            MessageTemplates::monitoring(&name),
            vec![TriggerAttribute::Medication(med.rule_key())],
        )),
    }
}
