use crate::models::ConditionFlag;

/// Reason text for alerts and suggestions. Clinical register, one sentence
/// stating the finding, one stating the limit.
pub struct MessageTemplates;

impl MessageTemplates {
    pub fn allergy_exact(medication: &str, allergen: &str) -> String {
        format!(
            "Patient has a documented allergy to {allergen}. {medication} must not be given."
        )
    }

    pub fn allergy_cross_reactive(medication: &str, allergen: &str) -> String {
        format!(
            "Patient has a documented allergy to {allergen}, which cross-reacts with {medication}."
        )
    }

    pub fn single_dose(medication: &str, dose: &str, max: &str, band: &str) -> String {
        format!(
            "Single dose of {medication} is {dose}. The maximum single dose ({band}) is {max}."
        )
    }

    pub fn daily_dose(medication: &str, daily_total: &str, max: &str, band: &str) -> String {
        format!(
            "Daily total of {medication} comes to {daily_total}. The maximum daily dose ({band}) is {max}."
        )
    }

    pub fn weight_based_dose(medication: &str, mg_per_kg: &str, max_mg_per_kg: &str) -> String {
        format!(
            "Daily dose of {medication} is {mg_per_kg} mg/kg. The weight-based maximum is {max_mg_per_kg} mg/kg/day."
        )
    }

    pub fn minimum_age(medication: &str, age: u32, min_years: u32) -> String {
        format!(
            "{medication} is not recommended under age {min_years}. Patient is {age}."
        )
    }

    pub fn organ_contraindicated(medication: &str, condition: ConditionFlag) -> String {
        format!("{medication} is contraindicated with {}.", condition_label(condition))
    }

    pub fn organ_dose_limit(
        medication: &str,
        condition: ConditionFlag,
        daily_total: &str,
        max: &str,
    ) -> String {
        format!(
            "Daily total of {medication} is {daily_total}. With {} the maximum is {max}.",
            condition_label(condition)
        )
    }

    pub fn pregnancy(medication: &str, category: &str) -> String {
        format!(
            "{medication} is pregnancy category {category} and restricted during pregnancy."
        )
    }

    pub fn frequency(medication: &str, times_per_day: &str, max: &str) -> String {
        format!(
            "{medication} is scheduled {times_per_day} times daily. The label maximum is {max} times daily."
        )
    }

    pub fn monitoring(medication: &str) -> String {
        format!(
            "{medication} has a narrow therapeutic index and requires level or effect monitoring."
        )
    }

    pub fn unverified_suffix(reason: &str) -> String {
        format!("{reason} (medication not verified against the vocabulary)")
    }

    pub fn alternative_same_class(candidate: &str, class: &str, original: &str) -> String {
        format!(
            "{candidate} is in the same class ({class}) as {original} and triggers no high-severity alert for this patient."
        )
    }

    pub fn alternative_substitute_class(candidate: &str, class: &str, original: &str) -> String {
        format!(
            "No {original} class member is safe for this patient. {candidate} ({class}) is an accepted substitute and triggers no high-severity alert."
        )
    }
}

fn condition_label(condition: ConditionFlag) -> &'static str {
    match condition {
        ConditionFlag::RenalImpairment => "renal impairment",
        ConditionFlag::HepaticImpairment => "hepatic impairment",
        ConditionFlag::Pregnant => "pregnancy",
    }
}
