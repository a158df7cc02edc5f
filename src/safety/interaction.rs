use std::collections::{BTreeMap, BTreeSet};

use crate::models::{InteractionAlert, MedicationRef, NormalizedMedication, Severity};
use crate::reference::{InteractionMember, InteractionRule, ReferenceTables};

/// Interaction alerts plus the medications that could not be checked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionOutcome {
    pub alerts: Vec<InteractionAlert>,
    /// Unresolved medications left out of the check.
    pub excluded: Vec<MedicationRef>,
}

impl InteractionOutcome {
    pub fn is_complete(&self) -> bool {
        self.excluded.is_empty()
    }
}

/// Resolved medication as seen by interaction patterns.
struct Participant<'a> {
    index: usize,
    generic: String,
    class: Option<&'a str>,
}

#[derive(Default)]
struct Accumulated {
    severity: Option<Severity>,
    reasons: Vec<String>,
    rule_ids: BTreeSet<String>,
}

/// Check every unordered pair of resolved medications and every multi-drug
/// pattern.
///
/// At most one alert per (medication set, mechanism): matching rules merge,
/// keeping the highest severity. Output order is by medication set, then
/// mechanism.
pub fn detect(meds: &[NormalizedMedication], tables: &ReferenceTables) -> InteractionOutcome {
    let mut excluded = Vec::new();
    let mut participants = Vec::new();
    for (index, med) in meds.iter().enumerate() {
        if med.is_resolved() {
            participants.push(Participant {
                index,
                generic: med.rule_key(),
                class: med.therapeutic_class.as_deref(),
            });
        } else {
            excluded.push(med.reference(index));
        }
    }

    let mut merged: BTreeMap<(Vec<usize>, String), Accumulated> = BTreeMap::new();
    for rule in tables.interaction_rules() {
        for set in matching_sets(rule, &participants) {
            let acc = merged.entry((set, rule.mechanism.clone())).or_default();
            acc.severity = acc.severity.max(Some(rule.severity));
            if !acc.reasons.contains(&rule.reason) {
                acc.reasons.push(rule.reason.clone());
            }
            acc.rule_ids.insert(rule.id.clone());
        }
    }

    let alerts: Vec<InteractionAlert> = merged
        .into_iter()
        .filter_map(|((set, mechanism), acc)| {
            Some(InteractionAlert {
                medications: set.iter().map(|&i| meds[i].reference(i)).collect(),
                severity: acc.severity?,
                mechanism,
                reason: acc.reasons.join("; "),
                rule_ids: acc.rule_ids.into_iter().collect(),
            })
        })
        .collect();

    if !excluded.is_empty() {
        tracing::warn!(
            excluded = excluded.len(),
            "Unresolved medications excluded from interaction check"
        );
    }
    tracing::debug!(alerts = alerts.len(), "Interaction detection complete");

    InteractionOutcome { alerts, excluded }
}

/// Every distinct medication set (sorted indices) that fills all rule
/// members with distinct drugs.
fn matching_sets(rule: &InteractionRule, participants: &[Participant]) -> BTreeSet<Vec<usize>> {
    let mut sets = BTreeSet::new();
    let mut chosen: Vec<usize> = Vec::with_capacity(rule.members.len());
    assign(&rule.members, participants, &mut chosen, &mut sets);
    sets
}

fn assign(
    members: &[InteractionMember],
    participants: &[Participant],
    chosen: &mut Vec<usize>,
    sets: &mut BTreeSet<Vec<usize>>,
) {
    let Some((member, rest)) = members.split_first() else {
        let mut indices: Vec<usize> = chosen.iter().map(|&p| participants[p].index).collect();
        indices.sort_unstable();
        sets.insert(indices);
        return;
    };

    for (p, participant) in participants.iter().enumerate() {
        // The same drug listed twice is one drug, not an interaction.
        let clashes = chosen
            .iter()
            .any(|&c| c == p || participants[c].generic == participant.generic);
        if clashes || !member.matches(&participant.generic, participant.class) {
            continue;
        }
        chosen.push(p);
        assign(rest, participants, chosen, sets);
        chosen.pop();
    }
}
