//! Bundled reference tables. Identifiers are RxNorm ingredient RxCUIs.

use crate::models::{ConditionFlag, Severity};

use super::types::{
    AgeBand, DosageRule, InteractionMember, InteractionRule, RuleCheck, RuleTarget,
    TherapeuticClass, VocabularyEntry, WeightBand,
};

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

fn entry(
    id: &str,
    name: &str,
    synonyms: &[&str],
    class: &str,
    regimen: (Option<f64>, Option<u32>),
    evidence_confidence: f64,
) -> VocabularyEntry {
    VocabularyEntry {
        id: id.into(),
        name: name.into(),
        synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
        therapeutic_class: class.into(),
        typical_single_dose_mg: regimen.0,
        typical_times_per_day: regimen.1,
        evidence_confidence,
    }
}

#[rustfmt::skip]
pub(super) fn vocabulary() -> Vec<VocabularyEntry> {
    vec![
        entry("1191", "aspirin", &["asa", "acetylsalicylic acid", "ecotrin", "bayer"], "antiplatelet", (Some(81.0), Some(1)), 0.95),
        entry("32968", "clopidogrel", &["plavix"], "antiplatelet", (Some(75.0), Some(1)), 0.95),
        entry("161", "acetaminophen", &["paracetamol", "tylenol", "panadol"], "analgesic", (Some(500.0), Some(4)), 0.95),
        entry("5640", "ibuprofen", &["advil", "motrin", "nurofen"], "nsaid", (Some(400.0), Some(3)), 0.95),
        entry("7258", "naproxen", &["aleve", "naprosyn"], "nsaid", (Some(250.0), Some(2)), 0.9),
        entry("11289", "warfarin", &["coumadin", "jantoven"], "anticoagulant", (Some(5.0), Some(1)), 0.95),
        entry("1364430", "apixaban", &["eliquis"], "anticoagulant", (Some(5.0), Some(2)), 0.9),
        entry("1114195", "rivaroxaban", &["xarelto"], "anticoagulant", (Some(20.0), Some(1)), 0.9),
        entry("723", "amoxicillin", &["amoxil", "amoxycillin"], "penicillin", (Some(500.0), Some(3)), 0.95),
        entry("7984", "penicillin v", &["penicillin", "pen vk", "phenoxymethylpenicillin"], "penicillin", (Some(500.0), Some(4)), 0.9),
        entry("733", "ampicillin", &[], "penicillin", (Some(500.0), Some(4)), 0.85),
        entry("2231", "cephalexin", &["keflex", "cefalexin"], "cephalosporin", (Some(500.0), Some(4)), 0.9),
        entry("18631", "azithromycin", &["zithromax", "z-pak"], "macrolide", (Some(500.0), Some(1)), 0.9),
        entry("21212", "clarithromycin", &["biaxin"], "macrolide", (Some(500.0), Some(2)), 0.85),
        entry("3640", "doxycycline", &["vibramycin"], "tetracycline", (Some(100.0), Some(2)), 0.9),
        entry("6809", "metformin", &["glucophage", "fortamet"], "biguanide", (Some(500.0), Some(2)), 0.95),
        entry("29046", "lisinopril", &["zestril", "prinivil"], "ace-inhibitor", (Some(10.0), Some(1)), 0.95),
        entry("3827", "enalapril", &["vasotec"], "ace-inhibitor", (Some(10.0), Some(2)), 0.9),
        entry("52175", "losartan", &["cozaar"], "arb", (Some(50.0), Some(1)), 0.9),
        entry("83367", "atorvastatin", &["lipitor"], "statin", (Some(20.0), Some(1)), 0.95),
        entry("36567", "simvastatin", &["zocor"], "statin", (Some(20.0), Some(1)), 0.9),
        entry("7646", "omeprazole", &["prilosec", "losec"], "ppi", (Some(20.0), Some(1)), 0.95),
        entry("40790", "pantoprazole", &["protonix"], "ppi", (Some(40.0), Some(1)), 0.9),
        entry("3407", "digoxin", &["lanoxin"], "cardiac-glycoside", (Some(0.125), Some(1)), 0.9),
        entry("6448", "lithium", &["lithobid", "lithium carbonate"], "mood-stabilizer", (Some(300.0), Some(3)), 0.85),
        entry("8183", "phenytoin", &["dilantin"], "anticonvulsant", (Some(100.0), Some(3)), 0.85),
        entry("5856", "insulin", &["humulin", "novolin", "lantus"], "insulin", (None, None), 0.8),
        entry("6918", "metoprolol", &["lopressor", "toprol"], "beta-blocker", (Some(50.0), Some(2)), 0.9),
        entry("17767", "amlodipine", &["norvasc"], "ccb", (Some(5.0), Some(1)), 0.9),
        entry("9997", "spironolactone", &["aldactone"], "potassium-sparing-diuretic", (Some(25.0), Some(1)), 0.9),
        entry("4603", "furosemide", &["lasix", "frusemide"], "loop-diuretic", (Some(40.0), Some(1)), 0.9),
        entry("5487", "hydrochlorothiazide", &["hctz"], "thiazide-diuretic", (Some(25.0), Some(1)), 0.9),
        entry("4493", "fluoxetine", &["prozac"], "ssri", (Some(20.0), Some(1)), 0.9),
        entry("36437", "sertraline", &["zoloft"], "ssri", (Some(50.0), Some(1)), 0.9),
        entry("10689", "tramadol", &["ultram"], "opioid", (Some(50.0), Some(4)), 0.85),
        entry("2670", "codeine", &[], "opioid", (Some(30.0), Some(4)), 0.85),
        entry("7052", "morphine", &["ms contin"], "opioid", (Some(10.0), Some(4)), 0.85),
    ]
}

// ---------------------------------------------------------------------------
// Classes
// ---------------------------------------------------------------------------

fn class(name: &str, substitutes: &[&str]) -> TherapeuticClass {
    TherapeuticClass {
        name: name.into(),
        substitute_classes: substitutes.iter().map(|s| s.to_string()).collect(),
    }
}

pub(super) fn classes() -> Vec<TherapeuticClass> {
    vec![
        class("penicillin", &["macrolide", "tetracycline"]),
        class("cephalosporin", &["macrolide", "tetracycline"]),
        class("macrolide", &["tetracycline"]),
        class("tetracycline", &["macrolide"]),
        class("nsaid", &["analgesic"]),
        class("analgesic", &[]),
        class("antiplatelet", &[]),
        class("anticoagulant", &[]),
        class("biguanide", &[]),
        class("ace-inhibitor", &["arb"]),
        class("arb", &["ace-inhibitor"]),
        class("statin", &[]),
        class("ppi", &[]),
        class("cardiac-glycoside", &[]),
        class("mood-stabilizer", &[]),
        class("anticonvulsant", &[]),
        class("insulin", &[]),
        class("beta-blocker", &["ccb"]),
        class("ccb", &["beta-blocker"]),
        class("potassium-sparing-diuretic", &[]),
        class("loop-diuretic", &["thiazide-diuretic"]),
        class("thiazide-diuretic", &["loop-diuretic"]),
        class("ssri", &[]),
        class("opioid", &["analgesic"]),
    ]
}

// ---------------------------------------------------------------------------
// Dosage rules
// ---------------------------------------------------------------------------

fn rule(id: &str, target: RuleTarget, severity: Severity, check: RuleCheck) -> DosageRule {
    DosageRule {
        id: id.into(),
        target,
        severity,
        check,
    }
}

fn drug(name: &str) -> RuleTarget {
    RuleTarget::Drug(name.into())
}

fn of_class(name: &str) -> RuleTarget {
    RuleTarget::Class(name.into())
}

fn adults() -> AgeBand {
    AgeBand {
        min_years: Some(12),
        max_years: None,
    }
}

fn children() -> AgeBand {
    AgeBand {
        min_years: None,
        max_years: Some(12),
    }
}

fn single(max_mg: f64, age: AgeBand) -> RuleCheck {
    RuleCheck::MaxSingleDose { max_mg, age }
}

fn daily(max_mg: f64, age: AgeBand) -> RuleCheck {
    RuleCheck::MaxDailyDose { max_mg, age }
}

fn per_kg(max_mg_per_kg: f64, weight: WeightBand, age: AgeBand) -> RuleCheck {
    RuleCheck::MaxDailyDosePerKg {
        max_mg_per_kg,
        weight,
        age,
    }
}

fn cross_reactive(allergens: &[&str]) -> RuleCheck {
    RuleCheck::AllergyCrossReactive {
        allergens: allergens.iter().map(|a| a.to_string()).collect(),
    }
}

fn organ(condition: ConditionFlag, max_daily_mg: Option<f64>) -> RuleCheck {
    RuleCheck::OrganImpairment {
        condition,
        max_daily_mg,
    }
}

fn pregnancy(category: &str) -> RuleCheck {
    RuleCheck::Pregnancy {
        category: category.into(),
    }
}

#[rustfmt::skip]
pub(super) fn dosage_rules() -> Vec<DosageRule> {
    use ConditionFlag::{HepaticImpairment, RenalImpairment};
    use Severity::{Critical, High, Warning};

    let all = AgeBand::default();
    let under_40kg = WeightBand {
        min_kg: None,
        max_kg: Some(40.0),
    };

    vec![
        // Allergy
        rule("ALG-EXACT", RuleTarget::Any, Critical, RuleCheck::AllergyExact),
        rule("ALG-PENICILLIN", of_class("penicillin"), Critical, cross_reactive(&["penicillin", "penicillins", "beta-lactam", "amoxicillin", "ampicillin"])),
        rule("ALG-CEPH-PEN", of_class("cephalosporin"), Warning, cross_reactive(&["penicillin", "penicillins", "amoxicillin", "ampicillin"])),
        rule("ALG-CEPH", of_class("cephalosporin"), Critical, cross_reactive(&["cephalosporin", "cephalosporins", "beta-lactam"])),
        rule("ALG-MACROLIDE", of_class("macrolide"), Critical, cross_reactive(&["macrolide", "macrolides", "erythromycin"])),
        rule("ALG-TETRACYCLINE", of_class("tetracycline"), Critical, cross_reactive(&["tetracycline", "tetracyclines", "minocycline"])),
        rule("ALG-NSAID", of_class("nsaid"), High, cross_reactive(&["nsaid", "nsaids", "aspirin", "salicylate"])),
        rule("ALG-ASA", drug("aspirin"), High, cross_reactive(&["nsaid", "nsaids", "ibuprofen", "naproxen", "salicylate"])),
        rule("ALG-OPIOID", of_class("opioid"), High, cross_reactive(&["opioid", "opioids", "opiate", "opiates"])),
        // Aspirin
        rule("DOSE-ASA-SINGLE", drug("aspirin"), Warning, single(1000.0, all)),
        rule("DOSE-ASA-DAILY", drug("aspirin"), Warning, daily(4000.0, all)),
        rule("AGE-ASA-REYE", drug("aspirin"), High, RuleCheck::MinimumAge { min_years: 16 }),
        // Acetaminophen
        rule("DOSE-APAP-SINGLE", drug("acetaminophen"), Warning, single(1000.0, adults())),
        rule("DOSE-APAP-DAILY", drug("acetaminophen"), High, daily(4000.0, adults())),
        rule("DOSE-APAP-PED", drug("acetaminophen"), High, per_kg(75.0, WeightBand::default(), children())),
        rule("ORG-APAP-HEPATIC", drug("acetaminophen"), High, organ(HepaticImpairment, Some(2000.0))),
        // NSAIDs
        rule("DOSE-IBU-SINGLE", drug("ibuprofen"), Warning, single(800.0, adults())),
        rule("DOSE-IBU-DAILY", drug("ibuprofen"), High, daily(3200.0, adults())),
        rule("DOSE-IBU-PED", drug("ibuprofen"), High, per_kg(40.0, WeightBand::default(), children())),
        rule("DOSE-NAPROXEN-DAILY", drug("naproxen"), High, daily(1500.0, all)),
        rule("ORG-NSAID-RENAL", of_class("nsaid"), High, organ(RenalImpairment, None)),
        rule("PREG-NSAID", of_class("nsaid"), High, pregnancy("D")),
        // Anticoagulants
        rule("PREG-WARFARIN", drug("warfarin"), Critical, pregnancy("X")),
        rule("MON-WARFARIN", drug("warfarin"), Warning, RuleCheck::Monitoring),
        // Antibiotics
        rule("DOSE-AMOX-SINGLE", drug("amoxicillin"), Warning, single(1000.0, all)),
        rule("DOSE-AMOX-PED", drug("amoxicillin"), High, per_kg(90.0, under_40kg, children())),
        rule("FREQ-AMOX", drug("amoxicillin"), Warning, RuleCheck::MaxFrequency { max_times_per_day: 3.0 }),
        rule("AGE-DOXY", drug("doxycycline"), Warning, RuleCheck::MinimumAge { min_years: 8 }),
        rule("PREG-TETRACYCLINE", of_class("tetracycline"), High, pregnancy("D")),
        // Cardiometabolic
        rule("DOSE-METFORMIN-DAILY", drug("metformin"), Warning, daily(2550.0, all)),
        rule("ORG-METFORMIN-RENAL", drug("metformin"), High, organ(RenalImpairment, None)),
        rule("PREG-ACE", of_class("ace-inhibitor"), Critical, pregnancy("D")),
        rule("PREG-ARB", of_class("arb"), Critical, pregnancy("D")),
        rule("DOSE-LISINOPRIL-DAILY", drug("lisinopril"), Warning, daily(80.0, all)),
        rule("PREG-STATIN", of_class("statin"), High, pregnancy("X")),
        rule("DOSE-ATORVA-DAILY", drug("atorvastatin"), High, daily(80.0, all)),
        rule("DOSE-SIMVA-DAILY", drug("simvastatin"), High, daily(80.0, all)),
        rule("DOSE-DIGOXIN-DAILY", drug("digoxin"), High, daily(0.25, all)),
        rule("ORG-DIGOXIN-RENAL", drug("digoxin"), High, organ(RenalImpairment, Some(0.125))),
        rule("MON-DIGOXIN", drug("digoxin"), Warning, RuleCheck::Monitoring),
        // Narrow therapeutic index
        rule("DOSE-LITHIUM-DAILY", drug("lithium"), High, daily(2400.0, all)),
        rule("ORG-LITHIUM-RENAL", drug("lithium"), High, organ(RenalImpairment, None)),
        rule("MON-LITHIUM", drug("lithium"), Warning, RuleCheck::Monitoring),
        rule("MON-PHENYTOIN", drug("phenytoin"), Warning, RuleCheck::Monitoring),
        rule("MON-INSULIN", drug("insulin"), Warning, RuleCheck::Monitoring),
        // Opioids
        rule("AGE-CODEINE", drug("codeine"), Critical, RuleCheck::MinimumAge { min_years: 12 }),
        rule("AGE-TRAMADOL", drug("tramadol"), Critical, RuleCheck::MinimumAge { min_years: 12 }),
        rule("DOSE-TRAMADOL-DAILY", drug("tramadol"), High, daily(400.0, all)),
    ]
}

// ---------------------------------------------------------------------------
// Interaction rules
// ---------------------------------------------------------------------------

fn interaction(
    id: &str,
    members: Vec<InteractionMember>,
    severity: Severity,
    mechanism: &str,
    reason: &str,
) -> InteractionRule {
    InteractionRule {
        id: id.into(),
        members,
        severity,
        mechanism: mechanism.into(),
        reason: reason.into(),
    }
}

fn classes_of(names: &[&str]) -> InteractionMember {
    InteractionMember {
        drugs: vec![],
        classes: names.iter().map(|s| s.to_string()).collect(),
    }
}

#[rustfmt::skip]
pub(super) fn interaction_rules() -> Vec<InteractionRule> {
    use InteractionMember as M;
    use Severity::{Critical, High, Warning};

    vec![
        interaction("INT-ANTICOAG-ANTIPLATELET", vec![M::class("anticoagulant"), M::class("antiplatelet")], High, "bleeding-risk",
            "Anticoagulant combined with an antiplatelet agent increases bleeding risk"),
        interaction("INT-WARFARIN-ASPIRIN", vec![M::drug("warfarin"), M::drug("aspirin")], High, "bleeding-risk",
            "Aspirin potentiates warfarin anticoagulation and impairs platelet function"),
        interaction("INT-ANTICOAG-NSAID", vec![M::class("anticoagulant"), M::class("nsaid")], High, "bleeding-risk",
            "NSAIDs add gastrointestinal bleeding risk to anticoagulation"),
        interaction("INT-ANTIPLATELET-NSAID", vec![M::class("antiplatelet"), M::class("nsaid")], Warning, "bleeding-risk",
            "NSAID with an antiplatelet agent raises gastrointestinal bleeding risk"),
        interaction("INT-SSRI-ANTICOAG", vec![M::class("ssri"), M::class("anticoagulant")], High, "bleeding-risk",
            "SSRIs impair platelet serotonin uptake and add to anticoagulant bleeding risk"),
        interaction("INT-SSRI-NSAID", vec![M::class("ssri"), M::class("nsaid")], Warning, "bleeding-risk",
            "SSRI with an NSAID raises gastrointestinal bleeding risk"),
        interaction("INT-TRIPLE-BLEED", vec![M::class("anticoagulant"), M::class("antiplatelet"), M::class("nsaid")], Critical, "bleeding-risk",
            "Anticoagulant, antiplatelet and NSAID together carry a very high bleeding risk"),
        interaction("INT-TRIPLE-WHAMMY", vec![classes_of(&["ace-inhibitor", "arb"]), classes_of(&["loop-diuretic", "thiazide-diuretic", "potassium-sparing-diuretic"]), M::class("nsaid")], High, "nephrotoxicity",
            "ACE inhibitor or ARB with a diuretic and an NSAID can precipitate acute kidney injury"),
        interaction("INT-RAAS-SPIRONOLACTONE", vec![classes_of(&["ace-inhibitor", "arb"]), M::class("potassium-sparing-diuretic")], High, "hyperkalemia",
            "Renin-angiotensin blockade with a potassium-sparing diuretic can cause hyperkalemia"),
        interaction("INT-SIMVA-CLARITHRO", vec![M::drug("simvastatin"), M::drug("clarithromycin")], Critical, "myopathy",
            "Clarithromycin inhibits CYP3A4 and sharply raises simvastatin exposure (rhabdomyolysis)"),
        interaction("INT-ATORVA-CLARITHRO", vec![M::drug("atorvastatin"), M::drug("clarithromycin")], Warning, "myopathy",
            "Clarithromycin raises atorvastatin exposure via CYP3A4 inhibition"),
        interaction("INT-SSRI-TRAMADOL", vec![M::class("ssri"), M::drug("tramadol")], High, "serotonin-syndrome",
            "Tramadol with an SSRI increases the risk of serotonin syndrome and seizures"),
        interaction("INT-DIGOXIN-CLARITHRO", vec![M::drug("digoxin"), M::drug("clarithromycin")], High, "digoxin-toxicity",
            "Clarithromycin inhibits P-glycoprotein and raises digoxin levels"),
        interaction("INT-DIGOXIN-LOOP", vec![M::drug("digoxin"), M::class("loop-diuretic")], Warning, "digoxin-toxicity",
            "Loop diuretic induced hypokalemia increases digoxin toxicity"),
        interaction("INT-LITHIUM-NSAID", vec![M::drug("lithium"), M::class("nsaid")], High, "lithium-toxicity",
            "NSAIDs reduce renal lithium clearance"),
        interaction("INT-LITHIUM-RAAS", vec![M::drug("lithium"), classes_of(&["ace-inhibitor", "arb"])], High, "lithium-toxicity",
            "ACE inhibitors and ARBs reduce renal lithium clearance"),
        interaction("INT-WARFARIN-CLARITHRO", vec![M::drug("warfarin"), M::drug("clarithromycin")], High, "anticoagulant-potentiation",
            "Clarithromycin inhibits warfarin metabolism and raises INR"),
        interaction("INT-WARFARIN-AZITHRO", vec![M::drug("warfarin"), M::drug("azithromycin")], Warning, "anticoagulant-potentiation",
            "Azithromycin may raise INR in patients on warfarin"),
    ]
}
