//! Cleanup applied to raw prescription text before extraction.
//!
//! OCR output confuses `O`/`0` and `l`/`1` inside doses and garbles drug
//! names. Name correction only fires for close, unambiguous matches against
//! the vocabulary gazetteer: one edit for words of five characters or more,
//! two substitutions for words of eight or more. An inserted or dropped
//! syllable ("prednisone" vs "prednisolone") is a different drug, not noise.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static RE_OCR_DOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([0-9][0-9OoIl]*(?:\.[0-9OoIl]+)?)(\s*(?i:mcg|mg|ml|g|iu)\b)").unwrap()
});

const MIN_CORRECTION_LEN: usize = 5;
const LONG_WORD_LEN: usize = 8;

/// Output of [`preprocess`].
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessed {
    pub text: String,
    pub corrections: usize,
}

/// Whitespace collapse, OCR digit repair, drug-name correction.
pub fn preprocess(text: &str, gazetteer: &[String]) -> Preprocessed {
    let collapsed = collapse_whitespace(text);
    let repaired = repair_dose_digits(&collapsed);
    let (text, corrections) = correct_drug_names(&repaired, gazetteer);
    if corrections > 0 {
        tracing::debug!(corrections, "Corrected OCR drug names");
    }
    Preprocessed { text, corrections }
}

/// Keep at most `max_chars` characters. Returns whether anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    RE_WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// `1OOmg` → `100mg`, `5Omg` → `50mg`, `l0mg` is left alone (must start with a digit).
pub fn repair_dose_digits(text: &str) -> String {
    RE_OCR_DOSE
        .replace_all(text, |caps: &Captures| {
            let digits: String = caps[1]
                .chars()
                .map(|c| match c {
                    'O' | 'o' => '0',
                    'I' | 'l' => '1',
                    other => other,
                })
                .collect();
            format!("{digits}{}", &caps[2])
        })
        .into_owned()
}

/// Correct single-word drug names against the gazetteer.
/// Returns the corrected text and the number of words changed.
pub fn correct_drug_names(text: &str, gazetteer: &[String]) -> (String, usize) {
    let dictionary: Vec<&str> = gazetteer
        .iter()
        .map(String::as_str)
        .filter(|t| !t.contains(' '))
        .collect();

    let mut result = String::with_capacity(text.len());
    let mut word = String::new();
    let mut corrections = 0;

    let mut flush = |word: &mut String, result: &mut String| {
        if word.is_empty() {
            return;
        }
        match correct_word(word, &dictionary) {
            Some(corrected) => {
                result.push_str(&corrected);
                corrections += 1;
            }
            None => result.push_str(word),
        }
        word.clear();
    };

    for ch in text.chars() {
        if ch.is_alphabetic() {
            word.push(ch);
        } else {
            flush(&mut word, &mut result);
            result.push(ch);
        }
    }
    flush(&mut word, &mut result);

    (result, corrections)
}

/// `Some(correction)` only for a unique closest term within the distance limit.
fn correct_word(word: &str, dictionary: &[&str]) -> Option<String> {
    if word.chars().count() < MIN_CORRECTION_LEN {
        return None;
    }
    let lower = word.to_lowercase();
    if dictionary.binary_search(&lower.as_str()).is_ok() {
        return None;
    }
    let word_len = lower.chars().count();

    let mut best: Option<&str> = None;
    let mut best_distance = usize::MAX;
    let mut ambiguous = false;

    for &term in dictionary {
        let term_len = term.chars().count();
        if word_len.abs_diff(term_len) > 1 {
            continue;
        }
        let distance = strsim::levenshtein(&lower, term);
        if distance > max_distance(word_len, term_len) {
            continue;
        }
        if distance < best_distance {
            best_distance = distance;
            best = Some(term);
            ambiguous = false;
        } else if distance == best_distance && best.is_some() {
            ambiguous = true;
        }
    }

    match best {
        Some(term) if !ambiguous => Some(preserve_case(word, term)),
        _ => None,
    }
}

/// Two edits only as same-length substitutions in a long word.
fn max_distance(word_len: usize, term_len: usize) -> usize {
    if word_len >= LONG_WORD_LEN && word_len == term_len {
        2
    } else {
        1
    }
}

fn preserve_case(original: &str, correction: &str) -> String {
    if original.chars().all(|c| c.is_uppercase()) {
        return correction.to_uppercase();
    }
    let mut chars = correction.chars();
    match (original.chars().next(), chars.next()) {
        (Some(first), Some(c)) if first.is_uppercase() => {
            c.to_uppercase().chain(chars).collect()
        }
        _ => correction.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gazetteer() -> Vec<String> {
        let mut terms: Vec<String> = ["amoxicillin", "aspirin", "metformin", "penicillin v", "warfarin"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        terms.sort();
        terms
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(collapse_whitespace("  Aspirin\t100mg \n\n OD "), "Aspirin 100mg OD");
    }

    #[test]
    fn repairs_ocr_digits_in_doses() {
        assert_eq!(repair_dose_digits("Aspirin 1OOmg OD"), "Aspirin 100mg OD");
        assert_eq!(repair_dose_digits("Warfarin 5Omg"), "Warfarin 50mg");
        assert_eq!(repair_dose_digits("Metformin 5OO MG bd"), "Metformin 500 MG bd");
    }

    #[test]
    fn leaves_words_alone() {
        assert_eq!(repair_dose_digits("Old dose 10 IU"), "Old dose 10 IU");
        assert_eq!(repair_dose_digits("Take OD"), "Take OD");
    }

    #[test]
    fn corrects_garbled_names() {
        let (text, n) = correct_drug_names("Metfonnin 500mg BD", &gazetteer());
        assert_eq!(text, "Metformin 500mg BD");
        assert_eq!(n, 1);
        let (text, _) = correct_drug_names("Warfarln 5mg", &gazetteer());
        assert_eq!(text, "Warfarin 5mg");
        let (text, _) = correct_drug_names("ASPIRlN", &gazetteer());
        assert_eq!(text, "Aspirin");
    }

    #[test]
    fn different_drug_one_syllable_apart_untouched() {
        let gazetteer = vec!["prednisolone".to_string()];
        let (text, n) = correct_drug_names("Prednisone 20mg OD", &gazetteer);
        assert_eq!(text, "Prednisone 20mg OD");
        assert_eq!(n, 0);

        let (text, n) = correct_drug_names("Prednisolune 5mg", &gazetteer);
        assert_eq!(text, "Prednisolone 5mg");
        assert_eq!(n, 1);
    }

    #[test]
    fn short_words_get_one_edit() {
        let (text, n) = correct_drug_names("Aspixxn 100mg", &gazetteer());
        assert_eq!(text, "Aspixxn 100mg");
        assert_eq!(n, 0);
        let (text, _) = correct_drug_names("Asprin 100mg", &gazetteer());
        assert_eq!(text, "Aspirin 100mg");
    }

    #[test]
    fn short_and_unrelated_words_untouched() {
        let (text, n) = correct_drug_names("Take one tablet daily for pain", &gazetteer());
        assert_eq!(text, "Take one tablet daily for pain");
        assert_eq!(n, 0);
    }

    #[test]
    fn truncates_on_char_boundary() {
        let (text, cut) = truncate_chars("héllo wörld", 4);
        assert_eq!(text, "héll");
        assert!(cut);
        let (text, cut) = truncate_chars("short", 10);
        assert_eq!(text, "short");
        assert!(!cut);
    }

    #[test]
    fn full_preprocess() {
        let out = preprocess("Amoxicilin  5OOmg\nTDS", &gazetteer());
        assert_eq!(out.text, "Amoxicillin 500mg TDS");
        assert_eq!(out.corrections, 1);
    }
}
