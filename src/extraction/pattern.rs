use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::{Captures, Regex};

use crate::models::{ExtractionSource, MedicationMention, TextSpan};
use crate::reference::Gazetteer;

use super::grammar::{
    parse_duration_days, parse_frequency, parse_route, parse_strength, DURATION_PATTERN,
    FREQUENCY_PATTERN, ROUTE_PATTERN, UNIT_PATTERN,
};
use super::{Extraction, MedicationExtractor};

const BASE_CONFIDENCE: f64 = 0.6;
const STRENGTH_BONUS: f64 = 0.2;
const FREQUENCY_BONUS: f64 = 0.1;
const DURATION_BONUS: f64 = 0.1;
const MAX_CONFIDENCE: f64 = 0.95;
const BARE_NAME_CONFIDENCE: f64 = 0.5;

/// `<name> <strength> [form] [route] [frequency] [duration]`, name up to two words.
static RE_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?P<name>[a-z][a-z\-]*(?: [a-z][a-z\-]*)?) (?P<strength>\d+(?:\.\d+)?\s*(?:{UNIT_PATTERN}))\b(?: (?:tabs?|tablets?|caps?|capsules?)\b)?(?: (?P<route>{ROUTE_PATTERN})\b\.?)?(?: (?P<freq>{FREQUENCY_PATTERN})\b\.?)?(?: (?P<duration>{DURATION_PATTERN})\b)?"
    ))
    .unwrap()
});

static RE_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z][A-Za-z\-]*").unwrap());

/// Words that precede a drug name but are never one.
const NON_DRUG_WORDS: &[&str] = &[
    "and", "cap", "caps", "capsule", "dose", "for", "give", "inj", "injection", "of", "rx",
    "sig", "syrup", "tab", "tablet", "tabs", "take", "then", "with",
];

/// Salt and release-form words that follow a drug name.
const NAME_SUFFIXES: &[&str] = &[
    "acetate", "besylate", "calcium", "carbonate", "citrate", "cr", "dr", "ec", "er",
    "hcl", "hydrochloride", "la", "maleate", "mesylate", "mr", "phosphate", "potassium",
    "sodium", "sr", "succinate", "sulfate", "sulphate", "tartrate", "xl", "xr",
];

/// Rule-based extractor: always available, deterministic.
///
/// Each well-formed `name + strength` pattern yields exactly one mention.
/// When no pattern matches, bare gazetteer names are reported with low
/// confidence. Names are checked against the gazetteer of the caller's
/// reference snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternExtractor;

impl PatternExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous extraction over preprocessed text.
    pub fn extract_mentions(&self, text: &str, gazetteer: &Gazetteer) -> Vec<MedicationMention> {
        let mentions: Vec<MedicationMention> = RE_MENTION
            .captures_iter(text)
            .filter_map(|caps| structured_mention(&caps, gazetteer))
            .collect();

        if !mentions.is_empty() {
            return mentions;
        }
        bare_names(text, gazetteer)
    }
}

fn structured_mention(caps: &Captures, gazetteer: &Gazetteer) -> Option<MedicationMention> {
    let whole = caps.get(0)?;
    let name_match = caps.name("name")?;
    let (name_offset, drug_name) = resolve_name(name_match.as_str(), gazetteer)?;

    let strength = caps.name("strength").and_then(|m| parse_strength(m.as_str()));
    let route = caps.name("route").and_then(|m| parse_route(m.as_str()));
    let frequency = caps.name("freq").and_then(|m| parse_frequency(m.as_str()));
    let duration_days = caps
        .name("duration")
        .and_then(|m| parse_duration_days(m.as_str()));

    let start = name_match.start() + name_offset;
    let end = whole.end();
    Some(MedicationMention {
        raw_text: whole.as_str()[name_offset..].to_string(),
        span: TextSpan { start, end },
        drug_name,
        strength,
        route,
        frequency,
        duration_days,
        extraction_confidence: pattern_confidence(
            strength.is_some(),
            frequency.is_some(),
            duration_days.is_some(),
        ),
        extraction_source: ExtractionSource::PatternFallback,
    })
}

/// Pick the drug name out of a one- or two-word capture. Returns the byte
/// offset of the chosen name inside the capture.
///
/// Known names win: the whole capture, then either word. With neither word
/// known, a salt or release-form suffix points at the first word and a
/// leading instruction word at the second.
fn resolve_name(captured: &str, gazetteer: &Gazetteer) -> Option<(usize, String)> {
    if gazetteer.contains(captured) {
        return Some((0, captured.to_string()));
    }
    let Some((first, second)) = captured.split_once(' ') else {
        return (!is_non_drug(captured)).then(|| (0, captured.to_string()));
    };
    let first_pick = Some((0, first.to_string()));
    let second_pick = Some((first.len() + 1, second.to_string()));

    if gazetteer.contains(first) {
        first_pick
    } else if gazetteer.contains(second) {
        second_pick
    } else if is_name_suffix(second) {
        if is_non_drug(first) {
            None
        } else {
            first_pick
        }
    } else if !is_non_drug(second) {
        second_pick
    } else if !is_non_drug(first) {
        first_pick
    } else {
        None
    }
}

/// Gazetteer names anywhere in the text, once per distinct name.
fn bare_names(text: &str, gazetteer: &Gazetteer) -> Vec<MedicationMention> {
    let words: Vec<regex::Match> = RE_WORD.find_iter(text).collect();
    let mut seen = HashSet::new();
    let mut mentions = Vec::new();
    let mut i = 0;

    while i < words.len() {
        let mut matched = 0;
        for len in (1..=gazetteer.longest_term_words().min(words.len() - i)).rev() {
            let first = words[i];
            let last = words[i + len - 1];
            let phrase = &text[first.start()..last.end()];
            if !gazetteer.contains(phrase) {
                continue;
            }
            if seen.insert(phrase.to_lowercase()) {
                mentions.push(MedicationMention {
                    raw_text: phrase.to_string(),
                    span: TextSpan {
                        start: first.start(),
                        end: last.end(),
                    },
                    drug_name: phrase.to_string(),
                    strength: None,
                    route: None,
                    frequency: None,
                    duration_days: None,
                    extraction_confidence: BARE_NAME_CONFIDENCE,
                    extraction_source: ExtractionSource::PatternFallback,
                });
            }
            matched = len;
            break;
        }
        i += matched.max(1);
    }
    mentions
}

fn is_non_drug(word: &str) -> bool {
    NON_DRUG_WORDS.contains(&word.to_lowercase().as_str())
}

fn is_name_suffix(word: &str) -> bool {
    NAME_SUFFIXES.contains(&word.to_lowercase().as_str())
}

/// 0.6 base, +0.2 strength, +0.1 frequency, +0.1 duration, capped at 0.95.
pub fn pattern_confidence(has_strength: bool, has_frequency: bool, has_duration: bool) -> f64 {
    let mut confidence = BASE_CONFIDENCE;
    if has_strength {
        confidence += STRENGTH_BONUS;
    }
    if has_frequency {
        confidence += FREQUENCY_BONUS;
    }
    if has_duration {
        confidence += DURATION_BONUS;
    }
    confidence.min(MAX_CONFIDENCE)
}

#[async_trait]
impl MedicationExtractor for PatternExtractor {
    fn name(&self) -> &'static str {
        "pattern"
    }

    async fn extract(&self, text: &str, gazetteer: &Gazetteer) -> Extraction {
        Extraction {
            mentions: self.extract_mentions(text, gazetteer),
            source: ExtractionSource::PatternFallback,
            degraded: None,
        }
    }
}
