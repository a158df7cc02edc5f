//! Prescription shorthand: strengths, routes, frequencies and durations.
//!
//! The regex fragments here are shared by the pattern extractor (embedded in
//! its mention regex) and the learned extractor (parsing entity words).

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Frequency, Route, Strength, StrengthUnit};

/// Unit alternation for strengths.
pub(crate) const UNIT_PATTERN: &str = r"mcg|µg|ug|mg|g|ml|iu|units?";

/// Route codes and words, longest first.
pub(crate) const ROUTE_PATTERN: &str =
    r"orally|oral|subcut|po|iv|im|sc|sq|sl|pr|top|inh|topical|inhaled|sublingual";

/// Frequency shorthand, longest alternatives first so `bid` wins over `bd`.
/// Latin abbreviations may be dotted (`b.i.d`); the trailing dot is left to
/// the caller.
pub(crate) const FREQUENCY_PATTERN: &str = concat!(
    r"once\s+(?:daily|a\s+day)|twice\s+(?:daily|a\s+day)",
    r"|(?:three|3)\s+times\s+(?:daily|a\s+day)|(?:four|4)\s+times\s+(?:daily|a\s+day)",
    r"|every\s+\d+\s*(?:hours?|hrs?|h)|q\s*\d+\s*h|as\s+needed|at\s+bedtime",
    r"|b\.?i\.?d|t\.?i\.?d|t\.?d\.?s|q\.?i\.?d|q\.?d\.?s|q\.?h\.?s|p\.?r\.?n",
    r"|stat|nocte|mane|daily|twice|thrice|once",
    r"|o\.?d|q\.?d|b\.?d|h\.?s"
);

/// Duration phrases: `for 7 days`, `x 2 weeks`, `for 1 month`.
pub(crate) const DURATION_PATTERN: &str =
    r"(?:for|x)\s*\d+\s*(?:days?|d|weeks?|wks?|w|months?|mo)";

static RE_STRENGTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)(\d+(?:\.\d+)?)\s*({UNIT_PATTERN})\b")).unwrap()
});
static RE_EVERY_HOURS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:every\s+(\d+)\s*(?:hours?|hrs?|h)|q\s*(\d+)\s*h)$").unwrap());
static RE_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*(days?|d|weeks?|wks?|w|months?|mo)\b").unwrap()
});
static RE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Parse the first `<number><unit>` in `text`.
pub fn parse_strength(text: &str) -> Option<Strength> {
    let caps = RE_STRENGTH.captures(text)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = StrengthUnit::parse(caps.get(2)?.as_str())?;
    Some(Strength::new(value, unit))
}

/// Map a frequency token (`OD`, `b.i.d.`, `q8h`, `twice daily`, ...) to a schedule.
pub fn parse_frequency(token: &str) -> Option<Frequency> {
    let lower = token.trim().to_lowercase().replace('.', "");
    let collapsed = RE_SPACES.replace_all(&lower, " ");
    let key = collapsed.as_ref();

    if let Some(caps) = RE_EVERY_HOURS.captures(key) {
        let hours: u32 = caps.get(1).or(caps.get(2))?.as_str().parse().ok()?;
        return Some(Frequency::EveryHours { hours });
    }

    let times = match key {
        "od" | "qd" | "daily" | "once" | "once daily" | "once a day" | "mane" | "nocte"
        | "qhs" | "hs" | "at bedtime" => 1,
        "bd" | "bid" | "twice" | "twice daily" | "twice a day" => 2,
        "tid" | "tds" | "thrice" | "three times daily" | "three times a day"
        | "3 times daily" | "3 times a day" => 3,
        "qid" | "qds" | "four times daily" | "four times a day" | "4 times daily"
        | "4 times a day" => 4,
        "prn" | "as needed" => return Some(Frequency::AsNeeded),
        "stat" => return Some(Frequency::Once),
        _ => return None,
    };
    Some(Frequency::TimesPerDay { times })
}

/// Duration in days from `for 7 days`, `x 2 weeks`, `10 days`, ...
/// Months count as 30 days.
pub fn parse_duration_days(text: &str) -> Option<u32> {
    let caps = RE_DURATION.captures(text)?;
    let n: u32 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str().to_lowercase();
    let factor = match unit.as_str() {
        "d" | "day" | "days" => 1,
        "w" | "wk" | "wks" | "week" | "weeks" => 7,
        _ => 30,
    };
    n.checked_mul(factor)
}

pub fn parse_route(token: &str) -> Option<Route> {
    Route::from_code(token.trim())
}
