use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {field} value: {value:?}")]
pub struct ParseEnumError {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The string form doubles as the serde representation.
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ParseEnumError {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

pub(crate) use str_enum;

str_enum!(
    /// Ordinal alert level. Declaration order is the severity order.
    Severity {
        Info => "INFO",
        Warning => "WARNING",
        High => "HIGH",
        Critical => "CRITICAL",
    }
);

impl Severity {
    /// HIGH and CRITICAL alerts are violations that warrant an alternative.
    pub fn is_violation(&self) -> bool {
        *self >= Severity::High
    }
}

str_enum!(
    /// Patient condition tags that gate organ-impairment and pregnancy rules.
    ConditionFlag {
        RenalImpairment => "renal-impairment",
        HepaticImpairment => "hepatic-impairment",
        Pregnant => "pregnant",
    }
);

str_enum!(ExtractionSource {
    Learned => "learned",
    PatternFallback => "pattern-fallback",
});

str_enum!(Route {
    Oral => "oral",
    Intravenous => "intravenous",
    Intramuscular => "intramuscular",
    Subcutaneous => "subcutaneous",
    Sublingual => "sublingual",
    Rectal => "rectal",
    Topical => "topical",
    Inhaled => "inhaled",
});

impl Route {
    /// Resolve a prescription route code (PO, IV, SC, ...) case-insensitively.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_lowercase().trim_end_matches('.') {
            "po" | "oral" | "orally" => Some(Self::Oral),
            "iv" | "intravenous" => Some(Self::Intravenous),
            "im" | "intramuscular" => Some(Self::Intramuscular),
            "sc" | "sq" | "subcut" | "subcutaneous" => Some(Self::Subcutaneous),
            "sl" | "sublingual" => Some(Self::Sublingual),
            "pr" | "rectal" => Some(Self::Rectal),
            "top" | "topical" => Some(Self::Topical),
            "inh" | "inhaled" | "inhalation" => Some(Self::Inhaled),
            _ => None,
        }
    }
}
