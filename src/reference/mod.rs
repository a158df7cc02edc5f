//! Versioned reference data: canonical vocabulary, therapeutic classes,
//! dosage rules and interaction rules.
//!
//! Tables are validated as a whole on construction and published through
//! [`ReferenceStore`]. A pipeline run reads one immutable snapshot, so a
//! concurrent update never shows partial state.

mod builtin;
mod store;
mod tables;
pub mod types;

use thiserror::Error;

pub use store::ReferenceStore;
pub use tables::{Gazetteer, ReferenceTables};
pub use types::{
    AgeBand, DosageRule, InteractionMember, InteractionRule, RuleCheck, RuleTarget,
    TherapeuticClass, VocabularyEntry, WeightBand,
};

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("Reference data load failed ({0}): {1}")]
    Load(String, String),

    #[error("Reference data parse failed ({0}): {1}")]
    Parse(String, String),

    #[error("Malformed {table} row `{id}`: {reason}")]
    MalformedRow {
        table: &'static str,
        id: String,
        reason: String,
    },

    #[error("Rules `{first}` and `{second}` disagree on severity for `{signature}`")]
    RuleConflict {
        first: String,
        second: String,
        signature: String,
    },

    #[error("Internal lock failed")]
    LockFailed,
}
