//! Rule evaluation over normalized medications: dosage validation,
//! interaction detection and safer-alternative recommendation.
//!
//! Everything here is a pure function of the medication list, the patient
//! and one reference snapshot.

pub mod alternatives;
pub mod dosage;
pub mod helpers;
pub mod interaction;
pub mod messages;

pub use alternatives::{suggest, suggest_all};
pub use dosage::{validate, validate_all};
pub use interaction::{detect, InteractionOutcome};
pub use messages::MessageTemplates;
