pub mod alert;
pub mod enums;
pub mod medication;
pub mod patient;

pub use alert::*;
pub use enums::{ConditionFlag, ExtractionSource, ParseEnumError, Route, Severity};
pub use medication::*;
pub use patient::*;
