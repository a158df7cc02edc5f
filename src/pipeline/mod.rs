//! Prescription analysis orchestrator.
//!
//! preprocess → extract → normalize → validate + detect → recommend.
//! Only a malformed patient profile fails a request; every other problem is
//! recorded as a [`PipelineNotice`] on the report.

pub mod processor;
pub mod types;

pub use processor::SafetyPipeline;
pub use types::{AnalysisReport, AnalysisRequest, PipelineNotice, Stage};

use thiserror::Error;

use crate::config::ConfigError;
use crate::extraction::ExtractionError;
use crate::models::PatientValidationError;
use crate::reference::ReferenceError;
use crate::vocabulary::LookupError;

/// Request-level failure.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    InvalidPatient(#[from] PatientValidationError),

    #[error("Reference data unavailable: {0}")]
    Reference(#[from] ReferenceError),
}

/// Failure assembling a pipeline at startup.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Reference data error: {0}")]
    Reference(#[from] ReferenceError),

    #[error("Extractor setup failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Vocabulary setup failed: {0}")]
    Vocabulary(#[from] LookupError),
}
