pub mod config;
pub mod extraction;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod reference;
pub mod safety;
pub mod vocabulary;

use tracing_subscriber::EnvFilter;

pub use pipeline::{AnalysisError, AnalysisReport, AnalysisRequest, SafetyPipeline};

/// Install the global tracing subscriber. Honors `RUST_LOG`, falling back to
/// [`config::default_log_filter`]. Logs go to stderr so stdout stays JSON.
/// Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
