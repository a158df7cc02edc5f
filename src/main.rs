use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use rxguard_lib::config::PipelineSettings;
use rxguard_lib::models::PatientProfile;
use rxguard_lib::pipeline::{AnalysisRequest, SafetyPipeline};

#[derive(Parser, Debug)]
#[command(
    name = "rxguard",
    version,
    about = "Check a free-text prescription against a patient profile."
)]
struct Cli {
    /// Settings file (JSON). RXGUARD_* environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze one prescription and print the JSON report.
    Analyze {
        /// Prescription text.
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,

        /// Read the prescription text from a file.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Patient profile (JSON). Defaults to an adult with no known
        /// allergies or conditions.
        #[arg(long)]
        patient: Option<PathBuf>,

        /// Skip the alternative recommender.
        #[arg(long)]
        no_alternatives: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rxguard_lib::init_tracing();
    let cli = Cli::parse();

    let settings = PipelineSettings::load(cli.config.as_deref())
        .context("Failed to load settings")?;
    let pipeline = SafetyPipeline::build(settings).context("Failed to build pipeline")?;

    match cli.command {
        Command::Analyze {
            text,
            file,
            patient,
            no_alternatives,
        } => {
            let text = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Could not read {}", path.display()))?,
                (None, None) => bail!("either --text or --file is required"),
            };
            let patient = match patient {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("Could not read {}", path.display()))?;
                    serde_json::from_str::<PatientProfile>(&raw)
                        .with_context(|| format!("Invalid patient profile {}", path.display()))?
                }
                None => PatientProfile::new(40),
            };

            let mut request = AnalysisRequest::new(text, patient);
            if no_alternatives {
                request.include_alternatives = Some(false);
            }
            let report = pipeline.analyze(&request).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
