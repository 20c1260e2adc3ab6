//! flowwatch-train: hyperparameter search over a CSV dataset (or synthetic
//! flows) and write the selected model artifact.

use clap::Parser;
use flowwatch::{
    config::AppConfig,
    logging::StructuredLogger,
    training::{DatasetSource, ModelTrainer},
};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "flowwatch-train")]
#[command(about = "Select and persist a flow anomaly model", long_about = None)]
struct Args {
    /// Training CSV; synthetic labeled flows when omitted
    #[arg(long)]
    data_path: Option<PathBuf>,

    /// Held-out accuracy target, also the early-stop threshold
    #[arg(long)]
    target_accuracy: Option<f64>,

    /// Artifact path (default from config)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let mut config = AppConfig::from_env();
    StructuredLogger::init(config.log.json, &config.log.level);

    if let Some(target) = args.target_accuracy {
        config.training.target_accuracy = target;
    }
    let artifact = args.output.unwrap_or(config.model_path);
    let trainer = ModelTrainer::new(config.training, &artifact);
    let source = match args.data_path {
        Some(path) => DatasetSource::Csv(path),
        None => trainer.default_source(),
    };
    info!(?source, artifact = %artifact.display(), "training started");

    let report = match trainer.train(&source) {
        Ok(r) => r,
        Err(e) => {
            if e.is_data_format() {
                error!(error = %e, "dataset rejected, no model written");
            } else {
                error!(error = %e, "training failed");
            }
            return Err(e.into());
        }
    };
    StructuredLogger::emit_json(&report, &mut std::io::stdout().lock())?;
    info!(artifact = %artifact.display(), "training complete");
    Ok(())
}
