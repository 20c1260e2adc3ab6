//! flowwatch-evaluate: score a labeled CSV with a stored artifact and print metrics.

use clap::Parser;
use flowwatch::{
    config::AppConfig,
    features::FeatureExtractor,
    logging::StructuredLogger,
    model::{OutlierScorer, TrainedModel},
    training::{load_csv, ConfusionMatrix, EvaluationMetrics},
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "flowwatch-evaluate")]
#[command(about = "Evaluate a model artifact against labeled flows", long_about = None)]
struct Args {
    /// Labeled CSV (label or anomaly column)
    #[arg(long)]
    test_data: PathBuf,

    /// Artifact path (default from config)
    #[arg(short, long)]
    model: Option<PathBuf>,
}

#[derive(Serialize)]
struct ClassBreakdown {
    support: usize,
    recall: f64,
}

#[derive(Serialize)]
struct EvaluationReport {
    model: String,
    artifact: PathBuf,
    rows: usize,
    metrics: EvaluationMetrics,
    normal: ClassBreakdown,
    anomaly: ClassBreakdown,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let config = AppConfig::from_env();
    StructuredLogger::init(config.log.json, &config.log.level);

    let artifact = args.model.unwrap_or(config.model_path);
    let model = TrainedModel::load(&artifact)?;
    let data = load_csv(&args.test_data, &FeatureExtractor::new())?;
    let truth = data
        .labels
        .as_ref()
        .ok_or("test data has no label or anomaly column")?;

    let predicted = model.estimator.predict_outliers(data.features.view());
    let metrics = EvaluationMetrics::compute(truth, &predicted);
    let (normal_recall, anomaly_recall) = metrics.per_class_recall();
    let ConfusionMatrix {
        true_negative,
        false_positive,
        false_negative,
        true_positive,
    } = metrics.confusion;
    info!(
        accuracy = metrics.accuracy,
        f1 = metrics.f1_score,
        normal_recall,
        anomaly_recall,
        "evaluation complete"
    );

    let report = EvaluationReport {
        model: model.model_name().to_string(),
        artifact,
        rows: data.len(),
        normal: ClassBreakdown {
            support: true_negative + false_positive,
            recall: normal_recall,
        },
        anomaly: ClassBreakdown {
            support: true_positive + false_negative,
            recall: anomaly_recall,
        },
        metrics,
    };
    StructuredLogger::emit_json(&report, &mut std::io::stdout().lock())?;
    Ok(())
}
