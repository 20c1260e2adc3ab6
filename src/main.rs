//! flowwatch consumer: reads flow events, persists them, scores each one and
//! records alerts. Runs until the source is exhausted or Ctrl+C.

use flowwatch::{
    config::AppConfig,
    logging::StructuredLogger,
    model::AnomalyModel,
    pipeline::StreamProcessor,
    source::JsonLinesSource,
    storage::SqliteStore,
};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = AppConfig::from_env();
    StructuredLogger::init(config.log.json, &config.log.level);

    info!(
        model_path = %config.model_path.display(),
        db_path = %config.store.db_path.display(),
        "flowwatch consumer starting"
    );

    let model = match AnomalyModel::from_path(&config.model_path) {
        Ok(m) => Arc::new(m),
        Err(e) => {
            error!(error = %e, "no usable model artifact, run flowwatch-train first");
            return Err(e.into());
        }
    };

    if let Some(parent) = config.store.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = Arc::new(SqliteStore::open(&config.store.db_path)?);

    let mut source = match &config.source.input {
        Some(path) => JsonLinesSource::open(path, config.source.checkpoint.clone()).await?,
        None => {
            info!("reading flow events from stdin");
            JsonLinesSource::stdin()
        }
    };

    let shutdown = Arc::new(Notify::new());
    let on_signal = shutdown.clone();
    let _ = ctrlc::set_handler(move || {
        on_signal.notify_one();
    });

    let processor = StreamProcessor::new(model, store);
    let stats = processor.run(&mut source, &shutdown).await?;
    info!(
        received = stats.received,
        acknowledged = stats.acknowledged,
        alerts = stats.alerts,
        "flowwatch consumer stopping"
    );
    Ok(())
}
