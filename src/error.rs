//! Error types for extraction, scoring, training, storage and the event source.

use std::path::PathBuf;
use thiserror::Error;

/// A single flow could not be encoded. Non-fatal for the stream.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureExtractionError {
    #[error("field `{field}` is not numeric: {value:?}")]
    NonNumeric { field: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum FitError {
    #[error("training set is empty")]
    EmptyTrainingSet,
    #[error("contamination must be in (0, 0.5], got {0}")]
    InvalidContamination(f64),
    #[error("expected {expected} feature columns, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model artifact not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("model artifact {} could not be loaded: {reason}", path.display())]
    Load { path: PathBuf, reason: String },
    #[error("model not loaded")]
    NotReady,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Fit(#[from] FitError),
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("dataset is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("invalid dataset: {0}")]
    DataFormat(String),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl TrainError {
    /// Missing columns and unusable rows are both data format failures.
    pub fn is_data_format(&self) -> bool {
        matches!(self, TrainError::MissingColumns(_) | TrainError::DataFormat(_))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid alert status {0:?}: must be new, acknowledged or resolved")]
    InvalidStatus(String),
    #[error("store connection lock poisoned")]
    Poisoned,
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stream failures. `Store` is per-event: the worker logs it and moves on
/// without acknowledging. `Model` and `Source` stop the worker.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
