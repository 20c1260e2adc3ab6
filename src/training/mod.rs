//! Offline training: dataset loading, stratified split, grid search and artifact output.

mod dataset;
mod grid;
mod metrics;
mod trainer;

pub use dataset::{
    load_csv, stratified_split, DatasetShape, DatasetSource, LabeledData, Split,
    REQUIRED_FLOW_COLUMNS,
};
pub use grid::{Candidate, GridPoint, GridSearch, ParamGrid, SearchOutcome, StopRule};
pub use metrics::{ConfusionMatrix, EvaluationMetrics};
pub use trainer::{ModelTrainer, TrainingMode, TrainingReport};
