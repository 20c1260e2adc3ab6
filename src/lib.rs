//! flowwatch: network flow anomaly detection.
//!
//! - [`features`]: flow → fixed 8-dimensional feature vector
//! - [`model`]: isolation forest, model artifact and online scoring
//! - [`training`]: dataset loading, grid search and artifact output
//! - [`pipeline`]: per-event stream consumer
//! - [`storage`]: flow and alert document store
//! - [`source`]: ordered inbound event sources
//! - [`logging`]: tracing setup

pub mod config;
pub mod error;
pub mod features;
pub mod flow;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod source;
pub mod storage;
pub mod training;

pub use config::AppConfig;
pub use features::{FeatureExtractor, FeatureVector};
pub use flow::{Alert, AlertStatus, FlowRecord};
pub use logging::StructuredLogger;
pub use model::{AnomalyModel, Detection, TrainedModel};
pub use pipeline::{EventOutcome, StreamProcessor};
pub use storage::{FlowStore, SqliteStore};
pub use training::{ModelTrainer, TrainingReport};
