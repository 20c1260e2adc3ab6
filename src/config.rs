//! Service configuration: JSON file with defaults, then environment overrides.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Path of the model artifact written by training and loaded by the consumer
    pub model_path: PathBuf,
    /// Document store
    pub store: StoreConfig,
    /// Inbound flow events
    pub source: SourceConfig,
    /// Hyperparameter search
    pub training: TrainingConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Newline-delimited JSON flow events; stdin when unset
    pub input: Option<PathBuf>,
    /// Committed offset file. Only meaningful for file input.
    pub checkpoint: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Selection bar for held-out accuracy; also the early-stop threshold
    pub target_accuracy: f64,
    /// Share of each label class held out for evaluation
    pub test_fraction: f64,
    /// Hyperparameters used when no grid point clears the target
    pub fallback_contamination: f64,
    pub fallback_n_estimators: usize,
    pub random_seed: u64,
    /// Synthetic dataset size when no dataset path is given
    pub synthetic_normal: usize,
    pub synthetic_anomalies: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/isolation_forest.json"),
            store: StoreConfig::default(),
            source: SourceConfig::default(),
            training: TrainingConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("flowwatch.db"),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            target_accuracy: 0.85,
            test_fraction: 0.2,
            fallback_contamination: 0.02,
            fallback_n_estimators: 200,
            random_seed: 42,
            synthetic_normal: 15_000,
            synthetic_anomalies: 500,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl AppConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &std::path::Path) -> Self {
        if path.exists() {
            if let Ok(data) = std::fs::read_to_string(path) {
                if let Ok(c) = serde_json::from_str::<AppConfig>(&data) {
                    return c;
                }
            }
        }
        Self::default()
    }

    /// Config file named by `FLOWWATCH_CONFIG_PATH` (default `config.json`), then env overrides.
    pub fn from_env() -> Self {
        let path = std::env::var("FLOWWATCH_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.json"));
        let mut config = Self::load(&path);
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        if let Ok(p) = std::env::var("FLOWWATCH_MODEL_PATH") {
            self.model_path = PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("FLOWWATCH_DB_PATH") {
            self.store.db_path = PathBuf::from(p);
        }
        if let Some(c) = env_parse("CONTAMINATION") {
            self.training.fallback_contamination = c;
        }
        if let Some(n) = env_parse("N_ESTIMATORS") {
            self.training.fallback_n_estimators = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"training":{"target_accuracy":0.9},"log":{"json":false}}"#).unwrap();
        let c = AppConfig::load(&path);
        assert_eq!(c.training.target_accuracy, 0.9);
        assert_eq!(c.training.random_seed, 42);
        assert!(!c.log.json);
        assert_eq!(c.log.level, "info");
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        let c = AppConfig::load(&path);
        assert_eq!(c.model_path, PathBuf::from("models/isolation_forest.json"));
    }
}
