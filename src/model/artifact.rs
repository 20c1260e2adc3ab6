//! Model artifact on disk: one JSON document holding the fitted estimator, its
//! hyperparameters, held-out metrics and an integrity checksum.

use super::{Estimator, HyperParams};
use crate::error::ModelError;
use crate::features::{FEATURE_DIM, FEATURE_NAMES};
use crate::training::EvaluationMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

pub const ARTIFACT_VERSION: u32 = 1;

fn checksum(estimator: &Estimator) -> Result<String, serde_json::Error> {
    let encoded = serde_json::to_vec(estimator)?;
    Ok(format!("{:x}", Sha256::digest(&encoded)))
}

/// Immutable once built. Retraining writes a new artifact over the old path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub format_version: u32,
    /// Feature layout the estimator was fitted on.
    pub feature_names: Vec<String>,
    pub trained_at: DateTime<Utc>,
    pub params: HyperParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<EvaluationMetrics>,
    pub estimator: Estimator,
    pub checksum: String,
}

impl TrainedModel {
    pub fn new(
        estimator: Estimator,
        params: HyperParams,
        metrics: Option<EvaluationMetrics>,
    ) -> Result<Self, ModelError> {
        let checksum = checksum(&estimator)?;
        Ok(Self {
            format_version: ARTIFACT_VERSION,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            trained_at: Utc::now(),
            params,
            metrics,
            estimator,
            checksum,
        })
    }

    /// Write to `path`, replacing any previous artifact.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp, path)?;
        tracing::info!(path = %path.display(), checksum = %self.checksum, "model artifact written");
        Ok(())
    }

    /// Read and verify an artifact.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::NotFound(path.to_path_buf()));
        }
        let load_err = |reason: String| ModelError::Load {
            path: path.to_path_buf(),
            reason,
        };
        let data = std::fs::read(path).map_err(|e| load_err(e.to_string()))?;
        let model: TrainedModel =
            serde_json::from_slice(&data).map_err(|e| load_err(e.to_string()))?;

        if model.format_version != ARTIFACT_VERSION {
            return Err(load_err(format!(
                "unsupported format version {}",
                model.format_version
            )));
        }
        if model.feature_names != FEATURE_NAMES || model.estimator.n_features() != FEATURE_DIM {
            return Err(load_err(format!(
                "feature layout {:?} does not match extractor layout {:?}",
                model.feature_names, FEATURE_NAMES
            )));
        }
        let actual = checksum(&model.estimator).map_err(|e| load_err(e.to_string()))?;
        if actual != model.checksum {
            return Err(load_err("checksum mismatch".to_string()));
        }
        Ok(model)
    }

    pub fn model_name(&self) -> &'static str {
        self.estimator.name()
    }
}
