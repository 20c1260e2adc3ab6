//! Online scoring. Input: one 8-dim feature vector (or a batch); output: anomaly flag and score.

use super::{OutlierScorer, TrainedModel};
use crate::error::ModelError;
use crate::features::{to_matrix, FeatureVector};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Scoring result for a single vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub is_anomaly: bool,
    /// |decision| for anomalies, exactly 0.0 for inliers.
    pub score: f64,
}

impl Detection {
    pub fn from_decision(decision: f64) -> Self {
        let is_anomaly = decision < 0.0;
        Self {
            is_anomaly,
            score: if is_anomaly { decision.abs() } else { 0.0 },
        }
    }
}

/// Holds one trained model for the lifetime of the process. There is no reload path.
#[derive(Debug, Default)]
pub struct AnomalyModel {
    model: Option<TrainedModel>,
}

impl AnomalyModel {
    /// Empty wrapper; scoring fails with `NotReady` until [`AnomalyModel::load`] succeeds.
    pub fn new() -> Self {
        Self { model: None }
    }

    pub fn from_trained(model: TrainedModel) -> Self {
        Self { model: Some(model) }
    }

    pub fn from_path(path: &Path) -> Result<Self, ModelError> {
        let mut m = Self::new();
        m.load(path)?;
        Ok(m)
    }

    pub fn load(&mut self, path: &Path) -> Result<&TrainedModel, ModelError> {
        let model = TrainedModel::load(path)?;
        tracing::info!(
            path = %path.display(),
            model = model.model_name(),
            contamination = model.params.contamination,
            n_estimators = model.params.n_estimators,
            "model loaded"
        );
        Ok(self.model.insert(model))
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    pub fn trained(&self) -> Result<&TrainedModel, ModelError> {
        self.model.as_ref().ok_or(ModelError::NotReady)
    }

    pub fn name(&self) -> Result<&'static str, ModelError> {
        Ok(self.trained()?.model_name())
    }

    pub fn detect(&self, features: &FeatureVector) -> Result<Detection, ModelError> {
        let model = self.trained()?;
        Ok(Detection::from_decision(
            model.estimator.decision_function(features.as_slice()),
        ))
    }

    /// Element-wise equivalent of [`AnomalyModel::detect`], in input order.
    pub fn detect_batch(&self, batch: &[FeatureVector]) -> Result<(Vec<bool>, Vec<f64>), ModelError> {
        let model = self.trained()?;
        let x = to_matrix(batch);
        Ok(x.rows()
            .into_iter()
            .map(|r| {
                let d = Detection::from_decision(model.estimator.decision_function(&r.to_vec()));
                (d.is_anomaly, d.score)
            })
            .unzip())
    }
}
