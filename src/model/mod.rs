//! Outlier estimators, the persisted model artifact and the online scoring wrapper.

mod artifact;
mod detector;
mod forest;

pub use artifact::{TrainedModel, ARTIFACT_VERSION};
pub use detector::{AnomalyModel, Detection};
pub use forest::{HyperParams, IsolationForest, MaxSamples};

use crate::error::FitError;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Scoring interface every supported estimator implements.
pub trait OutlierScorer {
    /// Continuous decision value; negative means outlier.
    fn decision_function(&self, row: &[f64]) -> f64;

    fn is_outlier(&self, row: &[f64]) -> bool {
        self.decision_function(row) < 0.0
    }

    /// Outlier flag per row, in row order.
    fn predict_outliers(&self, x: ArrayView2<f64>) -> Vec<bool> {
        x.rows()
            .into_iter()
            .map(|r| match r.as_slice() {
                Some(s) => self.is_outlier(s),
                None => self.is_outlier(&r.to_vec()),
            })
            .collect()
    }
}

impl OutlierScorer for IsolationForest {
    fn decision_function(&self, row: &[f64]) -> f64 {
        IsolationForest::decision_function(self, row)
    }
}

/// Supported estimator kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    IsolationForest(IsolationForest),
}

impl Estimator {
    /// Fit a fresh isolation forest on unlabeled rows.
    pub fn fit_isolation_forest(
        x: ArrayView2<f64>,
        params: &HyperParams,
        seed: u64,
    ) -> Result<Self, FitError> {
        Ok(Estimator::IsolationForest(IsolationForest::fit(x, params, seed)?))
    }

    /// Name written into alerts.
    pub fn name(&self) -> &'static str {
        match self {
            Estimator::IsolationForest(_) => "isolation_forest",
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Estimator::IsolationForest(f) => f.n_features(),
        }
    }
}

impl OutlierScorer for Estimator {
    fn decision_function(&self, row: &[f64]) -> f64 {
        match self {
            Estimator::IsolationForest(f) => f.decision_function(row),
        }
    }
}
