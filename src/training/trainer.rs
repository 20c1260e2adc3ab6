//! Model selection: load data, split, search the grid, fall back if needed, persist.

use super::dataset::{self, stratified_split, DatasetSource, LabeledData};
use super::grid::{GridSearch, ParamGrid};
use super::metrics::EvaluationMetrics;
use crate::config::TrainingConfig;
use crate::error::{FitError, TrainError};
use crate::features::FeatureExtractor;
use crate::model::{Estimator, HyperParams, MaxSamples, OutlierScorer, TrainedModel};
use ndarray::ArrayView2;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingMode {
    /// Labels present: held-out evaluation drives selection.
    Supervised,
    /// No labels: the first grid point is fitted and kept, nothing is compared.
    Unsupervised,
}

/// Summary of one training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub mode: TrainingMode,
    pub model: String,
    pub params: HyperParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<EvaluationMetrics>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub candidates_evaluated: usize,
    /// The search stopped because a candidate reached the target.
    pub target_reached: bool,
    /// No candidate's accuracy cleared the target; default hyperparameters were used.
    pub used_fallback: bool,
    /// Held-out accuracy of the persisted model against the target; `None` without labels.
    pub target_met: Option<bool>,
    pub artifact_path: PathBuf,
}

pub struct ModelTrainer {
    config: TrainingConfig,
    artifact_path: PathBuf,
    extractor: FeatureExtractor,
    grid: ParamGrid,
}

impl ModelTrainer {
    pub fn new(config: TrainingConfig, artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            config,
            artifact_path: artifact_path.into(),
            extractor: FeatureExtractor::new(),
            grid: ParamGrid::default(),
        }
    }

    pub fn with_grid(mut self, grid: ParamGrid) -> Self {
        self.grid = grid;
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Synthetic source sized from config.
    pub fn default_source(&self) -> DatasetSource {
        DatasetSource::Synthetic {
            normal: self.config.synthetic_normal,
            anomalies: self.config.synthetic_anomalies,
        }
    }

    pub fn fallback_params(&self) -> HyperParams {
        HyperParams {
            contamination: self.config.fallback_contamination,
            n_estimators: self.config.fallback_n_estimators,
            max_samples: MaxSamples::Auto,
            bootstrap: false,
        }
    }

    /// Load `source` and run model selection. Nothing is written when the dataset is unusable.
    pub fn train(&self, source: &DatasetSource) -> Result<TrainingReport, TrainError> {
        let data = dataset::load(source, &self.extractor, self.config.random_seed)?;
        self.train_on(data)
    }

    pub fn train_on(&self, data: LabeledData) -> Result<TrainingReport, TrainError> {
        if data.is_empty() {
            return Err(TrainError::DataFormat("dataset has no usable rows".to_string()));
        }
        let split = stratified_split(&data, self.config.test_fraction, self.config.random_seed);
        let Some((test, truth)) = split.test else {
            return self.train_unsupervised(split.train.view());
        };
        if test.nrows() == 0 {
            return Err(TrainError::DataFormat(
                "labeled dataset too small to hold out a test split".to_string(),
            ));
        }

        let target = self.config.target_accuracy;
        info!(
            train = split.train.nrows(),
            test = test.nrows(),
            candidates = self.grid.len(),
            target,
            "starting hyperparameter search"
        );
        let outcome = GridSearch::new(&self.grid, target).run(
            split.train.view(),
            test.view(),
            &truth,
            |p, x| self.fit(p, x),
        )?;

        let (estimator, params, metrics, used_fallback) = match outcome.best {
            Some(best) if outcome.any_cleared => (best.model, best.point.params, best.metrics, false),
            _ => {
                let params = self.fallback_params();
                warn!(
                    evaluated = outcome.evaluated,
                    contamination = params.contamination,
                    n_estimators = params.n_estimators,
                    "no candidate cleared the target accuracy, fitting default parameters"
                );
                let estimator = self.fit(&params, split.train.view())?;
                let metrics =
                    EvaluationMetrics::compute(&truth, &estimator.predict_outliers(test.view()));
                (estimator, params, metrics, true)
            }
        };

        let cm = &metrics.confusion;
        info!(
            accuracy = metrics.accuracy,
            precision = metrics.precision,
            recall = metrics.recall,
            f1 = metrics.f1_score,
            tn = cm.true_negative,
            fp = cm.false_positive,
            fn_ = cm.false_negative,
            tp = cm.true_positive,
            "held-out evaluation"
        );
        let target_met = metrics.accuracy >= target;
        if !target_met {
            warn!(
                accuracy = metrics.accuracy,
                target, "accuracy is below the target threshold"
            );
        }

        let report = TrainingReport {
            mode: TrainingMode::Supervised,
            model: estimator.name().to_string(),
            params,
            metrics: Some(metrics.clone()),
            train_rows: split.train.nrows(),
            test_rows: test.nrows(),
            candidates_evaluated: outcome.evaluated,
            target_reached: outcome.target_reached,
            used_fallback,
            target_met: Some(target_met),
            artifact_path: self.artifact_path.clone(),
        };
        TrainedModel::new(estimator, params, Some(metrics))?.save(&self.artifact_path)?;
        Ok(report)
    }

    fn fit(&self, params: &HyperParams, x: ArrayView2<f64>) -> Result<Estimator, FitError> {
        Estimator::fit_isolation_forest(x, params, self.config.random_seed)
    }

    fn train_unsupervised(&self, train: ArrayView2<f64>) -> Result<TrainingReport, TrainError> {
        warn!("dataset has no labels: fitting the first grid point without hyperparameter selection");
        let params = self
            .grid
            .iter()
            .next()
            .map(|p| p.params)
            .unwrap_or_else(|| self.fallback_params());
        let estimator = self.fit(&params, train)?;

        let report = TrainingReport {
            mode: TrainingMode::Unsupervised,
            model: estimator.name().to_string(),
            params,
            metrics: None,
            train_rows: train.nrows(),
            test_rows: 0,
            candidates_evaluated: 1,
            target_reached: false,
            used_fallback: false,
            target_met: None,
            artifact_path: self.artifact_path.clone(),
        };
        TrainedModel::new(estimator, params, None)?.save(&self.artifact_path)?;
        Ok(report)
    }
}
