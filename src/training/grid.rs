//! Hyperparameter grid and the greedy, order-dependent search over it.
//!
//! Iteration order is contamination (outermost), n_estimators, max_samples,
//! bootstrap (innermost). The first candidate whose selection score reaches the
//! target ends the search, so reordering an axis changes which model wins.

use super::metrics::EvaluationMetrics;
use crate::error::{FitError, TrainError};
use crate::model::{HyperParams, MaxSamples, OutlierScorer};
use ndarray::ArrayView2;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct ParamGrid {
    pub contamination: Vec<f64>,
    pub n_estimators: Vec<usize>,
    pub max_samples: Vec<MaxSamples>,
    pub bootstrap: Vec<bool>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            contamination: vec![0.01, 0.02, 0.03, 0.05, 0.1],
            n_estimators: vec![100, 200, 300, 500],
            max_samples: vec![
                MaxSamples::Auto,
                MaxSamples::Count(256),
                MaxSamples::Count(512),
                MaxSamples::Count(1024),
            ],
            bootstrap: vec![true, false],
        }
    }
}

impl ParamGrid {
    pub fn len(&self) -> usize {
        self.contamination.len() * self.n_estimators.len() * self.max_samples.len() * self.bootstrap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> GridIter<'_> {
        GridIter { grid: self, next: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    /// Zero-based position in iteration order
    pub index: usize,
    pub params: HyperParams,
}

/// Cartesian product of the four axes, innermost axis varying fastest.
pub struct GridIter<'a> {
    grid: &'a ParamGrid,
    next: usize,
}

impl Iterator for GridIter<'_> {
    type Item = GridPoint;

    fn next(&mut self) -> Option<GridPoint> {
        let g = self.grid;
        if self.next >= g.len() {
            return None;
        }
        let index = self.next;
        self.next += 1;

        let mut i = index;
        let bootstrap = g.bootstrap[i % g.bootstrap.len()];
        i /= g.bootstrap.len();
        let max_samples = g.max_samples[i % g.max_samples.len()];
        i /= g.max_samples.len();
        let n_estimators = g.n_estimators[i % g.n_estimators.len()];
        i /= g.n_estimators.len();
        let contamination = g.contamination[i];

        Some(GridPoint {
            index,
            params: HyperParams {
                contamination,
                n_estimators,
                max_samples,
                bootstrap,
            },
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.grid.len().saturating_sub(self.next);
        (left, Some(left))
    }
}

/// Termination predicate, checked after every candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopRule {
    pub target: f64,
}

impl StopRule {
    pub fn reached(&self, best_score: f64) -> bool {
        best_score >= self.target
    }
}

/// A fitted grid point with its held-out evaluation.
#[derive(Debug, Clone)]
pub struct Candidate<M> {
    pub point: GridPoint,
    pub model: M,
    pub metrics: EvaluationMetrics,
    pub selection_score: f64,
}

#[derive(Debug)]
pub struct SearchOutcome<M> {
    /// Best candidate by strict improvement; `None` if every score was 0.
    pub best: Option<Candidate<M>>,
    pub evaluated: usize,
    /// The stop rule fired.
    pub target_reached: bool,
    /// Some evaluated candidate's accuracy reached the target, whether or not it was kept.
    pub any_cleared: bool,
}

pub struct GridSearch<'a> {
    grid: &'a ParamGrid,
    stop: StopRule,
}

impl<'a> GridSearch<'a> {
    pub fn new(grid: &'a ParamGrid, target_accuracy: f64) -> Self {
        Self {
            grid,
            stop: StopRule { target: target_accuracy },
        }
    }

    /// Fit every grid point on `train` (never on labels), score on the held-out
    /// rows, and keep the best. A fit failure aborts the whole search.
    pub fn run<M, F>(
        &self,
        train: ArrayView2<f64>,
        test: ArrayView2<f64>,
        truth: &[bool],
        mut fit: F,
    ) -> Result<SearchOutcome<M>, TrainError>
    where
        M: OutlierScorer,
        F: FnMut(&HyperParams, ArrayView2<f64>) -> Result<M, FitError>,
    {
        let total = self.grid.len();
        let mut best: Option<Candidate<M>> = None;
        let mut best_score = 0.0;
        let mut evaluated = 0;
        let mut target_reached = false;
        let mut any_cleared = false;

        for point in self.grid.iter() {
            let p = &point.params;
            let model = fit(p, train)?;
            evaluated += 1;

            let predicted = model.predict_outliers(test);
            let metrics = EvaluationMetrics::compute(truth, &predicted);
            let score = metrics.selection_score(self.stop.target);
            any_cleared |= metrics.accuracy >= self.stop.target;
            debug!(
                candidate = point.index + 1,
                total,
                contamination = p.contamination,
                n_estimators = p.n_estimators,
                max_samples = %p.max_samples,
                bootstrap = p.bootstrap,
                accuracy = metrics.accuracy,
                f1 = metrics.f1_score,
                score,
                "grid point evaluated"
            );

            if score > best_score {
                best_score = score;
                info!(
                    candidate = point.index + 1,
                    accuracy = metrics.accuracy,
                    f1 = metrics.f1_score,
                    score,
                    "new best candidate"
                );
                best = Some(Candidate {
                    point,
                    model,
                    metrics,
                    selection_score: score,
                });
            }

            if self.stop.reached(best_score) {
                target_reached = true;
                info!(evaluated, total, best_score, "target reached, stopping search");
                break;
            }
        }

        Ok(SearchOutcome {
            best,
            evaluated,
            target_reached,
            any_cleared,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    /// Flags rows whose first column exceeds `cut`.
    struct Cutoff {
        cut: f64,
    }

    impl OutlierScorer for Cutoff {
        fn decision_function(&self, row: &[f64]) -> f64 {
            self.cut - row[0]
        }
    }

    fn test_rows() -> (Array2<f64>, Vec<bool>) {
        (
            array![[1.0], [2.0], [3.0], [100.0], [200.0]],
            vec![false, false, false, true, true],
        )
    }

    #[test]
    fn default_grid_order_and_size() {
        let grid = ParamGrid::default();
        assert_eq!(grid.len(), 160);
        let points: Vec<GridPoint> = grid.iter().collect();
        assert_eq!(points.len(), 160);
        assert_eq!(
            points[0].params,
            HyperParams {
                contamination: 0.01,
                n_estimators: 100,
                max_samples: MaxSamples::Auto,
                bootstrap: true
            }
        );
        assert!(!points[1].params.bootstrap);
        assert_eq!(points[2].params.max_samples, MaxSamples::Count(256));
        assert_eq!(points[8].params.n_estimators, 200);
        assert_eq!(points[32].params.contamination, 0.02);
        assert_eq!(points[159].params.contamination, 0.1);
        assert_eq!(points[159].index, 159);
    }

    #[test]
    fn stops_at_first_point_that_clears_target() {
        let grid = ParamGrid::default();
        let (test, truth) = test_rows();
        let train = Array2::<f64>::zeros((4, 1));
        let mut calls = 0;
        let outcome = GridSearch::new(&grid, 0.85)
            .run(train.view(), test.view(), &truth, |_, _| {
                calls += 1;
                Ok(Cutoff { cut: 50.0 })
            })
            .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(outcome.evaluated, 1);
        assert!(outcome.target_reached);
        let best = outcome.best.unwrap();
        assert_eq!(best.point.index, 0);
        assert_eq!(best.metrics.accuracy, 1.0);
    }

    #[test]
    fn later_point_wins_when_earlier_ones_miss() {
        let grid = ParamGrid::default();
        let (test, truth) = test_rows();
        let train = Array2::<f64>::zeros((4, 1));
        let mut calls = 0;
        let outcome = GridSearch::new(&grid, 0.85)
            .run(train.view(), test.view(), &truth, |p, _| {
                calls += 1;
                // Only the third contamination value separates the classes.
                let cut = if p.contamination == 0.03 { 50.0 } else { 1000.0 };
                Ok(Cutoff { cut })
            })
            .unwrap();
        assert_eq!(calls, 65);
        assert_eq!(outcome.best.unwrap().point.index, 64);
    }

    #[test]
    fn unreachable_target_exhausts_grid_and_keeps_first_best() {
        let grid = ParamGrid::default();
        let (test, truth) = test_rows();
        let train = Array2::<f64>::zeros((4, 1));
        let mut calls = 0;
        let outcome = GridSearch::new(&grid, 1.01)
            .run(train.view(), test.view(), &truth, |_, _| {
                calls += 1;
                Ok(Cutoff { cut: 50.0 })
            })
            .unwrap();
        assert_eq!(calls, 160);
        assert!(!outcome.target_reached);
        assert!(!outcome.any_cleared);
        assert_eq!(outcome.best.unwrap().point.index, 0);
    }

    #[test]
    fn cleared_candidate_is_recorded_even_when_outscored() {
        // Nine normal rows and one anomaly.
        let test = Array2::from_shape_vec((10, 1), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 100.0])
            .unwrap();
        let mut truth = vec![false; 9];
        truth.push(true);
        let grid = ParamGrid::default();
        let train = Array2::<f64>::zeros((4, 1));
        let mut calls = 0;
        let outcome = GridSearch::new(&grid, 0.85)
            .run(train.view(), test.view(), &truth, |_, _| {
                calls += 1;
                // First: flags nothing, accuracy 0.9 and F1 0, score 0.63.
                // Rest: flags 8, 9 and 100, accuracy 0.8, score 0.8.
                let cut = if calls == 1 { 1000.0 } else { 7.5 };
                Ok(Cutoff { cut })
            })
            .unwrap();

        assert_eq!(outcome.evaluated, 160);
        assert!(!outcome.target_reached);
        assert!(outcome.any_cleared);
        let best = outcome.best.unwrap();
        assert_eq!(best.point.index, 1);
        assert!(best.metrics.accuracy < 0.85);
    }

    #[test]
    fn fit_failure_aborts_search() {
        let grid = ParamGrid::default();
        let (test, truth) = test_rows();
        let train = Array2::<f64>::zeros((4, 1));
        let mut calls = 0;
        let result = GridSearch::new(&grid, 0.85).run::<Cutoff, _>(
            train.view(),
            test.view(),
            &truth,
            |_, _| {
                calls += 1;
                if calls == 3 {
                    Err(FitError::EmptyTrainingSet)
                } else {
                    Ok(Cutoff { cut: 1000.0 })
                }
            },
        );
        assert!(matches!(result, Err(TrainError::Fit(FitError::EmptyTrainingSet))));
        assert_eq!(calls, 3);
    }
}
