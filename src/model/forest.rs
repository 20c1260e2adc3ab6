//! Isolation forest: random axis-parallel partitioning, anomaly strength from the
//! average depth at which a sample is isolated.

use crate::error::FitError;
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

const EULER_GAMMA: f64 = 0.577_215_664_9;
const AUTO_MAX_SAMPLES: usize = 256;

/// Per-tree subsample size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxSamples {
    /// min(256, n)
    Auto,
    /// min(count, n)
    Count(usize),
}

impl MaxSamples {
    pub fn resolve(&self, n_rows: usize) -> usize {
        match self {
            MaxSamples::Auto => AUTO_MAX_SAMPLES.min(n_rows),
            MaxSamples::Count(c) => (*c).min(n_rows),
        }
    }
}

impl fmt::Display for MaxSamples {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxSamples::Auto => f.write_str("auto"),
            MaxSamples::Count(c) => write!(f, "{}", c),
        }
    }
}

/// Hyperparameters selected by the trainer and stored with the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    pub contamination: f64,
    pub n_estimators: usize,
    pub max_samples: MaxSamples,
    pub bootstrap: bool,
}

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated percentile, `q` in [0, 100].
fn percentile(values: &mut [f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let rank = (q / 100.0).clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (rank - lo as f64)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

/// Arena-allocated tree; node 0 is the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn build(x: &ArrayView2<f64>, rows: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(x, rows, 0, height_limit, rng);
        tree
    }

    fn grow(
        &mut self,
        x: &ArrayView2<f64>,
        rows: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });
        if depth >= height_limit || rows.len() <= 1 {
            return id;
        }

        // Only features with a finite, non-empty spread can split this node.
        let candidates: Vec<(usize, f64, f64)> = (0..x.ncols())
            .filter_map(|f| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    let v = x[[r, f]];
                    (lo.min(v), hi.max(v))
                });
                (hi > lo && (hi - lo).is_finite()).then_some((f, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return id;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.iter().partition(|&&r| x[[r, feature]] < threshold);

        let left = self.grow(x, left_rows, depth + 1, height_limit, rng);
        let right = self.grow(x, right_rows, depth + 1, height_limit, rng);
        self.nodes[id] = Node::Split { feature, threshold, left, right };
        id
    }

    fn path_length(&self, row: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(size),
                Node::Split { feature, threshold, left, right } => {
                    let v = row.get(feature).copied().unwrap_or(0.0);
                    node = if v < threshold { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Fitted isolation forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    n_features: usize,
    /// Decision threshold on `score_sample`: the contamination percentile of training scores.
    offset: f64,
}

impl IsolationForest {
    /// Fit on `x` (unsupervised). Deterministic for a given `seed`.
    pub fn fit(x: ArrayView2<f64>, params: &HyperParams, seed: u64) -> Result<Self, FitError> {
        if !(params.contamination > 0.0 && params.contamination <= 0.5) {
            return Err(FitError::InvalidContamination(params.contamination));
        }
        let n = x.nrows();
        if n == 0 {
            return Err(FitError::EmptyTrainingSet);
        }

        let sample_size = params.max_samples.resolve(n);
        let height_limit = (sample_size.max(2) as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(seed);

        let trees = (0..params.n_estimators.max(1))
            .map(|_| {
                let rows: Vec<usize> = if params.bootstrap {
                    (0..sample_size).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    index::sample(&mut rng, n, sample_size).into_vec()
                };
                IsolationTree::build(&x, rows, height_limit, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            n_features: x.ncols(),
            offset: 0.0,
        };
        let mut train_scores: Vec<f64> = x
            .rows()
            .into_iter()
            .map(|r| forest.score_sample(&r.to_vec()))
            .collect();
        forest.offset = percentile(&mut train_scores, 100.0 * params.contamination);
        Ok(forest)
    }

    /// Opposite of the anomaly score: values near -1 are isolated quickly.
    pub fn score_sample(&self, row: &[f64]) -> f64 {
        let mean_depth =
            self.trees.iter().map(|t| t.path_length(row)).sum::<f64>() / self.trees.len() as f64;
        let norm = average_path_length(self.sample_size);
        let norm = if norm > 0.0 { norm } else { 1.0 };
        -(2f64.powf(-mean_depth / norm))
    }

    /// Negative for outliers, positive for inliers.
    pub fn decision_function(&self, row: &[f64]) -> f64 {
        self.score_sample(row) - self.offset
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }
}
