//! Flow → fixed 8-dimensional feature encoding.
//!
//! The layout below is shared by training and inference. Changing the order or a
//! formula invalidates every stored model artifact; [`FEATURE_NAMES`] is written into
//! each artifact and checked on load.

mod extractor;

pub use extractor::FeatureExtractor;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

pub const FEATURE_DIM: usize = 8;

pub const FEATURE_NAMES: [&str; FEATURE_DIM] = [
    "bytes",
    "packets",
    "duration",
    "protocol_code",
    "bytes_per_packet",
    "src_port_norm",
    "dst_port_norm",
    "flow_rate",
];

/// Fixed-size feature vector for model input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: [f64; FEATURE_DIM],
}

impl FeatureVector {
    pub fn new(values: [f64; FEATURE_DIM]) -> Self {
        Self { values }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn values(&self) -> [f64; FEATURE_DIM] {
        self.values
    }

    /// Value by feature name, e.g. `"flow_rate"`.
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }
}

/// Stack vectors into an `(n, FEATURE_DIM)` matrix, one row per vector.
pub fn to_matrix(vectors: &[FeatureVector]) -> Array2<f64> {
    let mut m = Array2::zeros((vectors.len(), FEATURE_DIM));
    for (mut row, v) in m.rows_mut().into_iter().zip(vectors) {
        for (cell, x) in row.iter_mut().zip(v.values.iter()) {
            *cell = *x;
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_rows_follow_input_order() {
        let a = FeatureVector::new([1.0; FEATURE_DIM]);
        let b = FeatureVector::new([2.0; FEATURE_DIM]);
        let m = to_matrix(&[a, b]);
        assert_eq!(m.dim(), (2, FEATURE_DIM));
        assert_eq!(m[[0, 7]], 1.0);
        assert_eq!(m[[1, 0]], 2.0);
    }

    #[test]
    fn lookup_by_name() {
        let mut values = [0.0; FEATURE_DIM];
        values[7] = 42.0;
        assert_eq!(FeatureVector::new(values).get("flow_rate"), Some(42.0));
        assert_eq!(FeatureVector::new(values).get("entropy"), None);
    }
}
