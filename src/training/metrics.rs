//! Held-out evaluation of an outlier estimator against binary labels (anomaly = positive).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(truth: &[bool], predicted: &[bool]) -> Self {
        let mut cm = Self::default();
        for (t, p) in truth.iter().zip(predicted) {
            match (t, p) {
                (false, false) => cm.true_negative += 1,
                (false, true) => cm.false_positive += 1,
                (true, false) => cm.false_negative += 1,
                (true, true) => cm.true_positive += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub confusion: ConfusionMatrix,
}

impl EvaluationMetrics {
    /// Zero-division cases score 0.
    pub fn compute(truth: &[bool], predicted: &[bool]) -> Self {
        let cm = ConfusionMatrix::from_predictions(truth, predicted);
        let precision = ratio(cm.true_positive, cm.true_positive + cm.false_positive);
        let recall = ratio(cm.true_positive, cm.true_positive + cm.false_negative);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            accuracy: ratio(cm.true_negative + cm.true_positive, cm.total()),
            precision,
            recall,
            f1_score,
            confusion: cm,
        }
    }

    /// Ranking score for candidates: accuracy alone until it clears `target`,
    /// then 0.7·accuracy + 0.3·F1.
    pub fn selection_score(&self, target: f64) -> f64 {
        if self.accuracy >= target {
            0.7 * self.accuracy + 0.3 * self.f1_score
        } else {
            self.accuracy
        }
    }

    /// Share of normal and anomalous rows classified correctly.
    pub fn per_class_recall(&self) -> (f64, f64) {
        let cm = &self.confusion;
        (
            ratio(cm.true_negative, cm.true_negative + cm.false_positive),
            ratio(cm.true_positive, cm.true_positive + cm.false_negative),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_from_known_confusion() {
        let truth = [true, true, false, false, false, true];
        let pred = [true, false, false, true, false, true];
        let m = EvaluationMetrics::compute(&truth, &pred);
        assert_eq!(
            m.confusion,
            ConfusionMatrix { true_negative: 2, false_positive: 1, false_negative: 1, true_positive: 2 }
        );
        assert!((m.accuracy - 4.0 / 6.0).abs() < 1e-12);
        assert!((m.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1_score - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn no_positive_predictions_scores_zero_not_nan() {
        let m = EvaluationMetrics::compute(&[false, true], &[false, false]);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.f1_score, 0.0);
        assert_eq!(m.accuracy, 0.5);
    }

    #[test]
    fn selection_score_switches_at_target() {
        let below = EvaluationMetrics::compute(&[true, false, false, false], &[false, false, false, false]);
        assert_eq!(below.selection_score(0.85), 0.75);

        let above = EvaluationMetrics::compute(&[true, false, false, false], &[true, false, false, false]);
        assert!((above.selection_score(0.85) - 1.0).abs() < 1e-12);
        assert_eq!(above.per_class_recall(), (1.0, 1.0));
    }
}
