//! Evaluation metrics for forecast quality.
//!
//! Directional metrics treat "up" as the positive class: a step counts as
//! up when the change from the previous value is positive.

use serde::{Deserialize, Serialize};

/// Classification-style metrics over the sign of consecutive changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionalMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Evaluation report for one (model, feature set) pair on the held-out,
/// chronologically last test partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResult {
    pub model: String,
    pub features: Vec<String>,
    pub horizon: usize,
    pub n_test: usize,
    pub mae: f64,
    pub rmse: f64,
    pub directional: DirectionalMetrics,
    /// False when the fit stopped before fully converging; the metrics are
    /// then the last available ones, not a failure.
    pub converged: bool,
}

pub fn mae(predicted: &[f64], actual: &[f64]) -> f64 {
    debug_assert_eq!(predicted.len(), actual.len());
    if predicted.is_empty() {
        return f64::NAN;
    }
    predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (p - a).abs())
        .sum::<f64>()
        / predicted.len() as f64
}

pub fn rmse(predicted: &[f64], actual: &[f64]) -> f64 {
    debug_assert_eq!(predicted.len(), actual.len());
    if predicted.is_empty() {
        return f64::NAN;
    }
    (predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (p - a).powi(2))
        .sum::<f64>()
        / predicted.len() as f64)
        .sqrt()
}

/// Computes directional metrics from aligned prediction/actual series.
///
/// Both series are differenced once; a step is a hit when the predicted
/// change and the actual change share a sign. Zero actual changes count as
/// "down" so that every step is classified.
pub fn directional_metrics(predicted: &[f64], actual: &[f64]) -> DirectionalMetrics {
    debug_assert_eq!(predicted.len(), actual.len());
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut tn = 0usize;
    let mut fn_ = 0usize;

    for i in 1..predicted.len() {
        let pred_up = predicted[i] - predicted[i - 1] > 0.0;
        let actual_up = actual[i] - actual[i - 1] > 0.0;
        match (pred_up, actual_up) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, false) => tn += 1,
            (false, true) => fn_ += 1,
        }
    }

    let total = tp + fp + tn + fn_;
    let accuracy = if total == 0 {
        f64::NAN
    } else {
        (tp + tn) as f64 / total as f64
    };
    let precision = if tp + fp == 0 {
        0.0
    } else {
        tp as f64 / (tp + fp) as f64
    };
    let recall = if tp + fn_ == 0 {
        0.0
    } else {
        tp as f64 / (tp + fn_) as f64
    };
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    DirectionalMetrics {
        accuracy,
        precision,
        recall,
        f1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mae_rmse() {
        let pred = [1.0, 2.0, 3.0];
        let actual = [1.0, 3.0, 5.0];
        assert!((mae(&pred, &actual) - 1.0).abs() < 1e-12);
        let expected_rmse = ((0.0 + 1.0 + 4.0) / 3.0f64).sqrt();
        assert!((rmse(&pred, &actual) - expected_rmse).abs() < 1e-12);
    }

    #[test]
    fn test_directional_perfect() {
        let series = [1.0, 2.0, 1.5, 3.0, 2.0];
        let m = directional_metrics(&series, &series);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.f1, 1.0);
    }

    #[test]
    fn test_directional_inverted() {
        let pred = [1.0, 2.0, 3.0, 4.0];
        let actual = [4.0, 3.0, 2.0, 1.0];
        let m = directional_metrics(&pred, &actual);
        assert_eq!(m.accuracy, 0.0);
        assert_eq!(m.recall, 0.0);
    }

    #[test]
    fn test_directional_mixed() {
        // Predicted: up, up, down. Actual: up, down, down. Two hits.
        let pred = [1.0, 2.0, 3.0, 2.0];
        let actual = [1.0, 2.0, 1.0, 0.5];
        let m = directional_metrics(&pred, &actual);
        assert!((m.accuracy - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.precision - 0.5).abs() < 1e-12);
        assert!((m.recall - 1.0).abs() < 1e-12);
    }
}
