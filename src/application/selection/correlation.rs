//! Absolute Pearson correlation against the target. No temporal structure
//! is considered; this is the cheapest baseline ranking.

use super::{CandidateMatrix, FeatureRanker, FeatureScore};
use crate::domain::errors::PipelineError;

pub struct CorrelationRanker;

impl FeatureRanker for CorrelationRanker {
    fn name(&self) -> &'static str {
        "correlation"
    }

    fn rank(&self, candidates: &CandidateMatrix) -> Result<Vec<FeatureScore>, PipelineError> {
        if candidates.n_rows() < 2 {
            return Err(PipelineError::input(
                candidates.names.first().map(String::as_str).unwrap_or("?"),
                "need at least 2 rows for correlation",
            ));
        }
        Ok(candidates
            .names
            .iter()
            .zip(&candidates.columns)
            .map(|(name, col)| FeatureScore {
                feature: name.clone(),
                score: pearson(col, &candidates.target).abs(),
                std_dev: None,
            })
            .collect())
    }
}

/// Plain Pearson r. Callers guarantee both inputs vary.
pub(crate) fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let x_mean = x.iter().sum::<f64>() / n;
    let y_mean = y.iter().sum::<f64>() / n;

    let mut sum_xy = 0.0;
    let mut sum_x2 = 0.0;
    let mut sum_y2 = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - x_mean;
        let dy = yi - y_mean;
        sum_xy += dx * dy;
        sum_x2 += dx * dx;
        sum_y2 += dy * dy;
    }

    let denom = (sum_x2 * sum_y2).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        sum_xy / denom
    }
}
