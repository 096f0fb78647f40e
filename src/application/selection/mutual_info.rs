//! Binned mutual information between each feature and the target.
//!
//! Both variables are discretized into equal-width bins (sqrt(n) bins,
//! clamped to [2, 20]) and MI is computed from the joint histogram. This is
//! a nonparametric dependency score: it picks up monotone and non-monotone
//! relationships alike.

use super::{CandidateMatrix, FeatureRanker, FeatureScore};
use crate::domain::errors::PipelineError;
use std::collections::HashMap;

pub struct MutualInfoRanker;

impl FeatureRanker for MutualInfoRanker {
    fn name(&self) -> &'static str {
        "mutual_info"
    }

    fn rank(&self, candidates: &CandidateMatrix) -> Result<Vec<FeatureScore>, PipelineError> {
        if candidates.n_rows() < 4 {
            return Err(PipelineError::input(
                candidates.names.first().map(String::as_str).unwrap_or("?"),
                "need at least 4 rows for mutual information",
            ));
        }
        let y_bins = discretize(&candidates.target);
        Ok(candidates
            .names
            .iter()
            .zip(&candidates.columns)
            .map(|(name, col)| FeatureScore {
                feature: name.clone(),
                score: mutual_information(&discretize(col), &y_bins),
                std_dev: None,
            })
            .collect())
    }
}

fn discretize(values: &[f64]) -> Vec<usize> {
    let n_bins = ((values.len() as f64).sqrt() as usize).clamp(2, 20);
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range <= 0.0 {
        return vec![0; values.len()];
    }
    let width = range / n_bins as f64;
    values
        .iter()
        .map(|&v| (((v - min) / width) as usize).min(n_bins - 1))
        .collect()
}

fn mutual_information(x_bins: &[usize], y_bins: &[usize]) -> f64 {
    let n = x_bins.len() as f64;
    let mut joint: HashMap<(usize, usize), usize> = HashMap::new();
    let mut x_counts: HashMap<usize, usize> = HashMap::new();
    let mut y_counts: HashMap<usize, usize> = HashMap::new();

    for (&xb, &yb) in x_bins.iter().zip(y_bins) {
        *joint.entry((xb, yb)).or_insert(0) += 1;
        *x_counts.entry(xb).or_insert(0) += 1;
        *y_counts.entry(yb).or_insert(0) += 1;
    }

    let mut mi = 0.0;
    for (&(xb, yb), &count) in &joint {
        let p_xy = count as f64 / n;
        let p_x = x_counts[&xb] as f64 / n;
        let p_y = y_counts[&yb] as f64 / n;
        mi += p_xy * (p_xy / (p_x * p_y)).ln();
    }
    mi.max(0.0)
}
