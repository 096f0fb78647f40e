//! Boruta-style shadow-feature testing.
//!
//! Each trial augments the real features with randomly permuted shadow
//! copies, fits a forest, and counts a "hit" for every real feature whose
//! permutation importance exceeds the best shadow importance. Acceptance is
//! a one-sided binomial test on the hit count at p = 0.5 — a significance
//! test, not a threshold on raw importance.

use super::forest::{fit_forest, predict};
use super::{CandidateMatrix, FeatureRanker, FeatureScore};
use crate::domain::errors::PipelineError;
use crate::domain::metrics::rmse;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use statrs::distribution::{Binomial, DiscreteCDF};
use tracing::debug;

pub struct BorutaRanker {
    trials: usize,
    significance: f64,
    n_trees: usize,
    max_depth: u16,
    seed: u64,
}

impl BorutaRanker {
    pub fn new(
        trials: usize,
        significance: f64,
        n_trees: usize,
        max_depth: u16,
        seed: u64,
    ) -> Self {
        Self {
            trials,
            significance,
            n_trees,
            max_depth,
            seed,
        }
    }
}

impl FeatureRanker for BorutaRanker {
    fn name(&self) -> &'static str {
        "boruta"
    }

    fn rank(&self, candidates: &CandidateMatrix) -> Result<Vec<FeatureScore>, PipelineError> {
        let n = candidates.n_rows();
        if n < 20 {
            return Err(PipelineError::InsufficientData {
                context: "boruta shadow-feature testing".to_string(),
                rows: n,
                required: 20,
            });
        }

        // Trials are independent and hit counting is commutative, so they
        // may run in parallel without affecting the result.
        let per_trial: Vec<Vec<bool>> = (0..self.trials)
            .into_par_iter()
            .map(|trial| {
                self.run_trial(candidates, self.seed.wrapping_add(trial as u64 * 7919))
            })
            .collect::<Result<_, _>>()?;

        let n_features = candidates.n_features();
        let mut hits = vec![0usize; n_features];
        for trial in &per_trial {
            for (j, &hit) in trial.iter().enumerate() {
                if hit {
                    hits[j] += 1;
                }
            }
        }

        let binom = Binomial::new(0.5, self.trials as u64)
            .map_err(|e| PipelineError::fit(format!("binomial test: {}", e)))?;

        let scores = candidates
            .names
            .iter()
            .zip(&hits)
            .map(|(name, &h)| {
                let p_value = if h == 0 { 1.0 } else { binom.sf(h as u64 - 1) };
                let accepted = p_value < self.significance;
                debug!(feature = %name, hits = h, p_value, accepted, "boruta verdict");
                FeatureScore {
                    feature: name.clone(),
                    score: if accepted {
                        h as f64 / self.trials as f64
                    } else {
                        0.0
                    },
                    std_dev: None,
                }
            })
            .collect();
        Ok(scores)
    }
}

impl BorutaRanker {
    /// One shadow trial: returns, per real feature, whether it beat the
    /// best shadow feature.
    fn run_trial(
        &self,
        candidates: &CandidateMatrix,
        seed: u64,
    ) -> Result<Vec<bool>, PipelineError> {
        let n = candidates.n_rows();
        let n_features = candidates.n_features();
        let mut rng = StdRng::seed_from_u64(seed);

        // Real columns followed by one permuted shadow per real column.
        let mut columns: Vec<Vec<f64>> = candidates.columns.clone();
        for col in &candidates.columns {
            let mut shadow = col.clone();
            shadow.shuffle(&mut rng);
            columns.push(shadow);
        }

        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| columns.iter().map(|c| c[i]).collect())
            .collect();

        // Chronological holdout: fit on the first 75%, measure importance
        // on the most recent quarter.
        let split = n - n / 4;
        let model = fit_forest(
            &rows[..split],
            &candidates.target[..split],
            self.n_trees,
            self.max_depth,
            seed,
        )?;
        let eval_rows: Vec<Vec<f64>> = rows[split..].to_vec();
        let eval_y = &candidates.target[split..];
        let baseline = rmse(&predict(&model, &eval_rows)?, eval_y);

        let mut importances = Vec::with_capacity(columns.len());
        for j in 0..columns.len() {
            let mut permuted = eval_rows.clone();
            let mut column: Vec<f64> = permuted.iter().map(|r| r[j]).collect();
            column.shuffle(&mut rng);
            for (row, v) in permuted.iter_mut().zip(column) {
                row[j] = v;
            }
            importances.push(rmse(&predict(&model, &permuted)?, eval_y) - baseline);
        }

        let max_shadow = importances[n_features..]
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        Ok(importances[..n_features]
            .iter()
            .map(|&imp| imp > max_shadow)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_informative_accepted_noise_rejected() {
        let n = 200;
        let signal: Vec<f64> = (0..n).map(|i| (i as f64 * 0.08).sin() * 5.0).collect();
        let noise: Vec<f64> = (0..n)
            .map(|i| ((i * 40503_usize) % 541) as f64 / 541.0)
            .collect();
        let target: Vec<f64> = signal.iter().map(|s| 4.0 * s).collect();
        let candidates = CandidateMatrix {
            names: vec!["signal".to_string(), "noise".to_string()],
            columns: vec![signal, noise],
            target,
        };

        let ranker = BorutaRanker::new(12, 0.05, 25, 6, 3);
        let scores = ranker.rank(&candidates).unwrap();
        let signal_score = scores.iter().find(|s| s.feature == "signal").unwrap();
        let noise_score = scores.iter().find(|s| s.feature == "noise").unwrap();
        assert!(signal_score.score > 0.0, "signal should be accepted");
        assert!(signal_score.score > noise_score.score);
    }

    #[test]
    fn test_deterministic_under_fixed_seed() {
        let n = 120;
        let a: Vec<f64> = (0..n).map(|i| (i as f64 * 0.1).cos()).collect();
        let target: Vec<f64> = a.iter().map(|v| 2.0 * v).collect();
        let candidates = CandidateMatrix {
            names: vec!["a".to_string()],
            columns: vec![a],
            target,
        };
        let ranker = BorutaRanker::new(8, 0.05, 15, 5, 21);
        let first = ranker.rank(&candidates).unwrap();
        let second = ranker.rank(&candidates).unwrap();
        assert_eq!(first[0].score, second[0].score);
    }

    #[test]
    fn test_too_few_rows_fails() {
        let candidates = CandidateMatrix {
            names: vec!["a".to_string()],
            columns: vec![vec![1.0; 10]],
            target: vec![1.0; 10],
        };
        let ranker = BorutaRanker::new(5, 0.05, 10, 4, 1);
        assert!(ranker.rank(&candidates).is_err());
    }
}
