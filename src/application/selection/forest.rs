//! Random-forest importance over chronological folds.
//!
//! Folds never shuffle: each fold trains strictly before its validation
//! segment, because shuffling would leak future rows into training. Per
//! fold, importance is measured by permutation on the validation segment:
//! how much RMSE degrades when one feature's values are scrambled. Fold
//! importances are averaged; the spread is reported per feature.

use super::{mean_and_std, CandidateMatrix, FeatureRanker, FeatureScore};
use crate::domain::errors::PipelineError;
use crate::domain::metrics::rmse;
use crate::domain::split::{chronological_folds, Fold};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

pub struct ForestImportanceRanker {
    cv_segments: usize,
    n_trees: usize,
    max_depth: u16,
    seed: u64,
}

impl ForestImportanceRanker {
    pub fn new(cv_segments: usize, n_trees: usize, max_depth: u16, seed: u64) -> Self {
        Self {
            cv_segments,
            n_trees,
            max_depth,
            seed,
        }
    }
}

impl FeatureRanker for ForestImportanceRanker {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn rank(&self, candidates: &CandidateMatrix) -> Result<Vec<FeatureScore>, PipelineError> {
        let folds = chronological_folds(candidates.n_rows(), self.cv_segments)?;
        let rows = candidates.to_rows();

        // Folds are independent; the per-feature mean over folds is
        // order-independent, so parallel evaluation is safe.
        let per_fold: Vec<Vec<f64>> = folds
            .par_iter()
            .enumerate()
            .map(|(fold_idx, fold)| {
                fold_importances(
                    &rows,
                    &candidates.target,
                    fold,
                    self.n_trees,
                    self.max_depth,
                    self.seed.wrapping_add(fold_idx as u64),
                )
            })
            .collect::<Result<_, _>>()?;

        let scores = (0..candidates.n_features())
            .map(|j| {
                let fold_values: Vec<f64> = per_fold.iter().map(|f| f[j]).collect();
                let (mean, std) = mean_and_std(&fold_values);
                FeatureScore {
                    feature: candidates.names[j].clone(),
                    score: mean.max(0.0),
                    std_dev: Some(std),
                }
            })
            .collect();
        Ok(scores)
    }
}

/// Fits one forest on the fold's training rows and measures, per feature,
/// the validation RMSE increase after permuting that feature.
fn fold_importances(
    rows: &[Vec<f64>],
    target: &[f64],
    fold: &Fold,
    n_trees: usize,
    max_depth: u16,
    seed: u64,
) -> Result<Vec<f64>, PipelineError> {
    let x_train: Vec<Vec<f64>> = rows[fold.train.clone()].to_vec();
    let y_train: Vec<f64> = target[fold.train.clone()].to_vec();
    let x_valid: Vec<Vec<f64>> = rows[fold.valid.clone()].to_vec();
    let y_valid: Vec<f64> = target[fold.valid.clone()].to_vec();

    let model = fit_forest(&x_train, &y_train, n_trees, max_depth, seed)?;
    let baseline = rmse(&predict(&model, &x_valid)?, &y_valid);

    let n_features = rows[0].len();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut importances = Vec::with_capacity(n_features);
    for j in 0..n_features {
        let mut permuted = x_valid.clone();
        let mut column: Vec<f64> = permuted.iter().map(|r| r[j]).collect();
        column.shuffle(&mut rng);
        for (row, v) in permuted.iter_mut().zip(column) {
            row[j] = v;
        }
        let degraded = rmse(&predict(&model, &permuted)?, &y_valid);
        importances.push(degraded - baseline);
    }
    Ok(importances)
}

pub(crate) type ForestModel = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

pub(crate) fn fit_forest(
    x: &[Vec<f64>],
    y: &[f64],
    n_trees: usize,
    max_depth: u16,
    seed: u64,
) -> Result<ForestModel, PipelineError> {
    let matrix = DenseMatrix::from_2d_vec(&x.to_vec())
        .map_err(|e| PipelineError::fit(format!("matrix construction: {}", e)))?;
    let params = RandomForestRegressorParameters::default()
        .with_n_trees(n_trees)
        .with_max_depth(max_depth)
        .with_seed(seed);
    RandomForestRegressor::fit(&matrix, &y.to_vec(), params)
        .map_err(|e| PipelineError::fit(format!("random forest: {}", e)))
}

pub(crate) fn predict(model: &ForestModel, x: &[Vec<f64>]) -> Result<Vec<f64>, PipelineError> {
    let matrix = DenseMatrix::from_2d_vec(&x.to_vec())
        .map_err(|e| PipelineError::fit(format!("matrix construction: {}", e)))?;
    model
        .predict(&matrix)
        .map_err(|e| PipelineError::fit(format!("random forest predict: {}", e)))
}
