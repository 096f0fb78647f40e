//! Multi-step random-forest forecasting.
//!
//! One independent regressor per horizon step: the model for step `h` maps
//! the feature row at day `t` to the target at day `t + h`. Training pairs
//! are formed so that the label index stays inside the training partition,
//! which keeps every feature row strictly earlier than the partition end.

use crate::config::TrainingConfig;
use crate::domain::errors::PipelineError;
use crate::domain::metrics::{mae, rmse};
use super::search::ParamSet;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::ops::Range;
use tracing::debug;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

#[derive(Debug, Clone, Copy)]
pub struct ForestHyperParams {
    pub n_trees: usize,
    pub max_depth: u16,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl ForestHyperParams {
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            n_trees: config.n_trees,
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            seed: config.seed,
        }
    }

    /// Overlays searched values onto the config defaults.
    pub fn with_params(config: &TrainingConfig, params: &ParamSet) -> Self {
        let mut hp = Self::from_config(config);
        if let Some(&v) = params.get("n_trees") {
            hp.n_trees = v as usize;
        }
        if let Some(&v) = params.get("max_depth") {
            hp.max_depth = v as u16;
        }
        if let Some(&v) = params.get("min_samples_split") {
            hp.min_samples_split = v as usize;
        }
        hp
    }
}

/// Aligned forecasts over one partition: the pooled series covers every
/// horizon step, the step-1 series is what directional metrics are read
/// from.
pub struct ForecastSet {
    pub pooled_pred: Vec<f64>,
    pub pooled_actual: Vec<f64>,
    pub step1_pred: Vec<f64>,
    pub step1_actual: Vec<f64>,
}

impl ForecastSet {
    pub fn mae(&self) -> f64 {
        mae(&self.pooled_pred, &self.pooled_actual)
    }

    pub fn rmse(&self) -> f64 {
        rmse(&self.pooled_pred, &self.pooled_actual)
    }
}

/// One fitted forest per horizon step.
#[derive(Serialize, Deserialize)]
pub struct MultiStepForest {
    models: Vec<Forest>,
    horizon: usize,
}

impl MultiStepForest {
    /// Fits `horizon` forests on labels inside the training range.
    pub fn fit(
        rows: &[Vec<f64>],
        target: &[f64],
        train: &Range<usize>,
        horizon: usize,
        hp: ForestHyperParams,
    ) -> Result<Self, PipelineError> {
        if horizon == 0 {
            return Err(PipelineError::fit("forecast horizon must be at least 1"));
        }
        let mut models = Vec::with_capacity(horizon);
        for step in 1..=horizon {
            let labels: Vec<usize> = train.clone().filter(|&i| i >= step).collect();
            if labels.len() < 10 {
                return Err(PipelineError::InsufficientData {
                    context: format!("forest training pairs at step {}", step),
                    rows: labels.len(),
                    required: 10,
                });
            }
            let x: Vec<Vec<f64>> = labels.iter().map(|&i| rows[i - step].clone()).collect();
            let y: Vec<f64> = labels.iter().map(|&i| target[i]).collect();
            debug!(step, pairs = labels.len(), "fitting forest");
            models.push(fit_forest(&x, &y, hp)?);
        }
        Ok(Self { models, horizon })
    }

    /// Predicts every label index in `part` for every horizon step and
    /// returns the aligned forecast/actual series.
    pub fn forecast(
        &self,
        rows: &[Vec<f64>],
        target: &[f64],
        part: &Range<usize>,
    ) -> Result<ForecastSet, PipelineError> {
        let mut set = ForecastSet {
            pooled_pred: Vec::new(),
            pooled_actual: Vec::new(),
            step1_pred: Vec::new(),
            step1_actual: Vec::new(),
        };
        for (idx, model) in self.models.iter().enumerate() {
            let step = idx + 1;
            let labels: Vec<usize> = part.clone().filter(|&i| i >= step).collect();
            if labels.is_empty() {
                continue;
            }
            let x: Vec<Vec<f64>> = labels.iter().map(|&i| rows[i - step].clone()).collect();
            let pred = predict(model, &x)?;
            let actual: Vec<f64> = labels.iter().map(|&i| target[i]).collect();
            if step == 1 {
                set.step1_pred = pred.clone();
                set.step1_actual = actual.clone();
            }
            set.pooled_pred.extend(pred);
            set.pooled_actual.extend(actual);
        }
        if set.pooled_pred.is_empty() {
            return Err(PipelineError::InsufficientData {
                context: "forest evaluation partition".to_string(),
                rows: part.len(),
                required: self.horizon + 1,
            });
        }
        Ok(set)
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }
}

fn fit_forest(x: &[Vec<f64>], y: &[f64], hp: ForestHyperParams) -> Result<Forest, PipelineError> {
    let matrix = DenseMatrix::from_2d_vec(&x.to_vec())
        .map_err(|e| PipelineError::fit(format!("matrix construction: {}", e)))?;
    let params = RandomForestRegressorParameters::default()
        .with_n_trees(hp.n_trees)
        .with_max_depth(hp.max_depth)
        .with_min_samples_split(hp.min_samples_split)
        .with_seed(hp.seed);
    RandomForestRegressor::fit(&matrix, &y.to_vec(), params)
        .map_err(|e| PipelineError::fit(format!("random forest: {}", e)))
}

fn predict(model: &Forest, x: &[Vec<f64>]) -> Result<Vec<f64>, PipelineError> {
    let matrix = DenseMatrix::from_2d_vec(&x.to_vec())
        .map_err(|e| PipelineError::fit(format!("matrix construction: {}", e)))?;
    model
        .predict(&matrix)
        .map_err(|e| PipelineError::fit(format!("random forest predict: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        // Target follows the feature with a one-day lag plus a trend.
        let feature: Vec<f64> = (0..n).map(|i| (i as f64 * 0.05).sin() * 10.0).collect();
        let target: Vec<f64> = (0..n)
            .map(|i| feature[i.saturating_sub(1)] * 2.0 + i as f64 * 0.01)
            .collect();
        let rows: Vec<Vec<f64>> = feature.iter().map(|&f| vec![f]).collect();
        (rows, target)
    }

    fn hp() -> ForestHyperParams {
        ForestHyperParams {
            n_trees: 30,
            max_depth: 8,
            min_samples_split: 2,
            seed: 7,
        }
    }

    #[test]
    fn test_fit_one_model_per_step() {
        let (rows, target) = synthetic(200);
        let model = MultiStepForest::fit(&rows, &target, &(0..150), 3, hp()).unwrap();
        assert_eq!(model.horizon(), 3);
        assert_eq!(model.models.len(), 3);
    }

    #[test]
    fn test_forecast_aligns_with_partition() {
        let (rows, target) = synthetic(200);
        let model = MultiStepForest::fit(&rows, &target, &(0..150), 2, hp()).unwrap();
        let set = model.forecast(&rows, &target, &(150..200)).unwrap();
        assert_eq!(set.step1_pred.len(), 50);
        assert_eq!(set.pooled_pred.len(), 100);
        assert_eq!(set.pooled_pred.len(), set.pooled_actual.len());
    }

    #[test]
    fn test_learns_lagged_signal() {
        let (rows, target) = synthetic(300);
        let model = MultiStepForest::fit(&rows, &target, &(0..240), 1, hp()).unwrap();
        let set = model.forecast(&rows, &target, &(240..300)).unwrap();
        // The signal is smooth and strongly lag-correlated, so the forest
        // must beat a constant-mean predictor by a wide margin.
        let mean = target[240..].iter().sum::<f64>() / 60.0;
        let naive: Vec<f64> = vec![mean; 60];
        assert!(set.rmse() < rmse(&naive, &set.pooled_actual) * 0.8);
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let (rows, target) = synthetic(100);
        assert!(MultiStepForest::fit(&rows, &target, &(0..80), 0, hp()).is_err());
    }

    #[test]
    fn test_too_few_pairs_rejected() {
        let (rows, target) = synthetic(30);
        assert!(MultiStepForest::fit(&rows, &target, &(0..5), 1, hp()).is_err());
    }
}
