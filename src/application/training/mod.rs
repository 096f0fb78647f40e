//! Model training and held-out evaluation.
//!
//! The trainer takes the combined table plus a selected feature set, splits
//! rows chronologically, tunes hyperparameters against the validation
//! partition only, refits on the training partition with the winning
//! parameters, and reports metrics on the untouched test partition. A
//! leakage guard checks that no tuning step reads test rows.

pub mod forest;
pub mod search;
pub mod sequence;

use crate::application::selection::SelectedFeatureSet;
use crate::config::{ModelFamily, TrainingConfig};
use crate::domain::errors::PipelineError;
use crate::domain::metrics::{directional_metrics, ModelResult};
use crate::domain::split::{chronological_split, ChronoSplit, LeakageGuard};
use crate::domain::table::TimeSeriesTable;
use forest::{ForecastSet, ForestHyperParams, MultiStepForest};
use search::{ParamRange, SearchOutcome, SearchSpace};
use sequence::{FittedSequenceModel, SequenceHyperParams};
use serde::Serialize;
use tracing::{info, warn};

/// Everything one training run produces: the test-set evaluation, the
/// search history (when a search ran), and the opaque persisted model.
#[derive(Debug, Serialize)]
pub struct TrainOutcome {
    pub result: ModelResult,
    pub search: Option<SearchOutcome>,
    pub model_blob: serde_json::Value,
    /// Per-epoch training loss; empty for the forest family.
    pub epoch_losses: Vec<f64>,
}

pub struct Trainer {
    config: TrainingConfig,
    space: Option<SearchSpace>,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            space: None,
        }
    }

    /// Replaces the built-in search space with one loaded by the caller.
    pub fn with_search_space(mut self, space: SearchSpace) -> Self {
        self.space = Some(space);
        self
    }

    /// Trains on the selected features and evaluates on the test partition.
    ///
    /// The target's own history is always among the predictors; a forecast
    /// that cannot see past prices is not what any of the ranking methods
    /// scored against.
    pub fn train_and_evaluate(
        &self,
        table: &TimeSeriesTable,
        selected: &SelectedFeatureSet,
    ) -> Result<TrainOutcome, PipelineError> {
        let mut predictor_names = selected.features.clone();
        if !predictor_names.iter().any(|f| f == &selected.target) {
            predictor_names.push(selected.target.clone());
        }
        let rows = table.matrix(&predictor_names)?;
        let target = table.column(&selected.target)?;
        check_finite(&predictor_names, &rows)?;
        if target.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::input(
                selected.target.clone(),
                "target column contains non-finite values",
            ));
        }

        let n = rows.len();
        let split = chronological_split(n, self.config.train_frac, self.config.valid_frac)?;
        if split.train.len() < self.config.min_train_rows {
            return Err(PipelineError::InsufficientData {
                context: "training partition".to_string(),
                rows: split.train.len(),
                required: self.config.min_train_rows,
            });
        }
        let guard = LeakageGuard::new(split.test.start);
        guard.assert_before_test(&split.train)?;
        guard.assert_before_test(&split.valid)?;

        info!(
            family = ?self.config.family,
            features = predictor_names.len(),
            train = split.train.len(),
            valid = split.valid.len(),
            test = split.test.len(),
            "training model"
        );

        match self.config.family {
            ModelFamily::RandomForest => self.run_forest(&rows, &target, &split, &guard, selected),
            ModelFamily::SequenceModel => {
                self.run_sequence(&rows, &target, &split, &guard, selected)
            }
        }
    }

    fn run_forest(
        &self,
        rows: &[Vec<f64>],
        target: &[f64],
        split: &ChronoSplit,
        guard: &LeakageGuard,
        selected: &SelectedFeatureSet,
    ) -> Result<TrainOutcome, PipelineError> {
        let space = self
            .space
            .clone()
            .unwrap_or_else(default_forest_space);

        let search_outcome = if self.config.search_trials > 0 && !space.params.is_empty() {
            let outcome = search::run_search(
                self.config.search,
                &space,
                self.config.search_trials,
                self.config.seed,
                |params| {
                    guard.assert_before_test(&split.valid)?;
                    let hp = ForestHyperParams::with_params(&self.config, params);
                    let model =
                        MultiStepForest::fit(rows, target, &split.train, self.config.horizon, hp)?;
                    Ok(model.forecast(rows, target, &split.valid)?.rmse())
                },
            )?;
            Some(outcome)
        } else {
            None
        };

        let hp = match &search_outcome {
            Some(o) => ForestHyperParams::with_params(&self.config, &o.best_params),
            None => ForestHyperParams::from_config(&self.config),
        };
        let model = MultiStepForest::fit(rows, target, &split.train, self.config.horizon, hp)?;
        let forecasts = model.forecast(rows, target, &split.test)?;
        let result = build_result("random_forest", selected, split, &forecasts, true, self.config.horizon);

        let model_blob = serde_json::to_value(&model)
            .map_err(|e| PipelineError::fit(format!("model serialization: {}", e)))?;
        Ok(TrainOutcome {
            result,
            search: search_outcome,
            model_blob,
            epoch_losses: Vec::new(),
        })
    }

    fn run_sequence(
        &self,
        rows: &[Vec<f64>],
        target: &[f64],
        split: &ChronoSplit,
        guard: &LeakageGuard,
        selected: &SelectedFeatureSet,
    ) -> Result<TrainOutcome, PipelineError> {
        let space = self
            .space
            .clone()
            .unwrap_or_else(default_sequence_space);

        let search_outcome = if self.config.search_trials > 0 && !space.params.is_empty() {
            let outcome = search::run_search(
                self.config.search,
                &space,
                self.config.search_trials,
                self.config.seed,
                |params| {
                    guard.assert_before_test(&split.valid)?;
                    let hp = SequenceHyperParams::with_params(&self.config, params);
                    let model = FittedSequenceModel::fit(
                        rows,
                        target,
                        &split.train,
                        self.config.horizon,
                        hp,
                    )?;
                    Ok(model.forecast(rows, target, &split.valid)?.rmse())
                },
            )?;
            Some(outcome)
        } else {
            None
        };

        let hp = match &search_outcome {
            Some(o) => SequenceHyperParams::with_params(&self.config, &o.best_params),
            None => SequenceHyperParams::from_config(&self.config),
        };
        let model =
            FittedSequenceModel::fit(rows, target, &split.train, self.config.horizon, hp)?;
        if !model.converged {
            warn!("sequence training stopped before converging; reporting last metrics");
        }
        let forecasts = model.forecast(rows, target, &split.test)?;
        let result = build_result(
            "sequence_model",
            selected,
            split,
            &forecasts,
            model.converged,
            self.config.horizon,
        );

        Ok(TrainOutcome {
            result,
            search: search_outcome,
            model_blob: model.weights_json(),
            epoch_losses: model.epoch_losses.clone(),
        })
    }
}

fn check_finite(names: &[String], rows: &[Vec<f64>]) -> Result<(), PipelineError> {
    for row in rows {
        for (j, v) in row.iter().enumerate() {
            if !v.is_finite() {
                return Err(PipelineError::input(
                    names[j].clone(),
                    "non-finite value reached the trainer; run the cleaner first",
                ));
            }
        }
    }
    Ok(())
}

fn build_result(
    model: &str,
    selected: &SelectedFeatureSet,
    split: &ChronoSplit,
    forecasts: &ForecastSet,
    converged: bool,
    horizon: usize,
) -> ModelResult {
    ModelResult {
        model: model.to_string(),
        features: selected.features.clone(),
        horizon,
        n_test: split.test.len(),
        mae: forecasts.mae(),
        rmse: forecasts.rmse(),
        directional: directional_metrics(&forecasts.step1_pred, &forecasts.step1_actual),
        converged,
    }
}

fn default_forest_space() -> SearchSpace {
    SearchSpace {
        params: vec![
            ParamRange {
                name: "n_trees".to_string(),
                min: 50.0,
                max: 200.0,
                steps: 4,
                integer: true,
            },
            ParamRange {
                name: "max_depth".to_string(),
                min: 4.0,
                max: 16.0,
                steps: 4,
                integer: true,
            },
            ParamRange {
                name: "min_samples_split".to_string(),
                min: 2.0,
                max: 10.0,
                steps: 3,
                integer: true,
            },
        ],
    }
}

fn default_sequence_space() -> SearchSpace {
    SearchSpace {
        params: vec![
            ParamRange {
                name: "hidden".to_string(),
                min: 8.0,
                max: 48.0,
                steps: 3,
                integer: true,
            },
            ParamRange {
                name: "learning_rate".to_string(),
                min: 0.002,
                max: 0.05,
                steps: 4,
                integer: false,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchStrategy;
    use chrono::NaiveDate;

    fn table(n: usize) -> TimeSeriesTable {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..n).map(|i| start + chrono::Days::new(i as u64)).collect();
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let t = i as f64;
                let price = (t * 0.05).sin() * 100.0 + 20_000.0 + t;
                vec![price, (t * 0.05).cos() * 50.0, (t * 0.21).sin()]
            })
            .collect();
        TimeSeriesTable::new(
            dates,
            vec![
                "BTC/USD".to_string(),
                "driver".to_string(),
                "wiggle".to_string(),
            ],
            rows,
        )
        .unwrap()
    }

    fn config() -> TrainingConfig {
        TrainingConfig {
            n_trees: 20,
            max_depth: 6,
            search_trials: 0,
            ..TrainingConfig::default()
        }
    }

    fn selected() -> SelectedFeatureSet {
        SelectedFeatureSet {
            features: vec!["driver".to_string(), "wiggle".to_string()],
            target: "BTC/USD".to_string(),
        }
    }

    #[test]
    fn test_forest_without_search() {
        let outcome = Trainer::new(config())
            .train_and_evaluate(&table(200), &selected())
            .unwrap();
        assert_eq!(outcome.result.model, "random_forest");
        assert!(outcome.search.is_none());
        assert!(outcome.result.mae.is_finite());
        assert!(outcome.result.converged);
        assert_eq!(outcome.result.n_test, 30);
    }

    #[test]
    fn test_forest_with_random_search() {
        let cfg = TrainingConfig {
            search: SearchStrategy::Random,
            search_trials: 3,
            n_trees: 15,
            max_depth: 5,
            ..TrainingConfig::default()
        };
        let outcome = Trainer::new(cfg)
            .train_and_evaluate(&table(150), &selected())
            .unwrap();
        let search = outcome.search.unwrap();
        assert_eq!(search.trials.len(), 3);
        assert!(search.best_score.is_finite());
    }

    #[test]
    fn test_sequence_family() {
        let cfg = TrainingConfig {
            family: ModelFamily::SequenceModel,
            window: 8,
            hidden: 10,
            epochs: 10,
            search_trials: 0,
            ..TrainingConfig::default()
        };
        let outcome = Trainer::new(cfg)
            .train_and_evaluate(&table(200), &selected())
            .unwrap();
        assert_eq!(outcome.result.model, "sequence_model");
        assert!(!outcome.epoch_losses.is_empty());
        assert!(outcome.model_blob.get("w_x").is_some());
    }

    #[test]
    fn test_too_few_rows() {
        let cfg = TrainingConfig {
            min_train_rows: 500,
            ..config()
        };
        let err = Trainer::new(cfg)
            .train_and_evaluate(&table(200), &selected())
            .unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { .. }));
    }

    #[test]
    fn test_missing_feature_column() {
        let sel = SelectedFeatureSet {
            features: vec!["nope".to_string()],
            target: "BTC/USD".to_string(),
        };
        assert!(Trainer::new(config())
            .train_and_evaluate(&table(100), &sel)
            .is_err());
    }

    #[test]
    fn test_custom_search_space_respected() {
        let cfg = TrainingConfig {
            search: SearchStrategy::Grid,
            search_trials: 1,
            n_trees: 10,
            ..TrainingConfig::default()
        };
        let space = SearchSpace {
            params: vec![ParamRange {
                name: "n_trees".to_string(),
                min: 10.0,
                max: 20.0,
                steps: 2,
                integer: true,
            }],
        };
        let outcome = Trainer::new(cfg)
            .with_search_space(space)
            .train_and_evaluate(&table(150), &selected())
            .unwrap();
        assert_eq!(outcome.search.unwrap().trials.len(), 2);
    }
}
