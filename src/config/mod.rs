//! Configuration for the forecasting pipeline.
//!
//! Every stage takes an explicit config struct; there is no module-level
//! state and no shared output directory. Enumerated values implement
//! `FromStr` so the CLI can parse them without string dispatch at call
//! sites.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Feature-ranking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankMethod {
    Correlation,
    MutualInfo,
    RandomForest,
    Lasso,
    Boruta,
    /// Mean of the per-method max-normalized scores of all other methods.
    Combined,
}

impl FromStr for RankMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "correlation" => Ok(RankMethod::Correlation),
            "mutual_info" => Ok(RankMethod::MutualInfo),
            "random_forest" => Ok(RankMethod::RandomForest),
            "lasso" => Ok(RankMethod::Lasso),
            "boruta" => Ok(RankMethod::Boruta),
            "combined" => Ok(RankMethod::Combined),
            _ => anyhow::bail!(
                "Invalid ranking method: {}. Must be one of 'correlation', 'mutual_info', \
                 'random_forest', 'lasso', 'boruta', 'combined'",
                s
            ),
        }
    }
}

/// Model family for training/evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelFamily {
    RandomForest,
    SequenceModel,
}

impl FromStr for ModelFamily {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "random_forest" => Ok(ModelFamily::RandomForest),
            "sequence_model" => Ok(ModelFamily::SequenceModel),
            _ => anyhow::bail!(
                "Invalid model family: {}. Must be 'random_forest' or 'sequence_model'",
                s
            ),
        }
    }
}

/// Hyperparameter-search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStrategy {
    Grid,
    Random,
    Bayesian,
}

impl FromStr for SearchStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "grid" => Ok(SearchStrategy::Grid),
            "random" => Ok(SearchStrategy::Random),
            "bayesian" => Ok(SearchStrategy::Bayesian),
            _ => anyhow::bail!(
                "Invalid search strategy: {}. Must be 'grid', 'random' or 'bayesian'",
                s
            ),
        }
    }
}

/// Either a minimum combined score or a fixed count of top features.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SelectionCutoff {
    Threshold(f64),
    TopK(usize),
}

/// Configuration for the feature-selection stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Target column; excluded from the candidate pool and always retained.
    pub target: String,
    pub method: RankMethod,
    pub cutoff: SelectionCutoff,
    /// Number of equal chronological segments for fold-based rankers.
    pub cv_segments: usize,
    /// Forest sizing for importance-based rankers.
    pub n_trees: usize,
    pub max_depth: u16,
    /// Regularization grid searched by the LASSO ranker.
    pub lasso_alphas: Vec<f64>,
    /// Shadow-feature trials and acceptance significance for Boruta.
    pub boruta_trials: usize,
    pub boruta_significance: f64,
    pub seed: u64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            target: "BTC/USD".to_string(),
            method: RankMethod::Combined,
            cutoff: SelectionCutoff::Threshold(0.3),
            cv_segments: 5,
            n_trees: 100,
            max_depth: 10,
            lasso_alphas: vec![0.001, 0.01, 0.1, 1.0, 10.0],
            boruta_trials: 20,
            boruta_significance: 0.05,
            seed: 42,
        }
    }
}

/// Configuration for the model training/evaluation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub target: String,
    pub family: ModelFamily,
    /// Forecast horizon in days.
    pub horizon: usize,
    pub train_frac: f64,
    pub valid_frac: f64,
    /// Smallest train partition the trainer will accept.
    pub min_train_rows: usize,
    // Random-forest family.
    pub n_trees: usize,
    pub max_depth: u16,
    pub min_samples_split: usize,
    // Sequence-model family.
    pub window: usize,
    pub hidden: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    /// Weight of the squared-error term in the sequence loss; the
    /// directional term gets `1 - loss_alpha`. Paper default 0.7.
    pub loss_alpha: f64,
    /// Steepness of the smoothed sign used by the directional term.
    pub direction_steepness: f64,
    // Hyperparameter search.
    pub search: SearchStrategy,
    pub search_trials: usize,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            target: "BTC/USD".to_string(),
            family: ModelFamily::RandomForest,
            horizon: 1,
            train_frac: 0.7,
            valid_frac: 0.15,
            min_train_rows: 30,
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 5,
            window: 14,
            hidden: 32,
            epochs: 60,
            learning_rate: 0.01,
            loss_alpha: 0.7,
            direction_steepness: 10.0,
            search: SearchStrategy::Grid,
            search_trials: 25,
            seed: 42,
        }
    }
}
