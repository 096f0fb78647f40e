//! Feature selection: interchangeable ranking strategies behind one trait.
//!
//! Each strategy scores candidate features against the target column; the
//! selector drops degenerate columns first, applies the configured cutoff
//! and keeps the target out of its own candidate pool.

mod boruta;
mod correlation;
mod forest;
mod lasso;
mod mutual_info;

pub use boruta::BorutaRanker;
pub use correlation::CorrelationRanker;
pub use forest::ForestImportanceRanker;
pub use lasso::LassoRanker;
pub use mutual_info::MutualInfoRanker;

use crate::config::{RankMethod, SelectionConfig, SelectionCutoff};
use crate::domain::errors::PipelineError;
use crate::domain::table::TimeSeriesTable;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Candidate features in column-major layout, plus the target vector.
///
/// Zero-variance columns are removed before this is built; rankers can
/// assume every column varies and every value is finite.
#[derive(Debug, Clone)]
pub struct CandidateMatrix {
    pub names: Vec<String>,
    /// One vector per feature, all of equal length.
    pub columns: Vec<Vec<f64>>,
    pub target: Vec<f64>,
}

impl CandidateMatrix {
    pub fn n_rows(&self) -> usize {
        self.target.len()
    }

    pub fn n_features(&self) -> usize {
        self.names.len()
    }

    /// Row-major copy, as the smartcore matrix constructors expect.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.n_rows())
            .map(|i| self.columns.iter().map(|c| c[i]).collect())
            .collect()
    }
}

/// Score for one feature under one ranking method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureScore {
    pub feature: String,
    pub score: f64,
    /// Spread across folds/trials, where the method has one.
    pub std_dev: Option<f64>,
}

/// A capability: rank candidate features against the target.
pub trait FeatureRanker {
    fn name(&self) -> &'static str;

    /// Returns one score per candidate, in candidate order.
    fn rank(&self, candidates: &CandidateMatrix) -> Result<Vec<FeatureScore>, PipelineError>;
}

/// Ordered subset of features that passed the cutoff. The target column is
/// always carried alongside, never as a candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedFeatureSet {
    pub features: Vec<String>,
    pub target: String,
}

/// Full output of one selection run, including diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionOutcome {
    pub selected: SelectedFeatureSet,
    /// Per-method raw scores, one entry per method that ran.
    pub method_scores: Vec<(String, Vec<FeatureScore>)>,
    /// Max-normalized, method-averaged scores used for the cutoff.
    pub combined: Vec<FeatureScore>,
    /// Columns dropped before scoring for having zero variance.
    pub dropped_zero_variance: Vec<String>,
}

/// Feature selector over a `TimeSeriesTable`.
pub struct FeatureSelector {
    config: SelectionConfig,
}

impl FeatureSelector {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    /// Ranks candidates and applies the configured cutoff.
    ///
    /// Ties preserve original column order; if nothing passes the cutoff an
    /// empty set is returned and a warning logged, never a silent
    /// select-all.
    pub fn select(&self, table: &TimeSeriesTable) -> Result<SelectionOutcome, PipelineError> {
        let (candidates, dropped) = self.build_candidates(table)?;

        let rankers = self.rankers();
        let mut method_scores = Vec::with_capacity(rankers.len());
        for ranker in &rankers {
            let scores = ranker.rank(&candidates)?;
            method_scores.push((ranker.name().to_string(), scores));
        }

        let combined = combine_scores(&candidates.names, &method_scores);

        let selected = apply_cutoff(&combined, self.config.cutoff);
        if selected.is_empty() {
            warn!(
                method = ?self.config.method,
                "no features passed the selection cutoff"
            );
        } else {
            info!(
                selected = selected.len(),
                candidates = candidates.n_features(),
                "feature selection complete"
            );
        }

        Ok(SelectionOutcome {
            selected: SelectedFeatureSet {
                features: selected,
                target: self.config.target.clone(),
            },
            method_scores,
            combined,
            dropped_zero_variance: dropped,
        })
    }

    /// Splits the table into candidates and target, dropping zero-variance
    /// columns and verifying everything is finite.
    fn build_candidates(
        &self,
        table: &TimeSeriesTable,
    ) -> Result<(CandidateMatrix, Vec<String>), PipelineError> {
        if table.is_empty() {
            return Err(PipelineError::input(
                &self.config.target,
                "table is empty",
            ));
        }
        let target = table.column(&self.config.target).map_err(|_| {
            PipelineError::input(&self.config.target, "target column not found")
        })?;
        if target.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::input(
                &self.config.target,
                "target column contains missing or non-finite values",
            ));
        }

        let mut names = Vec::new();
        let mut columns = Vec::new();
        let mut dropped = Vec::new();
        for name in table.column_names() {
            if *name == self.config.target {
                continue;
            }
            let col = table.column(name)?;
            if col.iter().any(|v| !v.is_finite()) {
                return Err(PipelineError::input(
                    name.clone(),
                    "column contains missing or non-finite values",
                ));
            }
            if variance(&col) <= f64::EPSILON {
                dropped.push(name.clone());
                continue;
            }
            names.push(name.clone());
            columns.push(col);
        }

        if !dropped.is_empty() {
            warn!(columns = ?dropped, "dropped zero-variance columns before scoring");
        }

        Ok((
            CandidateMatrix {
                names,
                columns,
                target,
            },
            dropped,
        ))
    }

    fn rankers(&self) -> Vec<Box<dyn FeatureRanker>> {
        let c = &self.config;
        match c.method {
            RankMethod::Correlation => vec![Box::new(CorrelationRanker)],
            RankMethod::MutualInfo => vec![Box::new(MutualInfoRanker)],
            RankMethod::RandomForest => vec![Box::new(ForestImportanceRanker::new(
                c.cv_segments,
                c.n_trees,
                c.max_depth,
                c.seed,
            ))],
            RankMethod::Lasso => vec![Box::new(LassoRanker::new(
                c.lasso_alphas.clone(),
                c.cv_segments,
            ))],
            RankMethod::Boruta => vec![Box::new(BorutaRanker::new(
                c.boruta_trials,
                c.boruta_significance,
                c.n_trees,
                c.max_depth,
                c.seed,
            ))],
            RankMethod::Combined => vec![
                Box::new(CorrelationRanker),
                Box::new(MutualInfoRanker),
                Box::new(ForestImportanceRanker::new(
                    c.cv_segments,
                    c.n_trees,
                    c.max_depth,
                    c.seed,
                )),
                Box::new(LassoRanker::new(c.lasso_alphas.clone(), c.cv_segments)),
            ],
        }
    }
}

/// Normalizes each method's scores to [0, 1] by its max and averages across
/// methods. A method whose scores are all zero contributes zeros unchanged.
pub fn combine_scores(
    names: &[String],
    method_scores: &[(String, Vec<FeatureScore>)],
) -> Vec<FeatureScore> {
    let mut sums = vec![0.0; names.len()];
    for (_, scores) in method_scores {
        let max = scores
            .iter()
            .map(|s| s.score)
            .fold(0.0_f64, f64::max);
        for (i, s) in scores.iter().enumerate() {
            if max > 0.0 {
                sums[i] += s.score / max;
            }
        }
    }
    let n_methods = method_scores.len().max(1) as f64;
    names
        .iter()
        .zip(&sums)
        .map(|(name, sum)| FeatureScore {
            feature: name.clone(),
            score: sum / n_methods,
            std_dev: None,
        })
        .collect()
}

/// Applies a threshold or top-K cutoff. Output is ordered by descending
/// score; equal scores keep their original column order (stable sort).
fn apply_cutoff(combined: &[FeatureScore], cutoff: SelectionCutoff) -> Vec<String> {
    let mut order: Vec<usize> = (0..combined.len()).collect();
    order.sort_by(|&a, &b| {
        combined[b]
            .score
            .partial_cmp(&combined[a].score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    match cutoff {
        SelectionCutoff::Threshold(t) => order
            .into_iter()
            .filter(|&i| combined[i].score > t)
            .map(|i| combined[i].feature.clone())
            .collect(),
        SelectionCutoff::TopK(k) => order
            .into_iter()
            .take(k)
            .map(|i| combined[i].feature.clone())
            .collect(),
    }
}

pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

pub(crate) fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
        / (values.len() as f64 - 1.0);
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectionConfig;
    use crate::domain::table::TimeSeriesTable;

    fn table_with_constant_column() -> TimeSeriesTable {
        let mut csv = String::from("Date,BTC/USD,VIX,Gold\n");
        for day in 0..100 {
            let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                + chrono::Days::new(day);
            csv.push_str(&format!(
                "{},{},20.0,{}\n",
                date.format("%Y-%m-%d"),
                40000.0 + day as f64 * 10.0,
                1900.0 + (day as f64 * 0.7).sin() * 30.0 + day as f64,
            ));
        }
        TimeSeriesTable::from_reader(csv.as_bytes(), "test").unwrap()
    }

    #[test]
    fn test_zero_variance_column_dropped_and_reported() {
        let table = table_with_constant_column();
        let config = SelectionConfig {
            method: crate::config::RankMethod::Correlation,
            cutoff: SelectionCutoff::Threshold(0.1),
            ..Default::default()
        };
        let outcome = FeatureSelector::new(config).select(&table).unwrap();
        assert_eq!(outcome.dropped_zero_variance, vec!["VIX".to_string()]);
        assert!(!outcome.selected.features.contains(&"VIX".to_string()));
    }

    #[test]
    fn test_target_never_a_candidate() {
        let table = table_with_constant_column();
        let config = SelectionConfig {
            method: crate::config::RankMethod::Correlation,
            cutoff: SelectionCutoff::Threshold(-1.0),
            ..Default::default()
        };
        let outcome = FeatureSelector::new(config).select(&table).unwrap();
        for (_, scores) in &outcome.method_scores {
            assert!(scores.iter().all(|s| s.feature != "BTC/USD"));
        }
        assert_eq!(outcome.selected.target, "BTC/USD");
    }

    #[test]
    fn test_threshold_monotonicity() {
        let table = table_with_constant_column();
        let mut sizes = Vec::new();
        for t in [0.0, 0.25, 0.5, 0.75, 0.99] {
            let config = SelectionConfig {
                method: crate::config::RankMethod::Correlation,
                cutoff: SelectionCutoff::Threshold(t),
                ..Default::default()
            };
            let outcome = FeatureSelector::new(config).select(&table).unwrap();
            sizes.push(outcome.selected.features.len());
        }
        assert!(sizes.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_empty_selection_is_not_select_all() {
        let table = table_with_constant_column();
        let config = SelectionConfig {
            method: crate::config::RankMethod::Correlation,
            cutoff: SelectionCutoff::Threshold(2.0), // unreachable
            ..Default::default()
        };
        let outcome = FeatureSelector::new(config).select(&table).unwrap();
        assert!(outcome.selected.features.is_empty());
    }

    #[test]
    fn test_missing_target_is_input_error() {
        let table = table_with_constant_column();
        let config = SelectionConfig {
            target: "ETH/USD".to_string(),
            ..Default::default()
        };
        let err = FeatureSelector::new(config).select(&table).unwrap_err();
        assert!(err.to_string().contains("ETH/USD"));
    }

    #[test]
    fn test_combined_normalization_max_is_one() {
        let names = vec!["a".to_string(), "b".to_string()];
        let scores = vec![
            (
                "m1".to_string(),
                vec![
                    FeatureScore { feature: "a".into(), score: 4.0, std_dev: None },
                    FeatureScore { feature: "b".into(), score: 2.0, std_dev: None },
                ],
            ),
            (
                "m2".to_string(),
                vec![
                    FeatureScore { feature: "a".into(), score: 0.1, std_dev: None },
                    FeatureScore { feature: "b".into(), score: 0.4, std_dev: None },
                ],
            ),
        ];
        let combined = combine_scores(&names, &scores);
        // a: (1.0 + 0.25) / 2, b: (0.5 + 1.0) / 2
        assert!((combined[0].score - 0.625).abs() < 1e-12);
        assert!((combined[1].score - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_cutoff_tie_break_preserves_column_order() {
        let combined = vec![
            FeatureScore { feature: "x".into(), score: 0.5, std_dev: None },
            FeatureScore { feature: "y".into(), score: 0.5, std_dev: None },
            FeatureScore { feature: "z".into(), score: 0.9, std_dev: None },
        ];
        let selected = apply_cutoff(&combined, SelectionCutoff::TopK(3));
        assert_eq!(selected, vec!["z", "x", "y"]);
    }
}
