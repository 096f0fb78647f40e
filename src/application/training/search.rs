//! Hyperparameter search over a declared parameter space.
//!
//! All three strategies minimize the objective (validation RMSE). The
//! Bayesian strategy is a Parzen-estimator scheme: after a few random
//! startup trials it splits the history into good and bad halves at the
//! median and picks the candidate with the best good/bad density ratio.

use crate::config::SearchStrategy;
use crate::domain::errors::PipelineError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

pub type ParamSet = BTreeMap<String, f64>;

fn default_steps() -> usize {
    4
}

/// One tunable parameter: a closed numeric range, optionally snapped to
/// integers, with `steps` grid points for grid search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamRange {
    pub name: String,
    pub min: f64,
    pub max: f64,
    #[serde(default = "default_steps")]
    pub steps: usize,
    #[serde(default)]
    pub integer: bool,
}

impl ParamRange {
    fn snap(&self, value: f64) -> f64 {
        let clamped = value.clamp(self.min, self.max);
        if self.integer {
            clamped.round()
        } else {
            clamped
        }
    }

    fn grid_value(&self, idx: usize) -> f64 {
        let steps = self.steps.max(1);
        let value = if steps == 1 {
            self.min
        } else {
            self.min + (self.max - self.min) * idx as f64 / (steps - 1) as f64
        };
        self.snap(value)
    }
}

/// Declared search space; loadable from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchSpace {
    pub params: Vec<ParamRange>,
}

impl SearchSpace {
    pub fn from_toml_path(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&text)
            .map_err(|e| PipelineError::fit(format!("invalid search space TOML: {}", e)))
    }

    /// Full cartesian product of every parameter's grid points.
    pub fn grid(&self) -> Vec<ParamSet> {
        let mut combos: Vec<ParamSet> = vec![ParamSet::new()];
        for range in &self.params {
            let mut next = Vec::new();
            for combo in &combos {
                for idx in 0..range.steps.max(1) {
                    let mut c = combo.clone();
                    c.insert(range.name.clone(), range.grid_value(idx));
                    next.push(c);
                }
            }
            combos = next;
        }
        combos
    }

    fn sample(&self, rng: &mut StdRng) -> ParamSet {
        self.params
            .iter()
            .map(|r| (r.name.clone(), r.snap(rng.random_range(r.min..=r.max))))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    pub params: ParamSet,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub best_params: ParamSet,
    pub best_score: f64,
    pub trials: Vec<TrialRecord>,
}

/// Runs the chosen strategy, minimizing `objective`.
pub fn run_search(
    strategy: SearchStrategy,
    space: &SearchSpace,
    n_trials: usize,
    seed: u64,
    mut objective: impl FnMut(&ParamSet) -> Result<f64, PipelineError>,
) -> Result<SearchOutcome, PipelineError> {
    let candidates: Vec<ParamSet> = match strategy {
        SearchStrategy::Grid => space.grid(),
        SearchStrategy::Random => {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..n_trials).map(|_| space.sample(&mut rng)).collect()
        }
        SearchStrategy::Bayesian => {
            return bayesian_search(space, n_trials, seed, objective);
        }
    };

    let mut trials = Vec::with_capacity(candidates.len());
    for params in candidates {
        let score = objective(&params)?;
        debug!(?params, score, "search trial");
        trials.push(TrialRecord { params, score });
    }
    finish(trials)
}

/// Parzen-style Bayesian search: random startup trials, then candidates
/// scored by the density ratio between good and bad past trials.
fn bayesian_search(
    space: &SearchSpace,
    n_trials: usize,
    seed: u64,
    mut objective: impl FnMut(&ParamSet) -> Result<f64, PipelineError>,
) -> Result<SearchOutcome, PipelineError> {
    const CANDIDATE_POOL: usize = 24;
    let startup = (n_trials / 3).clamp(3, 10).min(n_trials);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut trials: Vec<TrialRecord> = Vec::with_capacity(n_trials);

    for trial_idx in 0..n_trials {
        let params = if trial_idx < startup {
            space.sample(&mut rng)
        } else {
            let mut sorted: Vec<&TrialRecord> = trials.iter().collect();
            sorted.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
            let n_good = (sorted.len() / 4).max(1);
            let good = &sorted[..n_good];
            let bad = &sorted[n_good..];

            let mut best: Option<(f64, ParamSet)> = None;
            for _ in 0..CANDIDATE_POOL {
                let candidate = space.sample(&mut rng);
                let ratio = density(space, good, &candidate)
                    / (density(space, bad, &candidate) + 1e-12);
                if best.as_ref().map(|(r, _)| ratio > *r).unwrap_or(true) {
                    best = Some((ratio, candidate));
                }
            }
            best.expect("candidate pool is non-empty").1
        };

        let score = objective(&params)?;
        debug!(?params, score, trial = trial_idx, "bayesian trial");
        trials.push(TrialRecord { params, score });
    }
    finish(trials)
}

/// Gaussian-kernel density of `candidate` under a set of past trials.
fn density(space: &SearchSpace, observations: &[&TrialRecord], candidate: &ParamSet) -> f64 {
    if observations.is_empty() {
        return 1e-12;
    }
    observations
        .iter()
        .map(|obs| {
            space
                .params
                .iter()
                .map(|r| {
                    let bw = ((r.max - r.min) / 4.0).max(1e-9);
                    let d = (candidate[&r.name] - obs.params[&r.name]) / bw;
                    (-0.5 * d * d).exp()
                })
                .product::<f64>()
        })
        .sum::<f64>()
        / observations.len() as f64
}

fn finish(trials: Vec<TrialRecord>) -> Result<SearchOutcome, PipelineError> {
    let best = trials
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)
        .ok_or_else(|| PipelineError::fit("hyperparameter search produced no trials"))?;

    info!(
        best_score = trials[best].score,
        trials = trials.len(),
        "hyperparameter search complete"
    );
    Ok(SearchOutcome {
        best_params: trials[best].params.clone(),
        best_score: trials[best].score,
        trials,
    })
}
