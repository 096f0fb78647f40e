//! Training runs end-to-end for both model families, and the reporter's
//! artifacts are well-formed.

use chrono::NaiveDate;
use cryptocast::application::reporting::PipelineReporter;
use cryptocast::application::selection::SelectedFeatureSet;
use cryptocast::application::training::Trainer;
use cryptocast::config::{ModelFamily, SearchStrategy, TrainingConfig};
use cryptocast::domain::table::TimeSeriesTable;
use tempfile::TempDir;

fn synthetic_table(n: usize) -> TimeSeriesTable {
    let start = NaiveDate::from_ymd_opt(2021, 6, 1).unwrap();
    let dates: Vec<NaiveDate> = (0..n).map(|i| start + chrono::Days::new(i as u64)).collect();
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let t = i as f64;
            vec![
                (t * 0.04).sin() * 500.0 + 30_000.0 + 2.0 * t,
                (t * 0.04).cos() * 80.0,
                ((t * 0.3).sin() * 7.0).round(),
            ]
        })
        .collect();
    TimeSeriesTable::new(
        dates,
        vec![
            "BTC/USD".to_string(),
            "momentum".to_string(),
            "chatter".to_string(),
        ],
        rows,
    )
    .unwrap()
}

fn selected() -> SelectedFeatureSet {
    SelectedFeatureSet {
        features: vec!["momentum".to_string(), "chatter".to_string()],
        target: "BTC/USD".to_string(),
    }
}

#[test]
fn test_forest_with_bayesian_search() {
    let config = TrainingConfig {
        search: SearchStrategy::Bayesian,
        search_trials: 6,
        n_trees: 15,
        max_depth: 5,
        ..TrainingConfig::default()
    };
    let outcome = Trainer::new(config)
        .train_and_evaluate(&synthetic_table(180), &selected())
        .unwrap();

    let search = outcome.search.expect("search should have run");
    assert_eq!(search.trials.len(), 6);
    // Best params stay inside the declared space.
    let n_trees = search.best_params["n_trees"];
    assert!((50.0..=200.0).contains(&n_trees));
    assert!(outcome.result.converged);
}

#[test]
fn test_sequence_model_trains_and_serializes() {
    let config = TrainingConfig {
        family: ModelFamily::SequenceModel,
        window: 10,
        hidden: 8,
        epochs: 12,
        search_trials: 0,
        ..TrainingConfig::default()
    };
    let outcome = Trainer::new(config)
        .train_and_evaluate(&synthetic_table(220), &selected())
        .unwrap();

    assert_eq!(outcome.result.model, "sequence_model");
    assert_eq!(outcome.epoch_losses.len(), 12);
    assert!(outcome.epoch_losses.iter().all(|l| l.is_finite()));
    // The persisted blob carries every weight tensor.
    for key in ["w_x", "w_h", "b", "w_a", "v_a", "w_out", "scaler"] {
        assert!(outcome.model_blob.get(key).is_some(), "missing {key}");
    }
}

#[test]
fn test_multi_step_horizon() {
    let config = TrainingConfig {
        horizon: 3,
        n_trees: 15,
        max_depth: 5,
        search_trials: 0,
        ..TrainingConfig::default()
    };
    let outcome = Trainer::new(config)
        .train_and_evaluate(&synthetic_table(200), &selected())
        .unwrap();
    assert_eq!(outcome.result.horizon, 3);
    assert!(outcome.result.mae.is_finite());
}

#[test]
fn test_reporter_writes_artifacts() {
    let config = TrainingConfig {
        n_trees: 10,
        max_depth: 4,
        search_trials: 0,
        ..TrainingConfig::default()
    };
    let outcome = Trainer::new(config)
        .train_and_evaluate(&synthetic_table(150), &selected())
        .unwrap();

    let dir = TempDir::new().unwrap();
    let reporter = PipelineReporter::new(dir.path()).unwrap();
    let eval_path = reporter.save_training(&outcome).unwrap();
    let model_path = reporter.save_model(&outcome).unwrap();

    let eval: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(eval_path).unwrap()).unwrap();
    assert!(eval["result"]["rmse"].is_f64());
    assert_eq!(eval["result"]["model"], "random_forest");

    let model: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(model_path).unwrap()).unwrap();
    assert!(!model.is_null());
}

#[test]
fn test_deterministic_given_seed() {
    let config = TrainingConfig {
        n_trees: 12,
        max_depth: 4,
        search_trials: 0,
        seed: 77,
        ..TrainingConfig::default()
    };
    let table = synthetic_table(160);
    let a = Trainer::new(config.clone())
        .train_and_evaluate(&table, &selected())
        .unwrap();
    let b = Trainer::new(config)
        .train_and_evaluate(&table, &selected())
        .unwrap();
    assert_eq!(a.result.rmse, b.result.rmse);
    assert_eq!(a.result.mae, b.result.mae);
}
