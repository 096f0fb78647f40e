//! Console summaries and file artifacts for each pipeline stage.
//!
//! Artifacts are only written after a stage fully succeeds; a failed run
//! leaves no partial outputs behind.

use crate::application::cleaning::CleaningReport;
use crate::application::selection::SelectionOutcome;
use crate::application::training::TrainOutcome;
use crate::domain::errors::PipelineError;
use std::fs;
use std::path::{Path, PathBuf};

pub struct PipelineReporter {
    output_dir: PathBuf,
}

impl PipelineReporter {
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir).map_err(|e| PipelineError::Io {
            path: output_dir.display().to_string(),
            source: e,
        })?;
        Ok(Self { output_dir })
    }

    pub fn print_cleaning(&self, reports: &[CleaningReport]) {
        if reports.is_empty() {
            println!("⚠️ No files validated.");
            return;
        }
        println!("\n{}", "=".repeat(100));
        println!("📊 VALIDATION SUMMARY");
        println!("{}", "=".repeat(100));
        println!(
            "{:<40} | {:>6} | {:>9} | {:>8} | {:>8}",
            "Source", "Rows", "Bad dates", "Dupes", "Coerced"
        );
        println!("{}", "-".repeat(100));
        for r in reports {
            println!(
                "{:<40} | {:>6} | {:>9} | {:>8} | {:>8}",
                truncate(&r.origin, 40),
                r.rows_read,
                r.rows_dropped_invalid_date,
                r.rows_dropped_duplicate_date,
                r.cells_coerced_to_missing,
            );
        }
        println!("{}", "=".repeat(100));
        for r in reports {
            for col in &r.high_missing_columns {
                println!("⚠️  {}: column '{}' is more than 10% missing", r.origin, col);
            }
        }
    }

    pub fn print_selection(&self, outcome: &SelectionOutcome) {
        println!("\n{}", "=".repeat(80));
        println!("🏆 FEATURE SELECTION");
        println!("{}", "=".repeat(80));
        println!("{:<40} | {:>10} | {:>8}", "Feature", "Combined", "Kept");
        println!("{}", "-".repeat(80));
        for score in &outcome.combined {
            let kept = outcome.selected.features.contains(&score.feature);
            println!(
                "{:<40} | {:>10.4} | {:>8}",
                truncate(&score.feature, 40),
                score.score,
                if kept { "yes" } else { "" },
            );
        }
        println!("{}", "=".repeat(80));
        if outcome.selected.features.is_empty() {
            println!("⚠️  No feature passed the cutoff.");
        } else {
            println!(
                "✅ Selected {} of {} candidates.",
                outcome.selected.features.len(),
                outcome.combined.len()
            );
        }
    }

    /// Writes the per-method and combined scores as one CSV row per
    /// candidate.
    pub fn save_selection(&self, outcome: &SelectionOutcome) -> Result<PathBuf, PipelineError> {
        let path = self.output_dir.join("feature_scores.csv");
        let mut wtr = csv::Writer::from_path(&path).map_err(|e| PipelineError::Csv {
            path: path.display().to_string(),
            source: e,
        })?;

        let mut header = vec!["feature".to_string()];
        for (method, _) in &outcome.method_scores {
            header.push(method.clone());
        }
        header.push("combined".to_string());
        header.push("selected".to_string());
        wtr.write_record(&header).map_err(|e| PipelineError::Csv {
            path: path.display().to_string(),
            source: e,
        })?;

        for (idx, combined) in outcome.combined.iter().enumerate() {
            let mut record = vec![combined.feature.clone()];
            for (_, scores) in &outcome.method_scores {
                record.push(format!("{:.6}", scores[idx].score));
            }
            record.push(format!("{:.6}", combined.score));
            record.push(
                outcome
                    .selected
                    .features
                    .contains(&combined.feature)
                    .to_string(),
            );
            wtr.write_record(&record).map_err(|e| PipelineError::Csv {
                path: path.display().to_string(),
                source: e,
            })?;
        }
        wtr.flush().map_err(|e| PipelineError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        println!("📝 Feature scores saved to: {}", path.display());
        Ok(path)
    }

    pub fn print_training(&self, outcome: &TrainOutcome) {
        let r = &outcome.result;
        println!("\n{}", "=".repeat(80));
        println!("📊 TEST-SET EVALUATION — {}", r.model);
        println!("{}", "=".repeat(80));
        println!("  Features:       {}", r.features.join(", "));
        println!("  Horizon:        {} day(s)", r.horizon);
        println!("  Test rows:      {}", r.n_test);
        println!("  MAE:            {:.4}", r.mae);
        println!("  RMSE:           {:.4}", r.rmse);
        println!("  Dir. accuracy:  {:.2}%", r.directional.accuracy * 100.0);
        println!("  Dir. F1:        {:.4}", r.directional.f1);
        if let Some(search) = &outcome.search {
            println!(
                "  Search:         {} trials, best validation RMSE {:.4}",
                search.trials.len(),
                search.best_score
            );
        }
        println!("{}", "=".repeat(80));
        if !r.converged {
            println!("⚠️  Training stopped before converging; metrics are from the last stable weights.");
        }
    }

    /// Writes the evaluation report (metrics plus search history) as JSON.
    pub fn save_training(&self, outcome: &TrainOutcome) -> Result<PathBuf, PipelineError> {
        let path = self.output_dir.join("evaluation.json");
        let json = serde_json::json!({
            "result": outcome.result,
            "search": outcome.search,
            "epoch_losses": outcome.epoch_losses,
        });
        self.write_json(&path, &json)?;
        println!("📝 Evaluation saved to: {}", path.display());
        Ok(path)
    }

    /// Persists the fitted model as an opaque JSON blob.
    pub fn save_model(&self, outcome: &TrainOutcome) -> Result<PathBuf, PipelineError> {
        let path = self.output_dir.join("model.json");
        self.write_json(&path, &outcome.model_blob)?;
        println!("💾 Model saved to: {}", path.display());
        Ok(path)
    }

    fn write_json(&self, path: &Path, value: &serde_json::Value) -> Result<(), PipelineError> {
        let text = serde_json::to_string_pretty(value)
            .map_err(|e| PipelineError::fit(format!("report serialization: {}", e)))?;
        fs::write(path, text).map_err(|e| PipelineError::Io {
            path: path.display().to_string(),
            source: e,
        })
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{}…", cut)
    }
}
