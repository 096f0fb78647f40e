use anyhow::Context;
use clap::{Parser, Subcommand};
use cryptocast::application::cleaning::{validate_file, CleaningReport};
use cryptocast::application::combining::combine;
use cryptocast::application::reporting::PipelineReporter;
use cryptocast::application::selection::{FeatureSelector, SelectedFeatureSet};
use cryptocast::application::training::search::SearchSpace;
use cryptocast::application::training::Trainer;
use cryptocast::config::{
    ModelFamily, RankMethod, SearchStrategy, SelectionConfig, SelectionCutoff, TrainingConfig,
};
use cryptocast::domain::table::TimeSeriesTable;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "Daily BTC price forecasting pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and clean raw source CSVs
    Validate {
        /// Raw CSV files to validate
        files: Vec<PathBuf>,

        /// Directory for cleaned copies (skipped when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Merge cleaned sources into one date-aligned table
    Combine {
        /// Cleaned CSV files; column names get the file stem as prefix
        files: Vec<PathBuf>,

        /// Output path for the combined CSV
        #[arg(short, long, default_value = "combined.csv")]
        out: PathBuf,
    },
    /// Rank candidate features and apply the selection cutoff
    Select {
        /// Combined CSV produced by `combine`
        input: PathBuf,

        /// Target column name
        #[arg(short, long, default_value = "BTC/USD")]
        target: String,

        /// Ranking method: correlation, mutual_info, random_forest, lasso, boruta, combined
        #[arg(short, long, default_value = "combined")]
        method: String,

        /// Keep features whose combined score exceeds this value
        #[arg(long)]
        threshold: Option<f64>,

        /// Keep the k best features instead of using a threshold
        #[arg(long)]
        top_k: Option<usize>,

        /// Output directory for score reports
        #[arg(short, long, default_value = "results")]
        out: PathBuf,

        #[arg(long, default_value = "42")]
        seed: u64,
    },
    /// Train a model on selected features and evaluate on the test split
    Train {
        /// Combined CSV produced by `combine`
        input: PathBuf,

        /// Target column name
        #[arg(short, long, default_value = "BTC/USD")]
        target: String,

        /// Comma-separated feature columns to train on
        #[arg(short, long)]
        features: String,

        /// Model family: random_forest or sequence_model
        #[arg(long, default_value = "random_forest")]
        family: String,

        /// Forecast horizon in days
        #[arg(long, default_value = "1")]
        horizon: usize,

        /// Search strategy: grid, random or bayesian
        #[arg(long, default_value = "grid")]
        search: String,

        /// Number of search trials (0 disables the search)
        #[arg(long, default_value = "25")]
        trials: usize,

        /// TOML file overriding the built-in search space
        #[arg(long)]
        search_space: Option<PathBuf>,

        /// Output directory for the model and evaluation report
        #[arg(short, long, default_value = "results")]
        out: PathBuf,

        #[arg(long, default_value = "42")]
        seed: u64,
    },
    /// Full pipeline: validate, combine, select, train, evaluate
    Run {
        /// Raw CSV files
        files: Vec<PathBuf>,

        /// Target column name after combining (e.g. "btc_BTC/USD")
        #[arg(short, long)]
        target: String,

        #[arg(short, long, default_value = "combined")]
        method: String,

        #[arg(long)]
        threshold: Option<f64>,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long, default_value = "random_forest")]
        family: String,

        #[arg(long, default_value = "1")]
        horizon: usize,

        #[arg(long, default_value = "grid")]
        search: String,

        #[arg(long, default_value = "25")]
        trials: usize,

        #[arg(short, long, default_value = "results")]
        out: PathBuf,

        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cli = Cli::parse();
    match cli.command {
        Commands::Validate { files, out } => cmd_validate(&files, out.as_deref()),
        Commands::Combine { files, out } => cmd_combine(&files, &out),
        Commands::Select {
            input,
            target,
            method,
            threshold,
            top_k,
            out,
            seed,
        } => cmd_select(&input, target, &method, threshold, top_k, &out, seed).map(|_| ()),
        Commands::Train {
            input,
            target,
            features,
            family,
            horizon,
            search,
            trials,
            search_space,
            out,
            seed,
        } => {
            let table = TimeSeriesTable::from_csv_path(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let selected = SelectedFeatureSet {
                features: features
                    .split(',')
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect(),
                target,
            };
            cmd_train(
                &table,
                selected,
                &family,
                horizon,
                &search,
                trials,
                search_space.as_deref(),
                &out,
                seed,
            )
        }
        Commands::Run {
            files,
            target,
            method,
            threshold,
            top_k,
            family,
            horizon,
            search,
            trials,
            out,
            seed,
        } => {
            let (table, reports) = clean_and_combine(&files)?;
            let combined_path = out.join("combined.csv");
            std::fs::create_dir_all(&out)?;
            PipelineReporter::new(&out)?.print_cleaning(&reports);
            table.write_csv(&combined_path)?;
            info!(path = %combined_path.display(), "combined table written");

            let selected = cmd_select(
                &combined_path,
                target,
                &method,
                threshold,
                top_k,
                &out,
                seed,
            )?;
            if selected.features.is_empty() {
                anyhow::bail!("no features passed the selection cutoff; nothing to train on");
            }
            cmd_train(
                &table, selected, &family, horizon, &search, trials, None, &out, seed,
            )
        }
    }
}

fn cmd_validate(files: &[PathBuf], out: Option<&Path>) -> anyhow::Result<()> {
    anyhow::ensure!(!files.is_empty(), "no input files given");
    let reporter = PipelineReporter::new(out.unwrap_or(Path::new(".")))?;
    let mut reports = Vec::new();
    for file in files {
        let (table, report) = validate_file(file)
            .with_context(|| format!("validating {}", file.display()))?;
        if let Some(dir) = out {
            let name = source_name(file);
            let path = dir.join(format!("{}_clean.csv", name));
            table.write_csv(&path)?;
            info!(path = %path.display(), "cleaned copy written");
        }
        reports.push(report);
    }
    reporter.print_cleaning(&reports);
    Ok(())
}

fn cmd_combine(files: &[PathBuf], out: &Path) -> anyhow::Result<()> {
    let (table, _) = clean_and_combine(files)?;
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    table.write_csv(out)?;
    println!(
        "✅ Combined {} sources into {} rows x {} columns: {}",
        files.len(),
        table.n_rows(),
        table.n_cols(),
        out.display()
    );
    Ok(())
}

fn cmd_select(
    input: &Path,
    target: String,
    method: &str,
    threshold: Option<f64>,
    top_k: Option<usize>,
    out: &Path,
    seed: u64,
) -> anyhow::Result<SelectedFeatureSet> {
    let table = TimeSeriesTable::from_csv_path(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let config = SelectionConfig {
        target,
        method: RankMethod::from_str(method)?,
        cutoff: cutoff(threshold, top_k)?,
        seed,
        ..SelectionConfig::default()
    };

    let outcome = FeatureSelector::new(config).select(&table)?;
    let reporter = PipelineReporter::new(out)?;
    reporter.print_selection(&outcome);
    reporter.save_selection(&outcome)?;
    Ok(outcome.selected)
}

#[allow(clippy::too_many_arguments)]
fn cmd_train(
    table: &TimeSeriesTable,
    selected: SelectedFeatureSet,
    family: &str,
    horizon: usize,
    search: &str,
    trials: usize,
    search_space: Option<&Path>,
    out: &Path,
    seed: u64,
) -> anyhow::Result<()> {
    let config = TrainingConfig {
        target: selected.target.clone(),
        family: ModelFamily::from_str(family)?,
        horizon,
        search: SearchStrategy::from_str(search)?,
        search_trials: trials,
        seed,
        ..TrainingConfig::default()
    };

    let mut trainer = Trainer::new(config);
    if let Some(path) = search_space {
        trainer = trainer.with_search_space(SearchSpace::from_toml_path(path)?);
    }
    let outcome = trainer.train_and_evaluate(table, &selected)?;

    let reporter = PipelineReporter::new(out)?;
    reporter.print_training(&outcome);
    reporter.save_training(&outcome)?;
    reporter.save_model(&outcome)?;
    Ok(())
}

/// Validates every file and merges the cleaned tables, prefixing columns
/// with each file's stem.
fn clean_and_combine(
    files: &[PathBuf],
) -> anyhow::Result<(TimeSeriesTable, Vec<CleaningReport>)> {
    anyhow::ensure!(!files.is_empty(), "no input files given");
    let mut sources = Vec::with_capacity(files.len());
    let mut reports = Vec::with_capacity(files.len());
    for file in files {
        let (table, report) = validate_file(file)
            .with_context(|| format!("validating {}", file.display()))?;
        sources.push((source_name(file), table));
        reports.push(report);
    }
    let combined = combine(&sources)?;
    Ok((combined, reports))
}

fn source_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "source".to_string())
}

fn cutoff(threshold: Option<f64>, top_k: Option<usize>) -> anyhow::Result<SelectionCutoff> {
    match (threshold, top_k) {
        (Some(_), Some(_)) => anyhow::bail!("--threshold and --top-k are mutually exclusive"),
        (None, Some(k)) => Ok(SelectionCutoff::TopK(k)),
        (Some(t), None) => Ok(SelectionCutoff::Threshold(t)),
        (None, None) => Ok(SelectionCutoff::Threshold(0.3)),
    }
}
