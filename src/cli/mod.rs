//! Cell Ensemble CLI Module
//!
//! Command-line interface for search, prediction, scoring and registry inspection.

use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::config::{PipelineConfig, DEFAULT_ENSEMBLE_SIZE};
use crate::data::{Dataset, FeatureTable};
use crate::ensemble::PredictionSample;
use crate::pipeline::{PipelineOutcome, SelectionPipeline};
use crate::registry::DeploymentRegistry;
use crate::scoring::{ScoreReport, ScoringEngine};
use crate::search::SearchSpace;
use crate::training::{LinearProbe, TrainableModel};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn report_box(title: &str, report: &ScoreReport) {
    line_box_top();
    line_box_center(&format!("{}", title.white().bold()));
    line_box_sep();
    line_box(&kv("Score      ", &format!("{:.4}", report.score)));
    line_box(&kv("Class 0    ", &format!("{}/{} correct ({:.1}%)", report.a0, report.n0, report.class0_recall() * 100.0)));
    line_box(&kv("Class 1    ", &format!("{}/{} correct ({:.1}%)", report.a1, report.n1, report.class1_recall() * 100.0)));
    line_box_bottom();
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "cell-ensemble")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Nested-CV model selection and majority-vote ensembling for binary cell classification")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the nested search, retrain the top K and register the ensemble
    Search {
        /// Labelled embedding CSV
        #[arg(short, long)]
        data: PathBuf,

        /// Separate validation CSV; a stratified holdout of --data is used otherwise
        #[arg(long)]
        validation: Option<PathBuf>,

        /// Pipeline configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Registry directory to write the ensemble to
        #[arg(short, long)]
        output: PathBuf,

        /// Override the configured seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the configured trials per outer fold
        #[arg(long)]
        trials: Option<usize>,

        #[arg(long, default_value = "id")]
        id_column: String,

        #[arg(long, default_value = "label")]
        label_column: String,
    },

    /// Predict with a registered ensemble
    Predict {
        /// Registry directory written by `search`
        #[arg(short, long)]
        registry: PathBuf,

        /// Embedding CSV; a label column, if present, is used for scoring
        #[arg(short, long)]
        data: PathBuf,

        /// Output predictions CSV
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of models the ensemble must contain
        #[arg(short, long, default_value_t = DEFAULT_ENSEMBLE_SIZE)]
        k: usize,

        #[arg(long, default_value = "id")]
        id_column: String,

        #[arg(long, default_value = "label")]
        label_column: String,
    },

    /// Score predicted labels against ground truth
    Score {
        /// CSV holding both columns
        #[arg(short, long)]
        data: PathBuf,

        /// Ground-truth column
        #[arg(long)]
        truth: String,

        /// Prediction column
        #[arg(long)]
        pred: String,
    },

    /// Show the ensemble held by a registry
    Inspect {
        #[arg(short, long)]
        registry: PathBuf,
    },
}

// ─── Data loading ──────────────────────────────────────────────────────────────

pub fn load_data(path: &Path) -> anyhow::Result<DataFrame> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let df = match ext {
        "csv" => CsvReadOptions::default()
            .with_infer_schema_length(Some(1000))
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?,
        _ => anyhow::bail!("Unsupported file format: {}", ext),
    };

    Ok(df)
}

fn binary_column(df: &DataFrame, name: &str) -> anyhow::Result<Vec<u8>> {
    let series = df.column(name)?.as_materialized_series().cast(&DataType::Float64)?;
    series
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(i, v)| match v {
            Some(v) if v == 0.0 => Ok(0u8),
            Some(v) if v == 1.0 => Ok(1u8),
            other => Err(anyhow::anyhow!("row {}: column '{}' holds {:?}, expected 0 or 1", i, name, other)),
        })
        .collect()
}

fn write_predictions(path: &Path, samples: &[PredictionSample], k: usize) -> anyhow::Result<()> {
    let mut columns: Vec<Column> = Vec::with_capacity(2 * k + 2);
    columns.push(Column::new("id".into(), samples.iter().map(|s| s.id.clone()).collect::<Vec<String>>()));
    for m in 0..k {
        let probs: Vec<f64> = samples.iter().map(|s| s.probabilities[m]).collect();
        columns.push(Column::new(format!("p_{}", m + 1).into(), probs));
    }
    for m in 0..k {
        let decisions: Vec<u32> = samples.iter().map(|s| u32::from(s.decisions[m])).collect();
        columns.push(Column::new(format!("d_{}", m + 1).into(), decisions));
    }
    let labels: Vec<u32> = samples.iter().map(|s| u32::from(s.label)).collect();
    columns.push(Column::new("label".into(), labels));

    let mut df = DataFrame::new(columns)?;
    let mut file = std::fs::File::create(path)?;
    CsvWriter::new(&mut file).finish(&mut df)?;
    Ok(())
}

fn print_leaderboard(outcome: &PipelineOutcome) {
    section("Leaderboard");
    println!(
        "  {:<5} {:<36} {:>8} {:>8} {:>4}",
        muted("Rank"), muted("Configuration"), muted("Inner"), muted("Valid"), muted("Seen")
    );
    println!("  {}", dim(&"─".repeat(66)));
    for entry in &outcome.leaderboard {
        let label: String = entry.label.chars().take(36).collect();
        println!(
            "  {:<5} {:<36} {:>8.4} {:>8.4} {:>4}",
            entry.rank, label, entry.inner_score, entry.validation.score, entry.appearances
        );
    }
    println!("  {}", dim(&"─".repeat(66)));

    if let Some(top) = outcome.top_model() {
        println!();
        println!("  {} {} {} {:.4}", ok("top"), top.label.white().bold(), muted("validation:"), top.validation.score);
    }
    if let Some(estimate) = outcome.search.nested_estimate() {
        println!("  {} {:.4}", muted("nested-CV estimate:"), estimate);
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

/// Load the search configuration, defaulting to the linear-probe space, and
/// refuse model kinds the backend cannot train before any data is read
pub fn search_config(config_path: Option<&Path>, backend: &dyn TrainableModel) -> anyhow::Result<PipelineConfig> {
    let config = match config_path {
        Some(p) => PipelineConfig::from_json_file(p)?,
        None => PipelineConfig::default().with_search_space(SearchSpace::linear_probe()),
    };
    let unsupported: Vec<String> = config
        .search_space
        .model_kinds
        .iter()
        .filter(|kind| !backend.supports(**kind))
        .map(|kind| kind.to_string())
        .collect();
    if !unsupported.is_empty() {
        anyhow::bail!(
            "backend {} cannot train model kinds [{}]; restrict search_space.model_kinds",
            backend.name(),
            unsupported.join(", ")
        );
    }
    Ok(config)
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_search(
    data_path: &Path,
    validation_path: Option<&Path>,
    config_path: Option<&Path>,
    output: &Path,
    seed: Option<u64>,
    trials: Option<usize>,
    id_column: &str,
    label_column: &str,
) -> anyhow::Result<()> {
    section("Search");

    let backend = Arc::new(LinearProbe::new());
    let mut config = search_config(config_path, backend.as_ref())?;
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }
    if let Some(trials) = trials {
        config = config.with_trials_per_fold(trials);
    }

    step_run("Loading data");
    let start = Instant::now();
    let data = Dataset::from_csv(data_path, id_column, label_column)?;
    let (n0, n1) = data.class_counts();
    step_done(&format!("{} rows × {} features (n0={}, n1={}) in {:?}", data.len(), data.n_features(), n0, n1, start.elapsed()));

    let validation = match validation_path {
        Some(p) => Some(Dataset::from_csv(p, id_column, label_column)?),
        None => None,
    };

    println!();
    line_box_top();
    line_box(&kv("Outer folds   ", &config.outer_folds.to_string()));
    line_box(&kv("Inner folds   ", &config.inner_folds.to_string()));
    line_box(&kv("Trials/fold   ", &config.trials_per_fold.to_string()));
    line_box(&kv("Ensemble size ", &config.ensemble_size.to_string()));
    line_box(&kv("Threshold     ", &format!("{:.2}", config.decision_threshold)));
    line_box(&kv("Seed          ", &config.seed.to_string()));
    line_box_bottom();
    println!();

    let pipeline = SelectionPipeline::new(backend, config);

    step_run("Running nested search and retraining");
    let outcome = match &validation {
        Some(v) => pipeline.run(&data, v)?,
        None => pipeline.run_with_holdout(&data)?,
    };
    step_done(&format!(
        "{} trials, {} candidates in {:.1}s",
        outcome.search.trials_run,
        outcome.search.candidates.len(),
        outcome.duration_secs
    ));

    print_leaderboard(&outcome);

    let mut registry = DeploymentRegistry::open(output)?;
    let keys = pipeline.register(&outcome, &mut registry)?;
    println!();
    step_ok(&format!("{} models registered → {}", keys.len(), output.display()));
    println!();

    Ok(())
}

pub fn cmd_predict(
    registry_path: &Path,
    data_path: &Path,
    output: Option<&Path>,
    k: usize,
    id_column: &str,
    label_column: &str,
) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading ensemble");
    let registry = DeploymentRegistry::open(registry_path)?;
    let ensemble = registry.load_ensemble(&LinearProbe::new(), k)?;
    step_done(&format!("{} models, threshold {:.2}", ensemble.len(), ensemble.threshold()));

    step_run("Loading data");
    let table = FeatureTable::from_csv(data_path, id_column, Some(label_column))?;
    step_done(&format!("{} rows × {} features", table.ids.len(), table.features.ncols()));

    step_run("Predicting");
    let start = Instant::now();
    let samples = ensemble.predict(&table.ids, &table.features)?;
    let positives = samples.iter().filter(|s| s.label == 1).count();
    step_done(&format!("{} class 1 / {} class 0 in {:?}", positives, samples.len() - positives, start.elapsed()));

    if let Some(labels) = &table.labels {
        let predicted: Vec<u8> = samples.iter().map(|s| s.label).collect();
        let report = ScoringEngine::new().score(&labels.to_vec(), &predicted)?;
        println!();
        report_box("Ensemble score", &report);
    }

    match output {
        Some(path) => {
            write_predictions(path, &samples, ensemble.len())?;
            step_ok(&format!("Predictions written → {}", path.display()));
        }
        None => {
            println!();
            for s in samples.iter().take(10) {
                let probs: Vec<String> = s.probabilities.iter().map(|p| format!("{:.3}", p)).collect();
                println!("  {:<16} {} {}", s.id, dim(&probs.join(" ")), s.label.to_string().white().bold());
            }
            if samples.len() > 10 {
                println!("  {}", dim(&format!("… {} more", samples.len() - 10)));
            }
        }
    }

    println!();
    Ok(())
}

pub fn cmd_score(data_path: &Path, truth: &str, pred: &str) -> anyhow::Result<()> {
    section("Score");

    let df = load_data(data_path)?;
    let y_true = binary_column(&df, truth)?;
    let y_pred = binary_column(&df, pred)?;
    let report = ScoringEngine::new().score(&y_true, &y_pred)?;

    println!();
    report_box("Joint-label score", &report);
    println!();
    Ok(())
}

pub fn cmd_inspect(registry_path: &Path) -> anyhow::Result<()> {
    section("Registry");

    let registry = DeploymentRegistry::open(registry_path)?;
    let index = registry.index();

    println!("  {:<12} {}", muted("Root"), registry.root().display());
    println!("  {:<12} {}", muted("Models"), index.ensemble_size);
    println!("  {:<12} {:.2}", muted("Threshold"), index.decision_threshold);
    if let Some(at) = index.updated_at {
        println!("  {:<12} {}", muted("Updated"), at.to_rfc3339());
    }
    println!();

    println!("  {:<5} {:<34} {:>8} {:>8}", muted("Rank"), muted("Key"), muted("Valid"), muted("Stage"));
    println!("  {}", dim(&"─".repeat(58)));
    for record in registry.records()? {
        println!(
            "  {:<5} {:<34} {:>8.4} {:>8}",
            record.rank, record.key, record.validation.score, record.stage.to_string()
        );
    }

    println!();
    Ok(())
}
