pub mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::Rng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use voxreg_core::sweep::SUMMARY_FILE;
use voxreg_core::{
    DataConfig, ExperimentParams, NpyStoryLoader, ResultsSummary, Sweep, SyntheticConfig, SyntheticDataset,
};

use crate::config::{discover_stories, AppConfig};

#[derive(Parser)]
#[command(name = "voxreg")]
#[command(about = "Cross-validated ridge encoding models for story-listening fMRI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sweep over predictors, subjects, train sizes and shuffle states
    Run {
        #[command(flatten)]
        params: ExperimentParams,
        /// Config file (defaults to ~/.voxreg/config.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write a seeded synthetic dataset and a config pointing at it
    Synth {
        /// Output directory
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long, default_value_t = 6)]
        n_stories: usize,
        #[arg(long, num_args = 1.., default_values_t = vec!["UTS01".to_string(), "UTS02".to_string()])]
        subjects: Vec<String>,
    },
    /// Print the running-max summary of a run
    Summary {
        /// Run folder holding results_max.json
        run_folder: PathBuf,
        /// Also export the summary as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

fn main() {
    // Initialize structured logging
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_max_level(tracing::Level::INFO)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {}", e);
    }

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { params, config } => run_sweep(&params, config.as_deref()),
        Commands::Synth {
            out,
            seed,
            n_stories,
            subjects,
        } => write_synthetic(&out, seed, n_stories, subjects),
        Commands::Summary { run_folder, csv } => show_summary(&run_folder, csv.as_deref()),
    };

    if let Err(e) = result {
        error!(error = %format!("{:#}", e), "Fatal Error");
        std::process::exit(1);
    }
}

/// `YYYYmmdd-HHMMSS-xxxx`, unique enough for one user's runs directory.
fn generate_run_folder_name() -> String {
    let suffix: u16 = rand::thread_rng().gen();
    format!("{}-{:04x}", chrono::Local::now().format("%Y%m%d-%H%M%S"), suffix)
}

fn run_sweep(params: &ExperimentParams, config_path: Option<&Path>) -> Result<()> {
    let mut data = AppConfig::load(config_path)?.data;
    if data.stories.is_empty() {
        data.stories = discover_stories(&data.data_dir)?;
        warn!(count = data.stories.len(), "config lists no stories, using every envelope file found");
    }

    let resolved = params.resolve(&data).context("invalid experiment parameters")?;
    let name = match &params.run_folder_name {
        Some(name) => name.clone(),
        None if resolved.resume_from > 0 => bail!("--resume-from needs --run-folder-name of the run to continue"),
        None => generate_run_folder_name(),
    };
    let run_folder = data.runs_dir.join(name);

    info!(
        run_folder = %run_folder.display(),
        resume_from = resolved.resume_from,
        stories = resolved.stories.len(),
        subjects = ?resolved.subjects,
        "starting run"
    );

    let loader = NpyStoryLoader::new(
        &data.data_dir,
        resolved.n_delays,
        resolved.interpolation,
        resolved.use_cache,
    );
    let summary = Sweep::new(&resolved, &loader, &run_folder)
        .run()
        .with_context(|| format!("sweep into {}", run_folder.display()))?;

    info!(cells = summary.len(), "run complete");
    println!("Results written to {}", run_folder.display());
    Ok(())
}

fn write_synthetic(out: &Path, seed: u64, n_stories: usize, subjects: Vec<String>) -> Result<()> {
    let synth = SyntheticConfig {
        n_stories,
        subjects: subjects.clone(),
        seed,
        ..SyntheticConfig::default()
    };
    let dataset = SyntheticDataset::generate(&synth);
    dataset
        .write(out)
        .with_context(|| format!("writing synthetic dataset to {}", out.display()))?;

    let config = AppConfig {
        data: DataConfig {
            data_dir: out.to_path_buf(),
            runs_dir: out.join("runs"),
            stories: dataset.stories.clone(),
            roster: subjects,
        },
    };
    let config_path = out.join("config.toml");
    config.save(&config_path)?;

    info!(
        out = %out.display(),
        stories = dataset.stories.len(),
        seed = seed,
        "synthetic dataset written"
    );
    println!("Run it with: voxreg run --config {}", config_path.display());
    Ok(())
}

#[derive(Debug, Serialize)]
struct SummaryRow {
    predictor: String,
    subject: String,
    n_train_stories: usize,
    shuffle: String,
    max_mean_score: Option<f64>,
}

fn summary_rows(summary: &ResultsSummary) -> Vec<SummaryRow> {
    summary
        .iter()
        .map(|(key, value)| SummaryRow {
            predictor: key.predictor.to_string(),
            subject: key.subject.clone(),
            n_train_stories: key.n_train_stories,
            shuffle: key.shuffle.to_string(),
            max_mean_score: (!value.is_nan()).then_some(value),
        })
        .collect()
}

fn write_csv(path: &Path, rows: &[SummaryRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn show_summary(run_folder: &Path, csv_path: Option<&Path>) -> Result<()> {
    let summary = ResultsSummary::load(&run_folder.join(SUMMARY_FILE))?;
    let rows = summary_rows(&summary);

    for row in &rows {
        let score = row
            .max_mean_score
            .map(|s| format!("{:.4}", s))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "{:<10} {:<8} {:>4} {:<12} {}",
            row.predictor, row.subject, row.n_train_stories, row.shuffle, score
        );
    }

    if let Some(path) = csv_path {
        write_csv(path, &rows)?;
        info!(path = %path.display(), rows = rows.len(), "summary exported");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxreg_core::{Predictor, ShuffleState, SummaryKey};

    #[test]
    fn test_csv_export() {
        let mut summary = ResultsSummary::new();
        summary.record(
            SummaryKey {
                predictor: Predictor::Envelope,
                subject: "UTS02".into(),
                n_train_stories: 3,
                shuffle: ShuffleState::NotShuffled,
            },
            0.25,
        );
        summary.record(
            SummaryKey {
                predictor: Predictor::Envelope,
                subject: "UTS02".into(),
                n_train_stories: 3,
                shuffle: ShuffleState::Shuffled,
            },
            f64::NAN,
        );

        let path = std::env::temp_dir().join(format!("voxreg_summary_{}.csv", std::process::id()));
        write_csv(&path, &summary_rows(&summary)).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "predictor,subject,n_train_stories,shuffle,max_mean_score");
        assert_eq!(lines[1], "envelope,UTS02,3,not_shuffled,0.25");
        assert_eq!(lines[2], "envelope,UTS02,3,shuffled,");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_run_folder_name_shape() {
        let name = generate_run_folder_name();
        assert_eq!(name.len(), "20260101-120000-abcd".len());
        assert_eq!(name.matches('-').count(), 2);
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "voxreg",
            "run",
            "--cross-validation",
            "simple",
            "--predictor",
            "envelope",
            "--n-train-stories",
            "1",
            "2",
            "--subject",
            "all",
            "--ridge-implementation",
            "ridgeCV",
            "--do-shuffle",
            "--seed",
            "5",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { params, config } => {
                assert_eq!(params.n_train_stories, vec![1, 2]);
                assert_eq!(params.subject, vec!["all".to_string()]);
                assert!(params.do_shuffle);
                assert_eq!(params.seed, Some(5));
                assert_eq!(params.ridge_implementation, voxreg_core::RidgeImplementation::RidgeCv);
                assert!(config.is_none());
            }
            _ => panic!("expected run"),
        }
    }
}
