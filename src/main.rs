//! checkpoint-sampler command-line runner.
//!
//! Selects checkpoints for one or more experiment directories, writes the
//! points files next to them (or into `--output-dir`), and exits with code 1
//! if any experiment failed.
//!
//! Usage:
//!   checkpoint-sampler --budget 20 --evaluator ./eval.sh runs/exp-a runs/exp-b
//!   checkpoint-sampler --table evaluations.json --format text --format parquet runs/exp-a
//!   RUST_LOG=checkpoint_sampler=debug checkpoint-sampler --config sampler.json runs/*

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{ArgGroup, Parser};
use tracing::info;

use checkpoint_sampler::batch::run_experiments;
use checkpoint_sampler::checkpoint::CheckpointIndex;
use checkpoint_sampler::config::SamplerConfig;
use checkpoint_sampler::evaluator::{CommandEvaluator, Evaluator, TableEvaluator, TrialMean};
use checkpoint_sampler::output::OutputFormat;
use checkpoint_sampler::selector::CancelFlag;

#[derive(Parser)]
#[command(
    name = "checkpoint-sampler",
    version,
    about = "Pick the checkpoints that best approximate an accuracy curve"
)]
#[command(group(ArgGroup::new("source").required(true).args(["evaluator", "table"])))]
struct Cli {
    /// Experiment directories, each holding one sub-directory per trial.
    #[arg(required = true)]
    experiments: Vec<PathBuf>,

    /// JSON config file; flags given on the command line take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of checkpoints to draw per experiment.
    #[arg(long, short)]
    budget: Option<usize>,

    /// Program run as `<program> <args...> <trial_dir> <checkpoint>` that
    /// prints `{"train": [c, a, i], "test": [c, a, i]}`.
    #[arg(long)]
    evaluator: Option<PathBuf>,

    /// Extra argument passed to the evaluator program (repeatable).
    #[arg(long = "evaluator-arg", allow_hyphen_values = true)]
    evaluator_args: Vec<String>,

    /// Precomputed evaluations; a relative path is resolved inside each
    /// experiment directory.
    #[arg(long)]
    table: Option<PathBuf>,

    /// Output format (repeatable).
    #[arg(long = "format", value_enum)]
    formats: Vec<OutputFormat>,

    /// Write outputs to `<DIR>/<experiment>/` instead of the experiment directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Prefix of trial directories.
    #[arg(long)]
    trial_prefix: Option<String>,

    /// Only treat files with this extension as checkpoints.
    #[arg(long)]
    extension: Option<String>,
}

impl Cli {
    fn sampler_config(&self) -> anyhow::Result<SamplerConfig> {
        let mut config = match &self.config {
            Some(path) => SamplerConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => SamplerConfig::default(),
        };

        if let Some(budget) = self.budget {
            config.budget = budget;
        }
        if let Some(prefix) = &self.trial_prefix {
            config.trial_prefix.clone_from(prefix);
        }
        if self.extension.is_some() {
            config.checkpoint_extension.clone_from(&self.extension);
        }
        if !self.formats.is_empty() {
            config.output_formats.clone_from(&self.formats);
        }
        if self.output_dir.is_some() {
            config.output_dir.clone_from(&self.output_dir);
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn build_evaluator(
        &self,
        experiment_dir: &Path,
        index: &CheckpointIndex,
    ) -> checkpoint_sampler::Result<Box<dyn Evaluator>> {
        if let Some(table) = &self.table {
            let path = if table.is_absolute() {
                table.clone()
            } else {
                experiment_dir.join(table)
            };
            return Ok(Box::new(TableEvaluator::from_json_file(path)?));
        }

        let program = self.evaluator.as_deref().ok_or_else(|| {
            checkpoint_sampler::Error::InvalidConfig("no evaluator configured".to_string())
        })?;
        let trials = index
            .trials()
            .iter()
            .map(|listing| {
                CommandEvaluator::for_trial(program, listing)
                    .map(|e| e.args(self.evaluator_args.iter().cloned()))
            })
            .collect::<checkpoint_sampler::Result<Vec<_>>>()?;
        Ok(Box::new(TrialMean::new(trials)?))
    }
}

fn run(cli: &Cli) -> anyhow::Result<bool> {
    let config = cli.sampler_config()?;
    info!(
        experiments = cli.experiments.len(),
        budget = config.budget,
        formats = ?config.output_formats,
        "Configuration loaded"
    );

    let outcomes = run_experiments(
        &cli.experiments,
        &config,
        |dir: &Path, index: &CheckpointIndex| cli.build_evaluator(dir, index),
        &CancelFlag::new(),
    );

    let mut all_ok = true;
    for outcome in &outcomes {
        match &outcome.outputs {
            Ok(paths) => {
                for path in paths {
                    println!("{}: wrote {}", outcome.run.experiment(), path.display());
                }
            }
            Err(e) => {
                all_ok = false;
                eprintln!("{}: {e}", outcome.experiment_dir.display());
            }
        }
    }
    Ok(all_ok)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
