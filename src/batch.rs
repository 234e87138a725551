//! Batch selection over many experiments
//!
//! Experiments are independent: each gets its own index, evaluator and
//! selection state, and a failure in one never touches another. With the
//! `parallel` feature they run on the rayon pool, otherwise in order.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::checkpoint::{CheckpointIndex, CheckpointSource, DirectorySource};
use crate::config::SamplerConfig;
use crate::evaluator::Evaluator;
use crate::output::write_outputs;
use crate::run::{RunRecord, RunStatus};
use crate::selector::{CancelFlag, Selector};
use crate::{Error, Result};

/// Result of one experiment of a batch.
#[derive(Debug)]
pub struct ExperimentOutcome {
    /// Experiment directory as given
    pub experiment_dir: PathBuf,
    /// Run lifecycle, including the final status
    pub run: RunRecord,
    /// Written output files, or the error that stopped the run
    pub outputs: Result<Vec<PathBuf>>,
}

impl ExperimentOutcome {
    /// Whether the run completed and its outputs were written.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.run.status() == RunStatus::Success && self.outputs.is_ok()
    }
}

/// Run a selection for one experiment directory and write its outputs.
///
/// `make_evaluator` builds the evaluator from the experiment directory and
/// its index, so it can see the trial listings.
pub fn run_experiment<F, E>(
    experiment_dir: &Path,
    config: &SamplerConfig,
    make_evaluator: &F,
    cancel: &CancelFlag,
) -> ExperimentOutcome
where
    F: Fn(&Path, &CheckpointIndex) -> Result<E>,
    E: Evaluator,
{
    let mut source = DirectorySource::new(experiment_dir).trial_prefix(config.trial_prefix.as_str());
    if let Some(ext) = &config.checkpoint_extension {
        source = source.extension(ext.as_str());
    }
    let experiment = source.experiment().to_string();

    let mut run = RunRecord::new(experiment.as_str(), config.budget);
    run.start();

    let outputs = select_and_write(experiment_dir, &source, config, make_evaluator, cancel, &mut run);
    match &outputs {
        Ok(paths) => info!(experiment = %experiment, files = paths.len(), "Experiment done"),
        Err(Error::Cancelled { evaluated }) => {
            warn!(experiment = %experiment, evaluated, "Experiment cancelled");
        }
        Err(e) => error!(experiment = %experiment, error = %e, "Experiment failed"),
    }

    ExperimentOutcome {
        experiment_dir: experiment_dir.to_path_buf(),
        run,
        outputs,
    }
}

fn select_and_write<F, E>(
    experiment_dir: &Path,
    source: &DirectorySource,
    config: &SamplerConfig,
    make_evaluator: &F,
    cancel: &CancelFlag,
    run: &mut RunRecord,
) -> Result<Vec<PathBuf>>
where
    F: Fn(&Path, &CheckpointIndex) -> Result<E>,
    E: Evaluator,
{
    let selection = match CheckpointIndex::from_source(source).and_then(|index| {
        let evaluator = make_evaluator(experiment_dir, &index)?;
        Selector::new(&index, evaluator)
            .budget(config.budget)
            .cancel_flag(cancel.clone())
            .run()
    }) {
        Ok(selection) => selection,
        Err(e) => {
            let status = if matches!(e, Error::Cancelled { .. }) {
                RunStatus::Cancelled
            } else {
                RunStatus::Failed
            };
            run.complete(status);
            return Err(e);
        }
    };

    run.succeed(selection.termination(), selection.evaluations());
    let dir = config.output_dir_for(experiment_dir);
    let written = write_outputs(&dir, &selection, run, &config.output_formats);
    if written.is_err() {
        run.complete(RunStatus::Failed);
    }
    written
}

/// Run every experiment and collect the outcomes in input order.
///
/// Cancelling `cancel` stops every experiment before its next evaluator
/// call; experiments that already finished keep their outputs.
pub fn run_experiments<F, E>(
    experiment_dirs: &[PathBuf],
    config: &SamplerConfig,
    make_evaluator: F,
    cancel: &CancelFlag,
) -> Vec<ExperimentOutcome>
where
    F: Fn(&Path, &CheckpointIndex) -> Result<E> + Sync,
    E: Evaluator,
{
    info!(
        experiments = experiment_dirs.len(),
        budget = config.budget,
        "Starting batch"
    );

    #[cfg(feature = "parallel")]
    let outcomes: Vec<ExperimentOutcome> = {
        use rayon::prelude::*;
        experiment_dirs
            .par_iter()
            .map(|dir| run_experiment(dir, config, &make_evaluator, cancel))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<ExperimentOutcome> = experiment_dirs
        .iter()
        .map(|dir| run_experiment(dir, config, &make_evaluator, cancel))
        .collect();

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    info!(
        succeeded = outcomes.len() - failed,
        failed, "Batch finished"
    );
    outcomes
}
