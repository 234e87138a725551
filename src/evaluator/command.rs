//! External-process evaluator
//!
//! Model loading, archive extraction and inference stay in whatever tooling
//! trained the models. For every checkpoint the sampler runs
//!
//! ```text
//! <program> <args...> <trial_dir> <checkpoint_name>
//! ```
//!
//! and reads one JSON object from stdout:
//!
//! ```text
//! {"train": [correct, abstained, incorrect], "test": [correct, abstained, incorrect]}
//! ```
//!
//! Either split may instead carry raw labels, scored by the sampler:
//!
//! ```text
//! {"expected": ["a", "b", ""], "predicted": ["a", null, "b"]}   single label, null abstains
//! {"expected": ["a", "b"], "inferred": [["a", "c"], []]}         set-valued inference
//! ```

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::debug;

use crate::checkpoint::{Location, TrialListing};
use crate::metrics::{Evaluation, Metrics};
use crate::{Error, Result};

use super::Evaluator;

#[derive(Deserialize)]
struct CommandOutput {
    train: SplitOutput,
    test: SplitOutput,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SplitOutput {
    Ratios([f64; 3]),
    Labels {
        expected: Vec<String>,
        predicted: Vec<Option<String>>,
    },
    LabelSets {
        expected: Vec<String>,
        inferred: Vec<Vec<String>>,
    },
}

impl SplitOutput {
    fn into_metrics(self) -> Result<Metrics> {
        match self {
            Self::Ratios(ratios) => Ok(Metrics::from(ratios)),
            Self::Labels {
                expected,
                predicted,
            } => Metrics::score_labels(&expected, &predicted),
            Self::LabelSets { expected, inferred } => {
                Metrics::score_label_sets(&expected, &inferred)
            }
        }
    }
}

/// Evaluates checkpoints of one trial by running an external program.
#[derive(Debug, Clone)]
pub struct CommandEvaluator {
    program: PathBuf,
    args: Vec<String>,
    trial: String,
    trial_dir: PathBuf,
    checkpoints: Vec<String>,
}

impl CommandEvaluator {
    /// Evaluator for the trial stored in `trial_dir`.
    #[must_use]
    pub fn new(
        program: impl Into<PathBuf>,
        trial: impl Into<String>,
        trial_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            trial: trial.into(),
            trial_dir: trial_dir.into(),
            checkpoints: Vec::new(),
        }
    }

    /// Evaluator for an on-disk trial listing.
    ///
    /// The program receives this trial's own checkpoint name at each
    /// location, which may differ from the experiment-wide name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingMetadata`] if the listing has no directory.
    pub fn for_trial(program: impl Into<PathBuf>, listing: &TrialListing) -> Result<Self> {
        let dir = listing.path.clone().ok_or_else(|| {
            Error::MissingMetadata(format!("trial '{}' has no directory", listing.trial))
        })?;
        let mut evaluator = Self::new(program, listing.trial.clone(), dir);
        evaluator.checkpoints.clone_from(&listing.checkpoints);
        Ok(evaluator)
    }

    /// Extra arguments passed before the trial directory.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Trial name.
    #[must_use]
    pub fn trial(&self) -> &str {
        &self.trial
    }

    /// Trial directory.
    #[must_use]
    pub fn trial_dir(&self) -> &Path {
        &self.trial_dir
    }

    fn command_failed(&self, checkpoint: &str, reason: impl Into<String>) -> Error {
        Error::CommandFailed {
            trial: self.trial.clone(),
            checkpoint: checkpoint.to_string(),
            reason: reason.into(),
        }
    }
}

impl Evaluator for CommandEvaluator {
    fn evaluate(&mut self, location: Location, checkpoint: &str) -> Result<Evaluation> {
        let checkpoint = self
            .checkpoints
            .get(location)
            .map_or(checkpoint, String::as_str);
        debug!(
            trial = %self.trial,
            location,
            checkpoint,
            program = %self.program.display(),
            "Running evaluator command"
        );

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&self.trial_dir)
            .arg(checkpoint)
            .output()
            .map_err(|e| self.command_failed(checkpoint, format!("failed to spawn: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().last().unwrap_or("").trim();
            return Err(self.command_failed(
                checkpoint,
                format!("exited with {}: {last_line}", output.status),
            ));
        }

        let parsed: CommandOutput = serde_json::from_slice(&output.stdout).map_err(|e| {
            Error::MalformedEvaluation(format!(
                "trial '{}', checkpoint '{checkpoint}': {e}",
                self.trial
            ))
        })?;

        Ok(Evaluation::new(
            parsed.train.into_metrics()?,
            parsed.test.into_metrics()?,
        ))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_parses_stdout_json() {
        let mut evaluator = CommandEvaluator::new("sh", "trial1", "/tmp").args([
            "-c",
            r#"echo '{"train": [0.9, 0.0, 0.1], "test": [0.6, 0.2, 0.2]}'"#,
        ]);
        let eval = evaluator.evaluate(2, "ckpt-2").unwrap();
        assert!((eval.train.correct - 0.9).abs() < f64::EPSILON);
        assert!((eval.test.abstained - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_scores_raw_labels() {
        let mut evaluator = CommandEvaluator::new("sh", "trial1", "/tmp").args([
            "-c",
            r#"echo '{"train": {"expected": ["a", "b", "", "a"], "predicted": ["a", null, "b", "b"]},
                      "test": {"expected": ["a", "b"], "inferred": [["a", "c"], []]}}'"#,
        ]);
        let eval = evaluator.evaluate(3, "ckpt-3").unwrap();
        assert!((eval.train.correct - 1.0 / 3.0).abs() < 1e-12);
        assert!((eval.train.abstained - 1.0 / 3.0).abs() < 1e-12);
        assert!((eval.test.correct - 0.5).abs() < 1e-12);
        assert!((eval.test.abstained - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_label_count_mismatch_is_fatal() {
        let mut evaluator = CommandEvaluator::new("sh", "trial1", "/tmp").args([
            "-c",
            r#"echo '{"train": {"expected": ["a"], "predicted": []}, "test": [1, 0, 0]}'"#,
        ]);
        assert!(matches!(
            evaluator.evaluate(1, "ckpt-1"),
            Err(Error::LabelCountMismatch {
                expected: 1,
                predicted: 0
            })
        ));
    }

    #[test]
    fn test_receives_trial_dir_and_checkpoint() {
        // $0 is the trial dir, $1 the checkpoint name under `sh -c`
        let mut evaluator = CommandEvaluator::new("sh", "trial1", "/tmp").args([
            "-c",
            r#"[ "$0" = /tmp ] && [ "$1" = ckpt-9 ] && echo '{"train":[1,0,0],"test":[1,0,0]}'"#,
        ]);
        let eval = evaluator.evaluate(9, "ckpt-9").unwrap();
        assert!((eval.test_accuracy() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_non_zero_exit_names_trial_and_checkpoint() {
        let mut evaluator = CommandEvaluator::new("sh", "trial3", "/tmp")
            .args(["-c", "echo 'label count mismatch' >&2; exit 7"]);
        let err = evaluator.evaluate(1, "ckpt-1").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("trial3"));
        assert!(msg.contains("ckpt-1"));
        assert!(msg.contains("label count mismatch"));
    }

    #[test]
    fn test_malformed_stdout() {
        let mut evaluator =
            CommandEvaluator::new("sh", "trial1", "/tmp").args(["-c", "echo nope"]);
        assert!(matches!(
            evaluator.evaluate(0, "c0"),
            Err(Error::MalformedEvaluation(_))
        ));
    }

    #[test]
    fn test_for_trial_uses_own_checkpoint_names() {
        let listing = TrialListing {
            trial: "trial2".to_string(),
            path: Some(PathBuf::from("/tmp")),
            checkpoints: vec!["t2-a".to_string(), "t2-b".to_string()],
        };
        let mut evaluator = CommandEvaluator::for_trial("sh", &listing).unwrap().args([
            "-c",
            r#"[ "$1" = t2-b ] && echo '{"train":[1,0,0],"test":[0.5,0,0.5]}'"#,
        ]);
        let eval = evaluator.evaluate(1, "t1-b").unwrap();
        assert!((eval.test_accuracy() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_for_trial_requires_directory() {
        let listing = TrialListing::new("trial1", vec!["c0".to_string()]);
        assert!(matches!(
            CommandEvaluator::for_trial("sh", &listing),
            Err(Error::MissingMetadata(_))
        ));
    }
}
