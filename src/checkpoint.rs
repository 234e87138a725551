//! Checkpoint index space
//!
//! An experiment is a set of trials; each trial trains the same incremental
//! model on the same stream and saves one checkpoint per step. Location `i`
//! names the i-th checkpoint of every trial, so all trials must list the
//! same number of checkpoints.
//!
//! ```text
//! experiment/
//! ├── trial1/   ckpt-1  ckpt-2  ...  ckpt-N
//! ├── trial2/   ckpt-1  ckpt-2  ...  ckpt-N
//! └── trial3/   ckpt-1  ckpt-2  ...  ckpt-N
//!               loc 0   loc 1        loc N-1
//! ```

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Error, Result};

/// Position of a checkpoint in the training sequence.
pub type Location = usize;

/// Checkpoint names listed by one trial, in training order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialListing {
    /// Trial name (directory name for on-disk experiments)
    pub trial: String,
    /// Trial directory, if the trial lives on disk
    pub path: Option<PathBuf>,
    /// Checkpoint names in training order
    pub checkpoints: Vec<String>,
}

impl TrialListing {
    /// Create an in-memory listing. Checkpoints are kept in the given order.
    #[must_use]
    pub fn new(trial: impl Into<String>, checkpoints: Vec<String>) -> Self {
        Self {
            trial: trial.into(),
            path: None,
            checkpoints,
        }
    }
}

/// Anything that can enumerate the trials of an experiment.
pub trait CheckpointSource {
    /// Experiment name used in logs and errors.
    fn experiment(&self) -> &str;

    /// List every trial with its checkpoints in training order.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing cannot be produced.
    fn list_trials(&self) -> Result<Vec<TrialListing>>;
}

/// Validated, ordered index of an experiment's checkpoints.
#[derive(Debug, Clone)]
pub struct CheckpointIndex {
    experiment: String,
    names: Vec<String>,
    trials: Vec<TrialListing>,
}

impl CheckpointIndex {
    /// Build the index from per-trial listings.
    ///
    /// The first trial's ordering defines the Location -> name mapping.
    ///
    /// # Errors
    ///
    /// - [`Error::NoCheckpoints`] if there are no trials or no checkpoints
    /// - [`Error::CheckpointCountMismatch`] if trials list different counts
    pub fn from_trials(experiment: impl Into<String>, trials: Vec<TrialListing>) -> Result<Self> {
        let experiment = experiment.into();

        let Some(first) = trials.first() else {
            return Err(Error::NoCheckpoints(experiment));
        };
        let expected = first.checkpoints.len();
        if expected == 0 {
            return Err(Error::NoCheckpoints(experiment));
        }

        for listing in &trials[1..] {
            if listing.checkpoints.len() != expected {
                return Err(Error::CheckpointCountMismatch {
                    trial: listing.trial.clone(),
                    expected,
                    found: listing.checkpoints.len(),
                });
            }
        }

        debug!(
            experiment = %experiment,
            trials = trials.len(),
            checkpoints = expected,
            "Checkpoint index built"
        );

        Ok(Self {
            experiment,
            names: first.checkpoints.clone(),
            trials,
        })
    }

    /// Single-trial index of `n` checkpoints named by their location.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCheckpoints`] when `n == 0`.
    pub fn with_len(experiment: impl Into<String>, n: usize) -> Result<Self> {
        let names = (0..n).map(|i| i.to_string()).collect();
        Self::from_trials(experiment, vec![TrialListing::new("trial1", names)])
    }

    /// Build the index from a source.
    ///
    /// # Errors
    ///
    /// Propagates listing and validation errors.
    pub fn from_source<S: CheckpointSource + ?Sized>(source: &S) -> Result<Self> {
        Self::from_trials(source.experiment(), source.list_trials()?)
    }

    /// Experiment name.
    #[must_use]
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Number of checkpoints N.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false for a validated index.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Location of the final checkpoint, N-1.
    #[must_use]
    pub fn last(&self) -> Location {
        self.names.len() - 1
    }

    /// Checkpoint name at a location.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LocationOutOfRange`] for locations >= N.
    pub fn name(&self, location: Location) -> Result<&str> {
        self.names
            .get(location)
            .map(String::as_str)
            .ok_or(Error::LocationOutOfRange {
                location,
                len: self.names.len(),
            })
    }

    /// All checkpoint names in location order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Trials the index was built from.
    #[must_use]
    pub fn trials(&self) -> &[TrialListing] {
        &self.trials
    }
}

/// Trials stored as directories next to each other.
///
/// Every sub-directory of `root` whose name starts with `trial_prefix` is a
/// trial; every regular file inside it is a checkpoint, ordered with
/// [`natural_cmp`]. Files containing `.temp` are partial writes and skipped.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    experiment: String,
    trial_prefix: String,
    extension: Option<String>,
}

impl DirectorySource {
    /// Scan `root` with the default `trial` prefix.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let experiment = root
            .file_name()
            .map_or_else(|| root.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self {
            root,
            experiment,
            trial_prefix: "trial".to_string(),
            extension: None,
        }
    }

    /// Set the trial directory prefix.
    #[must_use]
    pub fn trial_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.trial_prefix = prefix.into();
        self
    }

    /// Only list checkpoints with this extension (without the dot).
    #[must_use]
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Experiment root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_checkpoint(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if name.contains(".temp") {
            return false;
        }
        match &self.extension {
            Some(ext) => path.extension().and_then(|e| e.to_str()) == Some(ext.as_str()),
            None => true,
        }
    }
}

impl CheckpointSource for DirectorySource {
    fn experiment(&self) -> &str {
        &self.experiment
    }

    fn list_trials(&self) -> Result<Vec<TrialListing>> {
        if !self.root.is_dir() {
            return Err(Error::MissingMetadata(format!(
                "experiment directory '{}' does not exist",
                self.root.display()
            )));
        }

        let mut trial_dirs: Vec<(String, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_dir() && name.starts_with(&self.trial_prefix) {
                trial_dirs.push((name, entry.path()));
            }
        }
        trial_dirs.sort_by(|a, b| natural_cmp(&a.0, &b.0));

        let mut listings = Vec::with_capacity(trial_dirs.len());
        for (trial, path) in trial_dirs {
            let mut checkpoints = Vec::new();
            for entry in std::fs::read_dir(&path)? {
                let entry = entry?;
                if entry.file_type()?.is_file() && self.is_checkpoint(&entry.path()) {
                    checkpoints.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
            checkpoints.sort_by(|a, b| natural_cmp(a, b));
            listings.push(TrialListing {
                trial,
                path: Some(path),
                checkpoints,
            });
        }

        Ok(listings)
    }
}

/// Version-aware string ordering: digit runs compare numerically.
///
/// `ckpt-2` sorts before `ckpt-10`. Equal numeric values with different
/// zero padding fall back to comparing the padding length.
///
/// # Example
///
/// ```rust
/// use checkpoint_sampler::checkpoint::natural_cmp;
///
/// let mut names = vec!["m10.bin", "m2.bin", "m1.bin"];
/// names.sort_by(|a, b| natural_cmp(a, b));
/// assert_eq!(names, vec!["m1.bin", "m2.bin", "m10.bin"]);
/// ```
#[must_use]
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            let start_a = i;
            while i < a.len() && a[i].is_ascii_digit() {
                i += 1;
            }
            let start_b = j;
            while j < b.len() && b[j].is_ascii_digit() {
                j += 1;
            }
            let run_a = &a[start_a..i];
            let run_b = &b[start_b..j];
            let trimmed_a = trim_leading_zeros(run_a);
            let trimmed_b = trim_leading_zeros(run_b);

            let ord = trimmed_a
                .len()
                .cmp(&trimmed_b.len())
                .then_with(|| trimmed_a.cmp(trimmed_b))
                .then_with(|| run_a.len().cmp(&run_b.len()));
            if ord != Ordering::Equal {
                return ord;
            }
        } else {
            let ord = a[i].cmp(&b[j]);
            if ord != Ordering::Equal {
                return ord;
            }
            i += 1;
            j += 1;
        }
    }

    (a.len() - i).cmp(&(b.len() - j))
}

fn trim_leading_zeros(digits: &[u8]) -> &[u8] {
    let first = digits.iter().position(|&d| d != b'0').unwrap_or(digits.len());
    &digits[first..]
}
