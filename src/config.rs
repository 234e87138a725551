//! Sampler configuration
//!
//! Loaded from an optional JSON file, then overridden by command-line flags.
//! Every field has a default, so an empty object is a valid file:
//!
//! ```text
//! {
//!   "budget": 50,
//!   "trial_prefix": "trial",
//!   "checkpoint_extension": "pkl",
//!   "output_formats": ["text", "json"],
//!   "output_dir": "results/"
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::output::OutputFormat;
use crate::selector::{DEFAULT_BUDGET, MIN_BUDGET};
use crate::{Error, Result};

/// Configuration shared by every experiment of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplerConfig {
    /// Number of checkpoints to draw per experiment.
    pub budget: usize,
    /// Prefix of trial directories inside an experiment.
    pub trial_prefix: String,
    /// Only files with this extension are checkpoints.
    pub checkpoint_extension: Option<String>,
    /// Formats written for every successful run.
    pub output_formats: Vec<OutputFormat>,
    /// Output directory; defaults to each experiment's own directory.
    pub output_dir: Option<PathBuf>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            budget: DEFAULT_BUDGET,
            trial_prefix: "trial".to_string(),
            checkpoint_extension: None,
            output_formats: vec![OutputFormat::Text],
            output_dir: None,
        }
    }
}

impl SamplerConfig {
    /// Load from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains unknown or
    /// mistyped fields.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a budget below the minimum, an
    /// empty trial prefix, or no output formats.
    pub fn validate(&self) -> Result<()> {
        if self.budget < MIN_BUDGET {
            return Err(Error::InvalidConfig(format!(
                "budget must be at least {MIN_BUDGET}, got {}",
                self.budget
            )));
        }
        if self.trial_prefix.is_empty() {
            return Err(Error::InvalidConfig("trial_prefix must not be empty".to_string()));
        }
        if self.output_formats.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one output format is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory the outputs of `experiment_dir` are written to.
    #[must_use]
    pub fn output_dir_for(&self, experiment_dir: &Path) -> PathBuf {
        self.output_dir.as_ref().map_or_else(
            || experiment_dir.to_path_buf(),
            |dir| {
                let name = experiment_dir.file_name().unwrap_or_default();
                dir.join(name)
            },
        )
    }
}
