//! Error types for checkpoint-sampler
//!
//! Every fatal error aborts the selection run before any output is written.
//! Messages name the offending location, checkpoint or trial so the failing
//! artifact can be found without re-running.

use thiserror::Error;

use crate::checkpoint::Location;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// checkpoint-sampler error types
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration rejected before evaluation started
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Experiment has no checkpoints to evaluate
    #[error("No checkpoints found for experiment '{0}'")]
    NoCheckpoints(String),

    /// Trials of the same experiment list a different number of checkpoints
    #[error("Checkpoint count mismatch in trial '{trial}': found {found} checkpoints, expected {expected}")]
    CheckpointCountMismatch {
        /// Offending trial
        trial: String,
        /// Checkpoint count of the reference (first) trial
        expected: usize,
        /// Checkpoint count of the offending trial
        found: usize,
    },

    /// Required metadata (trial directory, dataset path, ...) is missing
    #[error("Missing metadata: {0}")]
    MissingMetadata(String),

    /// Location outside the checkpoint index space
    #[error("Location {location} out of range (experiment has {len} checkpoints)")]
    LocationOutOfRange {
        /// Requested location
        location: Location,
        /// Number of checkpoints
        len: usize,
    },

    /// Evaluator failed for a location; wraps the underlying cause
    #[error("Evaluation failed at location {location} ({checkpoint}): {source}")]
    Evaluator {
        /// Location being evaluated
        location: Location,
        /// Checkpoint name at that location
        checkpoint: String,
        /// Underlying evaluator error
        #[source]
        source: Box<Error>,
    },

    /// Predicted and expected label counts differ
    #[error("Label count mismatch: {expected} expected labels, {predicted} predictions")]
    LabelCountMismatch {
        /// Number of ground-truth labels
        expected: usize,
        /// Number of predictions
        predicted: usize,
    },

    /// Checkpoint artifact is missing
    #[error("Missing artifact for checkpoint '{checkpoint}' in trial '{trial}'")]
    MissingArtifact {
        /// Trial that should hold the artifact
        trial: String,
        /// Checkpoint name
        checkpoint: String,
    },

    /// Trials returned different numbers of results, or none at all
    #[error("Trial count mismatch: expected {expected} trial results, got {found}")]
    TrialCountMismatch {
        /// Expected number of trial results
        expected: usize,
        /// Number actually produced
        found: usize,
    },

    /// External evaluator process exited unsuccessfully
    #[error("Evaluator command failed for checkpoint '{checkpoint}' in trial '{trial}': {reason}")]
    CommandFailed {
        /// Trial directory
        trial: String,
        /// Checkpoint name
        checkpoint: String,
        /// Exit status and stderr excerpt
        reason: String,
    },

    /// Evaluator produced output that is not a valid evaluation
    #[error("Malformed evaluation: {0}")]
    MalformedEvaluation(String),

    /// Persisted points file could not be parsed
    #[error("Malformed points record at line {line}: {reason}")]
    MalformedRecord {
        /// 1-based line number
        line: usize,
        /// What was wrong
        reason: String,
    },

    /// Run aborted between evaluator calls
    #[error("Selection cancelled after {evaluated} evaluations")]
    Cancelled {
        /// Evaluator calls completed before cancellation
        evaluated: usize,
    },

    /// Columnar output could not be read back
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

impl Error {
    /// Whether the error was raised before any evaluation could start.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_)
                | Self::NoCheckpoints(_)
                | Self::CheckpointCountMismatch { .. }
                | Self::MissingMetadata(_)
        )
    }
}
