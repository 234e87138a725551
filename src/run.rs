//! Run Record - lifecycle of one selection run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::selector::Termination;

/// Status of a selection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run is created but not yet started.
    Pending,
    /// Run is evaluating checkpoints.
    Running,
    /// Run drew its points and the output was written.
    Success,
    /// Run aborted on a configuration or evaluator error.
    Failed,
    /// Run was cancelled between evaluator calls.
    Cancelled,
}

/// Run Record tracks one selection over one experiment.
///
/// It is embedded in the JSON report so that a points file can be traced
/// back to the budget and timing that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    experiment: String,
    budget: usize,
    status: RunStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    termination: Option<Termination>,
    evaluations: usize,
}

impl RunRecord {
    /// Create a new run record in Pending status.
    ///
    /// # Arguments
    ///
    /// * `experiment` - Experiment the selection runs on
    /// * `budget` - Number of points to draw
    #[must_use]
    pub fn new(experiment: impl Into<String>, budget: usize) -> Self {
        Self {
            experiment: experiment.into(),
            budget,
            status: RunStatus::Pending,
            started_at: None,
            ended_at: None,
            termination: None,
            evaluations: 0,
        }
    }

    /// Get the experiment name.
    #[must_use]
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Get the configured budget.
    #[must_use]
    pub const fn budget(&self) -> usize {
        self.budget
    }

    /// Get the current run status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Get the start timestamp, if the run has started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get the end timestamp, if the run has completed.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Why the selection stopped, for successful runs.
    #[must_use]
    pub const fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Evaluator calls made.
    #[must_use]
    pub const fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Wall-clock duration, once the run has ended.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.ended_at? - self.started_at?)
    }

    /// Start the run, transitioning from Pending to Running.
    ///
    /// Sets the `started_at` timestamp to now.
    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark the run successful.
    pub fn succeed(&mut self, termination: Termination, evaluations: usize) {
        self.termination = Some(termination);
        self.evaluations = evaluations;
        self.complete(RunStatus::Success);
    }

    /// Complete the run with the given final status.
    ///
    /// Sets the `ended_at` timestamp to now.
    pub fn complete(&mut self, status: RunStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_default() {
        let run = RunRecord::new("exp-1", 50);
        assert_eq!(run.status(), RunStatus::Pending);
        assert!(run.duration().is_none());
    }

    #[test]
    fn test_run_lifecycle() {
        let mut run = RunRecord::new("exp-1", 50);
        run.start();
        assert_eq!(run.status(), RunStatus::Running);
        run.succeed(Termination::BudgetReached, 49);
        assert_eq!(run.status(), RunStatus::Success);
        assert_eq!(run.termination(), Some(Termination::BudgetReached));
        assert_eq!(run.evaluations(), 49);
        assert!(run.duration().unwrap() >= chrono::Duration::zero());
    }

    #[test]
    fn test_run_failed() {
        let mut run = RunRecord::new("exp-1", 10);
        run.start();
        run.complete(RunStatus::Failed);
        assert_eq!(run.status(), RunStatus::Failed);
        assert!(run.termination().is_none());
    }
}
