//! Checkpoint evaluators
//!
//! The selector never loads models itself. It asks an [`Evaluator`] for the
//! train/test metrics of one checkpoint at a time, synchronously, and treats
//! every error as fatal for the run.
//!
//! | Evaluator            | Use                                                 |
//! |----------------------|-----------------------------------------------------|
//! | [`FnEvaluator`]      | Closures, tests, in-process inference               |
//! | [`TableEvaluator`]   | Replay of precomputed metrics from a JSON file      |
//! | [`CommandEvaluator`] | External program per trial (archive + inference)    |
//! | [`TrialMean`]        | Mean over several per-trial evaluators              |
//!
//! # Example
//!
//! ```rust
//! use checkpoint_sampler::evaluator::{Evaluator, FnEvaluator};
//! use checkpoint_sampler::metrics::{Evaluation, Metrics};
//!
//! let mut evaluator = FnEvaluator::new(|location: usize, _checkpoint: &str| {
//!     let acc = (location as f64 / 10.0).min(1.0);
//!     let m = Metrics::new(acc, 0.0, 1.0 - acc);
//!     Ok(Evaluation::new(m, m))
//! });
//!
//! let eval = evaluator.evaluate(5, "ckpt-5")?;
//! assert!((eval.test_accuracy() - 0.5).abs() < 1e-12);
//! # Ok::<(), checkpoint_sampler::Error>(())
//! ```

mod command;
mod table;

pub use command::CommandEvaluator;
pub use table::{TableEntry, TableEvaluator};

use crate::checkpoint::Location;
use crate::metrics::Evaluation;
use crate::{Error, Result};

/// Measures the train/test performance of one checkpoint.
pub trait Evaluator {
    /// Evaluate the checkpoint at `location`, named `checkpoint`.
    ///
    /// Implementations should be deterministic for a fixed location.
    ///
    /// # Errors
    ///
    /// Any error aborts the selection run.
    fn evaluate(&mut self, location: Location, checkpoint: &str) -> Result<Evaluation>;
}

impl<E: Evaluator + ?Sized> Evaluator for &mut E {
    fn evaluate(&mut self, location: Location, checkpoint: &str) -> Result<Evaluation> {
        (**self).evaluate(location, checkpoint)
    }
}

impl<E: Evaluator + ?Sized> Evaluator for Box<E> {
    fn evaluate(&mut self, location: Location, checkpoint: &str) -> Result<Evaluation> {
        (**self).evaluate(location, checkpoint)
    }
}

/// Evaluator backed by a closure.
pub struct FnEvaluator<F> {
    f: F,
}

impl<F> FnEvaluator<F>
where
    F: FnMut(Location, &str) -> Result<Evaluation>,
{
    /// Wrap a closure.
    pub const fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Evaluator for FnEvaluator<F>
where
    F: FnMut(Location, &str) -> Result<Evaluation>,
{
    fn evaluate(&mut self, location: Location, checkpoint: &str) -> Result<Evaluation> {
        (self.f)(location, checkpoint)
    }
}

/// Mean of several per-trial evaluators.
///
/// Every trial is evaluated for every location; the first failing trial
/// aborts the evaluation.
pub struct TrialMean<E> {
    trials: Vec<E>,
}

impl<E: Evaluator> TrialMean<E> {
    /// Average over `trials`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrialCountMismatch`] when `trials` is empty.
    pub fn new(trials: Vec<E>) -> Result<Self> {
        if trials.is_empty() {
            return Err(Error::TrialCountMismatch {
                expected: 1,
                found: 0,
            });
        }
        Ok(Self { trials })
    }

    /// Number of trials averaged.
    #[must_use]
    pub fn trial_count(&self) -> usize {
        self.trials.len()
    }
}

impl<E: Evaluator> Evaluator for TrialMean<E> {
    fn evaluate(&mut self, location: Location, checkpoint: &str) -> Result<Evaluation> {
        let results = self
            .trials
            .iter_mut()
            .map(|trial| trial.evaluate(location, checkpoint))
            .collect::<Result<Vec<_>>>()?;

        Evaluation::mean(&results)
    }
}
