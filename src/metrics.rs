//! Correct / abstained / incorrect metrics for a single checkpoint
//!
//! Classifiers used in these experiments may abstain, so accuracy alone does
//! not describe a checkpoint. Every evaluation yields a triple of ratios over
//! the scorable (labelled) instances:
//!
//! ```text
//! correct + abstained + incorrect == 1.0   (when at least one label is scorable)
//! ```
//!
//! Repeated trials of the same checkpoint are combined with an arithmetic
//! mean ([`Metrics::mean`], [`Evaluation::mean`]).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{Error, Result};

/// Tolerance used when checking that a triple sums to one.
pub const NORMALIZATION_TOLERANCE: f64 = 1e-6;

/// Correct / abstained / incorrect ratios of one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Fraction of scorable instances predicted correctly
    pub correct: f64,
    /// Fraction of scorable instances with no prediction
    pub abstained: f64,
    /// Fraction of scorable instances predicted wrongly
    pub incorrect: f64,
}

impl Metrics {
    /// All-zero metrics, used for the untrained checkpoint at location 0.
    pub const ZERO: Self = Self {
        correct: 0.0,
        abstained: 0.0,
        incorrect: 0.0,
    };

    /// Create a metrics triple.
    #[must_use]
    pub const fn new(correct: f64, abstained: f64, incorrect: f64) -> Self {
        Self {
            correct,
            abstained,
            incorrect,
        }
    }

    /// Score single-label predictions.
    ///
    /// An empty expected label marks an unlabelled instance and is skipped.
    /// A `None` prediction is an abstention.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LabelCountMismatch`] if the slices differ in length.
    ///
    /// # Example
    ///
    /// ```rust
    /// use checkpoint_sampler::metrics::Metrics;
    ///
    /// let expected = ["a", "b", "", "a"];
    /// let predicted = [Some("a"), None, Some("b"), Some("b")];
    /// let m = Metrics::score_labels(&expected, &predicted)?;
    ///
    /// assert!((m.correct - 1.0 / 3.0).abs() < 1e-12);
    /// assert!((m.abstained - 1.0 / 3.0).abs() < 1e-12);
    /// assert!((m.incorrect - 1.0 / 3.0).abs() < 1e-12);
    /// # Ok::<(), checkpoint_sampler::Error>(())
    /// ```
    pub fn score_labels<E, P>(expected: &[E], predicted: &[Option<P>]) -> Result<Self>
    where
        E: AsRef<str>,
        P: AsRef<str>,
    {
        if expected.len() != predicted.len() {
            return Err(Error::LabelCountMismatch {
                expected: expected.len(),
                predicted: predicted.len(),
            });
        }

        let mut tally = Tally::default();
        for (truth, guess) in expected.iter().zip(predicted) {
            let truth = truth.as_ref();
            if truth.is_empty() {
                continue;
            }
            match guess {
                None => tally.abstained += 1,
                Some(guess) if guess.as_ref() == truth => tally.correct += 1,
                Some(_) => tally.incorrect += 1,
            }
        }

        Ok(tally.ratios())
    }

    /// Score set-valued inferences (rule engines infer any number of labels).
    ///
    /// An instance is correct if its expected label was inferred, incorrect
    /// if some other known label was inferred instead, and abstained
    /// otherwise. Known labels are the non-empty expected labels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LabelCountMismatch`] if the slices differ in length.
    pub fn score_label_sets<E, S>(expected: &[E], inferred: &[Vec<S>]) -> Result<Self>
    where
        E: AsRef<str>,
        S: AsRef<str>,
    {
        if expected.len() != inferred.len() {
            return Err(Error::LabelCountMismatch {
                expected: expected.len(),
                predicted: inferred.len(),
            });
        }

        let known: HashSet<&str> = expected
            .iter()
            .map(|label| label.as_ref())
            .filter(|label| !label.is_empty())
            .collect();

        let mut tally = Tally::default();
        for (truth, labels) in expected.iter().zip(inferred) {
            let truth = truth.as_ref();
            if truth.is_empty() {
                continue;
            }
            if labels.iter().any(|l| l.as_ref() == truth) {
                tally.correct += 1;
            } else if labels.iter().any(|l| known.contains(l.as_ref())) {
                tally.incorrect += 1;
            } else {
                tally.abstained += 1;
            }
        }

        Ok(tally.ratios())
    }

    /// Arithmetic mean of several trials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrialCountMismatch`] when `trials` is empty.
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(trials: &[Self]) -> Result<Self> {
        if trials.is_empty() {
            return Err(Error::TrialCountMismatch {
                expected: 1,
                found: 0,
            });
        }

        let n = trials.len() as f64;
        let sum = trials.iter().fold(Self::ZERO, |acc, m| Self {
            correct: acc.correct + m.correct,
            abstained: acc.abstained + m.abstained,
            incorrect: acc.incorrect + m.incorrect,
        });

        Ok(Self {
            correct: sum.correct / n,
            abstained: sum.abstained / n,
            incorrect: sum.incorrect / n,
        })
    }

    /// Sum of the three ratios.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.correct + self.abstained + self.incorrect
    }

    /// True if every ratio is in `[0, 1]` and they sum to one within `tolerance`.
    #[must_use]
    pub fn is_normalized(&self, tolerance: f64) -> bool {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        in_unit(self.correct)
            && in_unit(self.abstained)
            && in_unit(self.incorrect)
            && (self.total() - 1.0).abs() <= tolerance
    }

    /// Accuracy over the instances where the model did not abstain.
    ///
    /// Returns `None` if the model abstained on everything.
    #[must_use]
    pub fn accuracy_excluding_abstained(&self) -> Option<f64> {
        let answered = self.correct + self.incorrect;
        (answered > 0.0).then(|| self.correct / answered)
    }

    /// The triple as an array, in `[correct, abstained, incorrect]` order.
    #[must_use]
    pub const fn to_array(self) -> [f64; 3] {
        [self.correct, self.abstained, self.incorrect]
    }
}

impl From<[f64; 3]> for Metrics {
    fn from([correct, abstained, incorrect]: [f64; 3]) -> Self {
        Self::new(correct, abstained, incorrect)
    }
}

#[derive(Default)]
struct Tally {
    correct: usize,
    abstained: usize,
    incorrect: usize,
}

impl Tally {
    #[allow(clippy::cast_precision_loss)]
    fn ratios(&self) -> Metrics {
        let scorable = self.correct + self.abstained + self.incorrect;
        if scorable == 0 {
            return Metrics::ZERO;
        }
        let n = scorable as f64;
        Metrics::new(
            self.correct as f64 / n,
            self.abstained as f64 / n,
            self.incorrect as f64 / n,
        )
    }
}

/// Train and test metrics of one checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Metrics on the training stream seen so far
    pub train: Metrics,
    /// Metrics on the held-out test set
    pub test: Metrics,
}

impl Evaluation {
    /// Zero evaluation for the untrained checkpoint.
    pub const ZERO: Self = Self {
        train: Metrics::ZERO,
        test: Metrics::ZERO,
    };

    /// Create an evaluation from train and test metrics.
    #[must_use]
    pub const fn new(train: Metrics, test: Metrics) -> Self {
        Self { train, test }
    }

    /// Mean over trials, train and test averaged independently.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrialCountMismatch`] when `trials` is empty.
    pub fn mean(trials: &[Self]) -> Result<Self> {
        let train: Vec<Metrics> = trials.iter().map(|e| e.train).collect();
        let test: Vec<Metrics> = trials.iter().map(|e| e.test).collect();
        Ok(Self {
            train: Metrics::mean(&train)?,
            test: Metrics::mean(&test)?,
        })
    }

    /// Test accuracy, the value the selector compares against its baseline.
    #[must_use]
    pub const fn test_accuracy(&self) -> f64 {
        self.test.correct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_score_labels_all_correct() {
        let m = Metrics::score_labels(&["x", "y"], &[Some("x"), Some("y")]).unwrap();
        assert!(approx(m.correct, 1.0));
        assert!(approx(m.abstained, 0.0));
        assert!(approx(m.incorrect, 0.0));
        assert!(m.is_normalized(NORMALIZATION_TOLERANCE));
    }

    #[test]
    fn test_score_labels_skips_unlabelled() {
        let m = Metrics::score_labels(&["", "y", ""], &[Some("x"), None, None]).unwrap();
        assert!(approx(m.abstained, 1.0));
        assert!(approx(m.correct, 0.0));
    }

    #[test]
    fn test_score_labels_no_scorable_is_zero() {
        let m = Metrics::score_labels(&["", ""], &[Some("x"), None::<&str>]).unwrap();
        assert_eq!(m, Metrics::ZERO);
    }

    #[test]
    fn test_score_labels_length_mismatch() {
        let err = Metrics::score_labels(&["x"], &[Some("x"), Some("y")]).unwrap_err();
        assert!(matches!(
            err,
            Error::LabelCountMismatch {
                expected: 1,
                predicted: 2
            }
        ));
    }

    #[test]
    fn test_score_label_sets() {
        let expected = ["a", "b", "c", ""];
        let inferred = vec![
            vec!["a", "z"],   // correct
            vec!["c"],        // incorrect: other known label
            vec!["unknown"],  // abstained: nothing known inferred
            vec!["a"],        // unlabelled, skipped
        ];
        let m = Metrics::score_label_sets(&expected, &inferred).unwrap();
        assert!(approx(m.correct, 1.0 / 3.0));
        assert!(approx(m.incorrect, 1.0 / 3.0));
        assert!(approx(m.abstained, 1.0 / 3.0));
    }

    #[test]
    fn test_mean() {
        let m = Metrics::mean(&[Metrics::new(1.0, 0.0, 0.0), Metrics::new(0.5, 0.25, 0.25)])
            .unwrap();
        assert!(approx(m.correct, 0.75));
        assert!(approx(m.abstained, 0.125));
        assert!(approx(m.incorrect, 0.125));
    }

    #[test]
    fn test_mean_empty_fails() {
        assert!(matches!(
            Metrics::mean(&[]),
            Err(Error::TrialCountMismatch { found: 0, .. })
        ));
        assert!(Evaluation::mean(&[]).is_err());
    }

    #[test]
    fn test_accuracy_excluding_abstained() {
        let m = Metrics::new(0.3, 0.4, 0.3);
        assert!(approx(m.accuracy_excluding_abstained().unwrap(), 0.5));
        assert!(Metrics::new(0.0, 1.0, 0.0)
            .accuracy_excluding_abstained()
            .is_none());
    }

    #[test]
    fn test_zero_is_not_normalized() {
        assert!(!Metrics::ZERO.is_normalized(NORMALIZATION_TOLERANCE));
    }
}
