//! Adaptive checkpoint selection
//!
//! Approximates an accuracy-vs-checkpoint curve with at most `budget`
//! evaluations by repeatedly bisecting around the checkpoint that deviates
//! most from a linear guess.
//!
//! ## State machine
//!
//! ```text
//! BOOTSTRAP ──► EXPANDING ──► DONE
//!                 │    ▲
//!                 └────┘  pop, record, bisect both sides
//! ```
//!
//! - **BOOTSTRAP**: evaluate the final checkpoint, build the
//!   [`LinearBaseline`], evaluate the midpoint of `[0, N-1]`; the untrained
//!   checkpoint at location 0 counts as an all-zero measurement.
//! - **EXPANDING**: pop the most divergent pending point, record it, stop
//!   if the budget is reached, otherwise evaluate the midpoints between the
//!   point and each of its parents.
//! - **DONE**: budget reached, or no interval left to bisect.
//!
//! Evaluator errors abort the run; nothing partial is returned.
//!
//! ## Example
//!
//! ```rust
//! use checkpoint_sampler::checkpoint::CheckpointIndex;
//! use checkpoint_sampler::evaluator::TableEvaluator;
//! use checkpoint_sampler::selector::Selector;
//!
//! let index = CheckpointIndex::with_len("demo", 9)?;
//! let curve = [0.0, 0.5, 0.6, 0.65, 0.7, 0.72, 0.75, 0.78, 0.8];
//! let evaluator = TableEvaluator::from_curve(&curve);
//!
//! let selection = Selector::new(&index, evaluator).budget(3).run()?;
//! assert_eq!(selection.locations(), vec![0, 8, 4]);
//! # Ok::<(), checkpoint_sampler::Error>(())
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::baseline::LinearBaseline;
use crate::checkpoint::{CheckpointIndex, Location};
use crate::evaluator::Evaluator;
use crate::frontier::Frontier;
use crate::metrics::Evaluation;
use crate::point::{bisect, Point, PointArena, PointId};
use crate::{Error, Result};

/// Default number of checkpoints to evaluate.
pub const DEFAULT_BUDGET: usize = 50;

/// Smallest budget that still covers both endpoints.
pub const MIN_BUDGET: usize = 2;

/// Shared flag to abort a run between evaluator calls.
///
/// An evaluator call in progress always completes; the run stops before the
/// next one starts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// New, not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a selection run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// The drawn set reached the budget.
    BudgetReached,
    /// Every reachable location was drawn before the budget was reached.
    SearchExhausted,
}

/// Append-only, location-deduplicated record of dequeued points.
#[derive(Debug, Default)]
pub struct DrawnSet {
    order: Vec<PointId>,
    locations: FxHashSet<Location>,
}

impl DrawnSet {
    /// Empty drawn set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a point; returns false if its location was already drawn.
    pub fn record(&mut self, id: PointId, point: &Point) -> bool {
        if !self.locations.insert(point.location()) {
            return false;
        }
        self.order.push(id);
        true
    }

    /// Whether `location` was drawn.
    #[must_use]
    pub fn contains(&self, location: Location) -> bool {
        self.locations.contains(&location)
    }

    /// Number of drawn points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True before bootstrap.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Point ids in dequeue order.
    #[must_use]
    pub fn ids(&self) -> &[PointId] {
        &self.order
    }
}

/// Result of a completed selection run.
#[derive(Debug)]
pub struct Selection {
    experiment: String,
    budget: usize,
    checkpoints: Vec<String>,
    baseline: LinearBaseline,
    arena: PointArena,
    drawn: DrawnSet,
    termination: Termination,
    evaluations: usize,
}

impl Selection {
    /// Experiment the selection was run on.
    #[must_use]
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Budget the run was configured with.
    #[must_use]
    pub const fn budget(&self) -> usize {
        self.budget
    }

    /// Number of checkpoints N.
    #[must_use]
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    /// Checkpoint name at a drawn point's location.
    #[must_use]
    pub fn checkpoint_name(&self, location: Location) -> Option<&str> {
        self.checkpoints.get(location).map(String::as_str)
    }

    /// Linear baseline used for scoring.
    #[must_use]
    pub const fn baseline(&self) -> &LinearBaseline {
        &self.baseline
    }

    /// Why the run stopped.
    #[must_use]
    pub const fn termination(&self) -> Termination {
        self.termination
    }

    /// Evaluator calls made; location 0 is never evaluated.
    #[must_use]
    pub const fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Number of drawn points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.drawn.len()
    }

    /// True if nothing was drawn (never the case for a successful run).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.drawn.is_empty()
    }

    /// Drawn points in dequeue order.
    pub fn points(&self) -> impl Iterator<Item = &Point> + '_ {
        self.drawn.ids().iter().map(|&id| self.arena.get(id))
    }

    /// Drawn locations in dequeue order.
    #[must_use]
    pub fn locations(&self) -> Vec<Location> {
        self.points().map(Point::location).collect()
    }

    /// Drawn points ordered by location, for curve consumers.
    #[must_use]
    pub fn sorted_by_location(&self) -> Vec<&Point> {
        let mut points: Vec<&Point> = self.points().collect();
        points.sort_by_key(|p| p.location());
        points
    }

    /// Every evaluated point, drawn or still pending when the run stopped.
    #[must_use]
    pub const fn arena(&self) -> &PointArena {
        &self.arena
    }
}

/// Configures and runs one selection.
pub struct Selector<'a, E> {
    index: &'a CheckpointIndex,
    evaluator: E,
    budget: usize,
    cancel: Option<CancelFlag>,
}

impl<'a, E: Evaluator> Selector<'a, E> {
    /// Selector over `index` with the default budget.
    pub fn new(index: &'a CheckpointIndex, evaluator: E) -> Self {
        Self {
            index,
            evaluator,
            budget: DEFAULT_BUDGET,
            cancel: None,
        }
    }

    /// Set the evaluation budget (number of drawn points).
    #[must_use]
    pub fn budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    /// Abort between evaluator calls once `flag` is set.
    #[must_use]
    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Run the selection to completion.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] if the budget is below [`MIN_BUDGET`]
    /// - [`Error::Evaluator`] if any evaluator call fails
    /// - [`Error::Cancelled`] if the cancel flag was set
    pub fn run(self) -> Result<Selection> {
        if self.budget < MIN_BUDGET {
            return Err(Error::InvalidConfig(format!(
                "budget must be at least {MIN_BUDGET}, got {}",
                self.budget
            )));
        }

        let mut run = Run {
            index: self.index,
            evaluator: self.evaluator,
            cancel: self.cancel,
            budget: self.budget,
            evaluations: 0,
        };
        run.execute()
    }
}

struct Run<'a, E> {
    index: &'a CheckpointIndex,
    evaluator: E,
    cancel: Option<CancelFlag>,
    budget: usize,
    evaluations: usize,
}

impl<E: Evaluator> Run<'_, E> {
    fn execute(&mut self) -> Result<Selection> {
        let n = self.index.len();
        let last = self.index.last();
        info!(
            experiment = %self.index.experiment(),
            checkpoints = n,
            budget = self.budget,
            "Starting checkpoint selection"
        );

        let mut arena = PointArena::new();
        let mut drawn = DrawnSet::new();
        // each location enters the frontier at most once
        let mut frontier = Frontier::with_capacity(self.budget.min(n));

        // Bootstrap
        let final_eval = self.evaluate(last)?;
        let baseline = LinearBaseline::new(n, final_eval.test_accuracy());

        let end_point = Point::root(
            last,
            baseline.deviation(last, final_eval.test_accuracy()),
            final_eval,
        );
        let roots = if last == 0 {
            vec![arena.insert(end_point)]
        } else {
            let start = arena.insert(Point::root(0, 0.0, Evaluation::ZERO));
            let end = arena.insert(end_point);
            vec![start, end]
        };
        for &id in &roots {
            drawn.record(id, arena.get(id));
            frontier.push(id, arena.get(id));
        }

        if drawn.len() < self.budget {
            if let &[start, end] = roots.as_slice() {
                if let Some(id) = self.expand(&mut arena, &baseline, start, end)? {
                    drawn.record(id, arena.get(id));
                    frontier.push(id, arena.get(id));
                }
            }
        }

        // Expanding
        let termination = loop {
            if drawn.len() >= self.budget {
                break Termination::BudgetReached;
            }
            let Some(id) = frontier.pop() else {
                break Termination::SearchExhausted;
            };

            let point = arena.get(id);
            debug!(
                location = point.location(),
                error = point.error(),
                test_correct = point.test().correct,
                answered_accuracy = ?point.test().accuracy_excluding_abstained(),
                "Chosen point"
            );
            drawn.record(id, point);
            if drawn.len() >= self.budget {
                break Termination::BudgetReached;
            }

            let (left, right) = (point.left_parent(), point.right_parent());
            for (l, r) in [(left, Some(id)), (Some(id), right)] {
                let (Some(l), Some(r)) = (l, r) else {
                    continue;
                };
                if let Some(child) = self.expand(&mut arena, &baseline, l, r)? {
                    frontier.push(child, arena.get(child));
                }
            }
        };

        info!(
            experiment = %self.index.experiment(),
            drawn = drawn.len(),
            evaluations = self.evaluations,
            termination = ?termination,
            "Checkpoint selection finished"
        );

        Ok(Selection {
            experiment: self.index.experiment().to_string(),
            budget: self.budget,
            checkpoints: self.index.names().to_vec(),
            baseline,
            arena,
            drawn,
            termination,
            evaluations: self.evaluations,
        })
    }

    /// Evaluate and store the midpoint of two points, if there is one that
    /// was not evaluated yet.
    fn expand(
        &mut self,
        arena: &mut PointArena,
        baseline: &LinearBaseline,
        left: PointId,
        right: PointId,
    ) -> Result<Option<PointId>> {
        let (l, r) = (arena.get(left).location(), arena.get(right).location());
        let Some(location) = bisect(l, r) else {
            trace!(left = l, right = r, "No room to bisect");
            return Ok(None);
        };
        if arena.contains(location) {
            trace!(location, "Already evaluated");
            return Ok(None);
        }

        let evaluation = self.evaluate(location)?;
        let error = baseline.deviation(location, evaluation.test_accuracy());
        let id = arena.insert(Point::child(location, error, evaluation, left, right));
        Ok(Some(id))
    }

    fn evaluate(&mut self, location: Location) -> Result<Evaluation> {
        if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
            return Err(Error::Cancelled {
                evaluated: self.evaluations,
            });
        }

        let checkpoint = self.index.name(location)?;
        let wrap = |source: Error| Error::Evaluator {
            location,
            checkpoint: checkpoint.to_string(),
            source: Box::new(source),
        };

        let evaluation = self
            .evaluator
            .evaluate(location, checkpoint)
            .map_err(wrap)?;
        self.evaluations += 1;

        let values = [evaluation.train.to_array(), evaluation.test.to_array()];
        if values.iter().flatten().any(|v| !v.is_finite()) {
            return Err(wrap(Error::MalformedEvaluation(format!(
                "non-finite metrics {evaluation:?}"
            ))));
        }

        debug!(
            location,
            checkpoint,
            test_correct = evaluation.test.correct,
            "Evaluated checkpoint"
        );
        Ok(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{FnEvaluator, TableEvaluator};

    fn scenario_curve() -> Vec<f64> {
        vec![0.0, 0.5, 0.6, 0.65, 0.7, 0.72, 0.75, 0.78, 0.8]
    }

    #[test]
    fn test_budget_three_draws_endpoints_and_midpoint() {
        let index = CheckpointIndex::with_len("exp", 9).unwrap();
        let selection = Selector::new(&index, TableEvaluator::from_curve(&scenario_curve()))
            .budget(3)
            .run()
            .unwrap();

        assert_eq!(selection.locations(), vec![0, 8, 4]);
        assert_eq!(selection.termination(), Termination::BudgetReached);
        // 8 and 4 evaluated; 0 is the zero measurement
        assert_eq!(selection.evaluations(), 2);

        let mid = selection.points().nth(2).unwrap();
        assert!((selection.baseline().expected(4) - 0.4).abs() < 1e-12);
        assert!((mid.error() - (-(0.7_f64 - 0.4).abs())).abs() < 1e-12);
    }

    #[test]
    fn test_expands_most_divergent_side() {
        let index = CheckpointIndex::with_len("exp", 9).unwrap();
        let selection = Selector::new(&index, TableEvaluator::from_curve(&scenario_curve()))
            .budget(5)
            .run()
            .unwrap();

        // After 4: candidates 2 (0.6 vs 0.2 -> -0.4) and 6 (0.75 vs 0.6 -> -0.15).
        // 2 wins, then its children 1 (0.5 vs 0.1 -> -0.4) and 3 (0.65 vs 0.3 -> -0.35).
        assert_eq!(selection.locations(), vec![0, 8, 4, 2, 1]);
    }

    #[test]
    fn test_budget_equal_to_n_covers_everything() {
        let index = CheckpointIndex::with_len("exp", 9).unwrap();
        let mut table = TableEvaluator::from_curve(&scenario_curve());
        let selection = Selector::new(&index, &mut table).budget(9).run().unwrap();

        let mut locations = selection.locations();
        locations.sort_unstable();
        assert_eq!(locations, (0..9).collect::<Vec<_>>());
        assert_eq!(table.calls(), 8);
    }

    #[test]
    fn test_budget_larger_than_n_exhausts_cleanly() {
        let index = CheckpointIndex::with_len("exp", 6).unwrap();
        let selection = Selector::new(&index, TableEvaluator::from_curve(&[0.0, 0.1, 0.3, 0.2, 0.5, 0.6]))
            .budget(50)
            .run()
            .unwrap();

        assert_eq!(selection.len(), 6);
        assert_eq!(selection.termination(), Termination::SearchExhausted);
    }

    #[test]
    fn test_budget_two_skips_midpoint() {
        let index = CheckpointIndex::with_len("exp", 9).unwrap();
        let mut table = TableEvaluator::from_curve(&scenario_curve());
        let selection = Selector::new(&index, &mut table).budget(2).run().unwrap();
        assert_eq!(selection.locations(), vec![0, 8]);
        assert_eq!(table.calls(), 1);
    }

    #[test]
    fn test_budget_below_minimum_rejected() {
        let index = CheckpointIndex::with_len("exp", 9).unwrap();
        let mut table = TableEvaluator::from_curve(&scenario_curve());
        let err = Selector::new(&index, &mut table).budget(1).run().unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(table.calls(), 0);
    }

    #[test]
    fn test_single_checkpoint() {
        let index = CheckpointIndex::with_len("exp", 1).unwrap();
        let selection = Selector::new(&index, TableEvaluator::from_curve(&[0.9]))
            .run()
            .unwrap();
        assert_eq!(selection.locations(), vec![0]);
        assert!((selection.points().next().unwrap().test().correct - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_two_checkpoints() {
        let index = CheckpointIndex::with_len("exp", 2).unwrap();
        let selection = Selector::new(&index, TableEvaluator::from_curve(&[0.0, 0.4]))
            .run()
            .unwrap();
        assert_eq!(selection.locations(), vec![0, 1]);
        assert_eq!(selection.termination(), Termination::SearchExhausted);
    }

    #[test]
    fn test_evaluator_failure_aborts_with_location() {
        let index = CheckpointIndex::with_len("exp", 9).unwrap();
        let evaluator = FnEvaluator::new(|location: Location, _: &str| {
            if location == 8 {
                Err(Error::LabelCountMismatch {
                    expected: 10,
                    predicted: 9,
                })
            } else {
                Ok(Evaluation::ZERO)
            }
        });
        let err = Selector::new(&index, evaluator).run().unwrap_err();
        match err {
            Error::Evaluator {
                location, source, ..
            } => {
                assert_eq!(location, 8);
                assert!(matches!(*source, Error::LabelCountMismatch { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_finite_metrics_rejected() {
        let index = CheckpointIndex::with_len("exp", 3).unwrap();
        let evaluator = FnEvaluator::new(|_: Location, _: &str| {
            let m = crate::metrics::Metrics::new(f64::NAN, 0.0, 0.0);
            Ok(Evaluation::new(m, m))
        });
        let err = Selector::new(&index, evaluator).run().unwrap_err();
        assert!(err.to_string().contains("location 2"));
    }

    #[test]
    fn test_cancel_before_first_call() {
        let index = CheckpointIndex::with_len("exp", 9).unwrap();
        let flag = CancelFlag::new();
        flag.cancel();
        let err = Selector::new(&index, TableEvaluator::from_curve(&scenario_curve()))
            .cancel_flag(flag)
            .run()
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { evaluated: 0 }));
    }

    #[test]
    fn test_cancel_between_calls() {
        let index = CheckpointIndex::with_len("exp", 9).unwrap();
        let flag = CancelFlag::new();
        let trigger = flag.clone();
        let curve = scenario_curve();
        let evaluator = FnEvaluator::new(move |location: Location, _: &str| {
            // Cancel during the first call; it still completes
            trigger.cancel();
            let acc = curve[location];
            let m = crate::metrics::Metrics::new(acc, 0.0, 1.0 - acc);
            Ok(Evaluation::new(m, m))
        });
        let err = Selector::new(&index, evaluator)
            .cancel_flag(flag)
            .run()
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { evaluated: 1 }));
    }

    #[test]
    fn test_sorted_by_location() {
        let index = CheckpointIndex::with_len("exp", 9).unwrap();
        let selection = Selector::new(&index, TableEvaluator::from_curve(&scenario_curve()))
            .budget(5)
            .run()
            .unwrap();
        let sorted: Vec<_> = selection
            .sorted_by_location()
            .iter()
            .map(|p| p.location())
            .collect();
        assert_eq!(sorted, vec![0, 1, 2, 4, 8]);
        assert_eq!(selection.checkpoint_name(4), Some("4"));
    }
}
