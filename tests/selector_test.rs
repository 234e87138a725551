//! Selection scenarios against known accuracy curves

use checkpoint_sampler::checkpoint::{CheckpointIndex, TrialListing};
use checkpoint_sampler::evaluator::{Evaluator, FnEvaluator, TableEvaluator};
use checkpoint_sampler::metrics::{Evaluation, Metrics};
use checkpoint_sampler::point::bisect;
use checkpoint_sampler::selector::{Selector, Termination};
use checkpoint_sampler::{Error, Result};

/// Evaluator that records every location it was asked for.
struct Recording {
    inner: TableEvaluator,
    seen: Vec<usize>,
}

impl Evaluator for Recording {
    fn evaluate(&mut self, location: usize, checkpoint: &str) -> Result<Evaluation> {
        self.seen.push(location);
        self.inner.evaluate(location, checkpoint)
    }
}

fn learning_curve() -> Vec<f64> {
    vec![0.0, 0.5, 0.6, 0.65, 0.7, 0.72, 0.75, 0.78, 0.8]
}

#[test]
fn test_scenario_budget_three() {
    let index = CheckpointIndex::with_len("scenario", 9).unwrap();
    let selection = Selector::new(&index, TableEvaluator::from_curve(&learning_curve()))
        .budget(3)
        .run()
        .unwrap();

    let mut drawn = selection.locations();
    drawn.sort_unstable();
    assert_eq!(drawn, vec![0, 4, 8]);
    assert!((selection.baseline().expected(4) - 0.4).abs() < 1e-12);

    let end = selection.points().nth(1).unwrap();
    assert_eq!(end.location(), 8);
    assert!(end.error().abs() < 1e-12);
}

#[test]
fn test_scenario_budget_equals_n() {
    let index = CheckpointIndex::with_len("scenario", 9).unwrap();
    let mut recording = Recording {
        inner: TableEvaluator::from_curve(&learning_curve()),
        seen: Vec::new(),
    };
    let selection = Selector::new(&index, &mut recording).budget(9).run().unwrap();

    let mut drawn = selection.locations();
    drawn.sort_unstable();
    assert_eq!(drawn, (0..9).collect::<Vec<_>>());

    // every location but 0 evaluated exactly once
    let mut seen = recording.seen.clone();
    seen.sort_unstable();
    assert_eq!(seen, (1..9).collect::<Vec<_>>());
}

#[test]
fn test_scenario_first_bootstrap_call_fails() {
    let index = CheckpointIndex::with_len("scenario", 9).unwrap();
    let mut calls = 0;
    let evaluator = FnEvaluator::new(|_: usize, checkpoint: &str| -> Result<Evaluation> {
        calls += 1;
        Err(Error::MissingArtifact {
            trial: "trial1".to_string(),
            checkpoint: checkpoint.to_string(),
        })
    });

    let err = Selector::new(&index, evaluator).budget(5).run().unwrap_err();
    assert!(matches!(err, Error::Evaluator { location: 8, .. }));
    assert_eq!(calls, 1);
}

#[test]
fn test_bootstrap_evaluates_final_checkpoint_first() {
    let index = CheckpointIndex::with_len("scenario", 9).unwrap();
    let mut recording = Recording {
        inner: TableEvaluator::from_curve(&learning_curve()),
        seen: Vec::new(),
    };
    Selector::new(&index, &mut recording).budget(4).run().unwrap();
    assert_eq!(&recording.seen[..2], &[8, 4]);
}

#[test]
fn test_flat_curve_ties_break_by_location() {
    // A perfectly linear curve gives every point error 0
    let curve: Vec<f64> = (0..17).map(|i| f64::from(i) / 16.0).collect();
    let index = CheckpointIndex::with_len("linear", curve.len()).unwrap();

    let first = Selector::new(&index, TableEvaluator::from_curve(&curve))
        .budget(6)
        .run()
        .unwrap();
    let second = Selector::new(&index, TableEvaluator::from_curve(&curve))
        .budget(6)
        .run()
        .unwrap();

    assert_eq!(first.locations(), second.locations());
    // after 0, 16, 8 the lowest pending locations win
    assert_eq!(first.locations(), vec![0, 16, 8, 4, 2, 1]);
}

#[test]
fn test_exhausted_search_reports_termination() {
    let index = CheckpointIndex::with_len("small", 4).unwrap();
    let selection = Selector::new(&index, TableEvaluator::from_curve(&[0.0, 0.3, 0.35, 0.4]))
        .budget(50)
        .run()
        .unwrap();
    assert_eq!(selection.len(), 4);
    assert_eq!(selection.termination(), Termination::SearchExhausted);
    assert_eq!(selection.evaluations(), 3);
}

#[test]
fn test_unbounded_budget_draws_every_checkpoint() {
    let index = CheckpointIndex::with_len("scenario", 9).unwrap();
    for budget in [usize::MAX, usize::MAX / 2, 1_000_000_000_000] {
        let selection = Selector::new(&index, TableEvaluator::from_curve(&learning_curve()))
            .budget(budget)
            .run()
            .unwrap();

        let mut drawn = selection.locations();
        drawn.sort_unstable();
        assert_eq!(drawn, (0..9).collect::<Vec<_>>());
        assert_eq!(selection.termination(), Termination::SearchExhausted);
        assert_eq!(selection.evaluations(), 8);
    }
}

#[test]
fn test_checkpoint_names_follow_first_trial() {
    let names: Vec<String> = (0..5).map(|i| format!("epoch-{i:03}.pt")).collect();
    let index = CheckpointIndex::from_trials(
        "named",
        vec![
            TrialListing::new("trial1", names.clone()),
            TrialListing::new("trial2", names),
        ],
    )
    .unwrap();

    let mut asked = Vec::new();
    let evaluator = FnEvaluator::new(|location: usize, checkpoint: &str| -> Result<Evaluation> {
        asked.push((location, checkpoint.to_string()));
        let m = Metrics::new(0.5, 0.0, 0.5);
        Ok(Evaluation::new(m, m))
    });
    let selection = Selector::new(&index, evaluator).budget(3).run().unwrap();

    assert_eq!(asked[0], (4, "epoch-004.pt".to_string()));
    assert_eq!(selection.checkpoint_name(2), Some("epoch-002.pt"));
}

#[test]
fn test_bisect_matches_midpoints_used() {
    assert_eq!(bisect(0, 8), Some(4));
    assert_eq!(bisect(0, 3), Some(2));
    assert_eq!(bisect(1, 4), Some(2));
    assert_eq!(bisect(4, 5), None);
}
