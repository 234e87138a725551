//! Evaluated checkpoints and their bisection provenance
//!
//! Points live in a [`PointArena`] owned by a single selection run. Parent
//! links are [`PointId`] indices into that arena, so the provenance tree is
//! plain data:
//!
//! ```text
//!         0 ─────────────── 8          roots (no parents)
//!                  4                   bisect(0, 8)
//!            2           6             bisect(0, 4), bisect(4, 8)
//!          1   3       5   7
//! ```
//!
//! Two comparisons are kept apart on purpose: [`Point::same_location`] for
//! deduplication and [`Priority`] for queue ordering.

use std::cmp::Ordering;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::checkpoint::Location;
use crate::metrics::{Evaluation, Metrics};

/// Index of a point inside its run's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointId(usize);

impl PointId {
    /// Raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// One evaluated checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    location: Location,
    error: f64,
    evaluation: Evaluation,
    left_parent: Option<PointId>,
    right_parent: Option<PointId>,
}

impl Point {
    /// Root point (location 0 or N-1) with no parents.
    #[must_use]
    pub const fn root(location: Location, error: f64, evaluation: Evaluation) -> Self {
        Self {
            location,
            error,
            evaluation,
            left_parent: None,
            right_parent: None,
        }
    }

    /// Child point created by bisecting `left` and `right`.
    #[must_use]
    pub const fn child(
        location: Location,
        error: f64,
        evaluation: Evaluation,
        left: PointId,
        right: PointId,
    ) -> Self {
        Self {
            location,
            error,
            evaluation,
            left_parent: Some(left),
            right_parent: Some(right),
        }
    }

    /// Checkpoint location.
    #[must_use]
    pub const fn location(&self) -> Location {
        self.location
    }

    /// Priority score, `-|test accuracy - baseline|`.
    #[must_use]
    pub const fn error(&self) -> f64 {
        self.error
    }

    /// Train and test metrics.
    #[must_use]
    pub const fn evaluation(&self) -> &Evaluation {
        &self.evaluation
    }

    /// Training metrics.
    #[must_use]
    pub const fn train(&self) -> &Metrics {
        &self.evaluation.train
    }

    /// Test metrics.
    #[must_use]
    pub const fn test(&self) -> &Metrics {
        &self.evaluation.test
    }

    /// Left parent, if any.
    #[must_use]
    pub const fn left_parent(&self) -> Option<PointId> {
        self.left_parent
    }

    /// Right parent, if any.
    #[must_use]
    pub const fn right_parent(&self) -> Option<PointId> {
        self.right_parent
    }

    /// True for the two endpoints.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.left_parent.is_none() && self.right_parent.is_none()
    }

    /// Deduplication equality: same checkpoint, regardless of scores.
    #[must_use]
    pub const fn same_location(&self, other: &Self) -> bool {
        self.location == other.location
    }

    /// Queue ordering key of this point.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        Priority {
            error: self.error,
            location: self.location,
        }
    }
}

/// Queue ordering of points.
///
/// Greater means "expand first": the more negative error (larger deviation
/// from the baseline) wins, ties go to the lower location.
#[derive(Debug, Clone, Copy)]
pub struct Priority {
    /// Point error score
    pub error: f64,
    /// Point location
    pub location: Location,
}

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Priority {}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed on both keys: smaller error and smaller location rank higher.
        // partial_cmp first so that -0.0 and 0.0 tie; total_cmp only orders NaN.
        other
            .error
            .partial_cmp(&self.error)
            .unwrap_or_else(|| other.error.total_cmp(&self.error))
            .then_with(|| other.location.cmp(&self.location))
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Midpoint between two locations, or `None` when there is no room.
///
/// Uses `round((left + right) / 2)` with ties to even, so adjacent
/// locations always collapse onto one of the parents.
///
/// # Example
///
/// ```rust
/// use checkpoint_sampler::point::bisect;
///
/// assert_eq!(bisect(0, 8), Some(4));
/// assert_eq!(bisect(4, 7), Some(6)); // 5.5 rounds to even
/// assert_eq!(bisect(3, 4), None);
/// assert_eq!(bisect(5, 5), None);
/// ```
#[must_use]
pub const fn bisect(left: Location, right: Location) -> Option<Location> {
    let sum = left + right;
    let floor = sum / 2;
    let mid = if sum % 2 == 1 && floor % 2 == 1 {
        floor + 1
    } else {
        floor
    };
    if mid == left || mid == right {
        None
    } else {
        Some(mid)
    }
}

/// Owner of every point created during one selection run.
#[derive(Debug, Default)]
pub struct PointArena {
    points: Vec<Point>,
    by_location: FxHashMap<Location, PointId>,
}

impl PointArena {
    /// Empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a point, returning its id.
    ///
    /// A location is stored once; inserting a second point for the same
    /// location returns the existing id and drops the new point.
    pub fn insert(&mut self, point: Point) -> PointId {
        if let Some(&id) = self.by_location.get(&point.location) {
            return id;
        }
        let id = PointId(self.points.len());
        self.by_location.insert(point.location, id);
        self.points.push(point);
        id
    }

    /// Point by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` came from a different arena.
    #[must_use]
    pub fn get(&self, id: PointId) -> &Point {
        &self.points[id.0]
    }

    /// Id of the point evaluated at `location`, if any.
    #[must_use]
    pub fn find(&self, location: Location) -> Option<PointId> {
        self.by_location.get(&location).copied()
    }

    /// Whether `location` was already evaluated in this run.
    #[must_use]
    pub fn contains(&self, location: Location) -> bool {
        self.by_location.contains_key(&location)
    }

    /// Number of evaluated points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if nothing was evaluated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }
}
