//! Frontier: max-priority queue of points waiting to be expanded
//!
//! **Problem**: Each expansion step needs the most informative pending
//! point, and the set of pending points grows by up to two per step.
//!
//! **Solution**: Binary heap keyed by [`Priority`]; O(log k) insert and
//! extract-max where k never exceeds the number of checkpoints. Points are
//! immutable once scored, so no decrease-key is needed.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::point::{Point, PointId, Priority};

// Heap entry: ordered by priority only, carries the arena id along
#[derive(Debug)]
struct FrontierEntry {
    priority: Priority,
    id: PointId,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}

impl Eq for FrontierEntry {}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.cmp(&other.priority)
    }
}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending points ordered by [`Priority`].
#[derive(Debug, Default)]
pub struct Frontier {
    heap: BinaryHeap<FrontierEntry>,
}

impl Frontier {
    /// Empty frontier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty frontier with room for `capacity` points.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
        }
    }

    /// Queue a scored point.
    pub fn push(&mut self, id: PointId, point: &Point) {
        self.heap.push(FrontierEntry {
            priority: point.priority(),
            id,
        });
    }

    /// Remove and return the highest-priority point.
    pub fn pop(&mut self) -> Option<PointId> {
        self.heap.pop().map(|entry| entry.id)
    }

    /// Highest-priority point without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<PointId> {
        self.heap.peek().map(|entry| entry.id)
    }

    /// Number of pending points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
