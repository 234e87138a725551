//! # checkpoint-sampler: Adaptive Checkpoint Selection
//!
//! **Version**: 0.1.0
//!
//! Incremental-learning experiments save a model checkpoint after every
//! training step, and evaluating all of them is expensive. checkpoint-sampler
//! picks at most `budget` checkpoints so that plotting them approximates the
//! full accuracy curve: it starts from the endpoints, compares every
//! evaluated checkpoint with a straight line between them, and keeps
//! bisecting around the checkpoint that deviates most.
//!
//! ## Design Principles
//!
//! - **Deterministic**: equal errors are broken by location, so the same
//!   evaluations always produce the same drawn points
//! - **Budgeted**: at most `budget` checkpoints are drawn and the evaluator
//!   is called at most once per location
//! - **All or nothing**: an evaluator error aborts the run and no output is
//!   written
//!
//! ## Example Usage
//!
//! ```rust
//! use checkpoint_sampler::checkpoint::CheckpointIndex;
//! use checkpoint_sampler::evaluator::TableEvaluator;
//! use checkpoint_sampler::selector::Selector;
//!
//! let index = CheckpointIndex::with_len("demo", 9)?;
//! let curve = [0.0, 0.5, 0.6, 0.65, 0.7, 0.72, 0.75, 0.78, 0.8];
//!
//! let selection = Selector::new(&index, TableEvaluator::from_curve(&curve))
//!     .budget(5)
//!     .run()?;
//! assert_eq!(selection.locations(), vec![0, 8, 4, 2, 1]);
//! # Ok::<(), checkpoint_sampler::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod baseline;
pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod frontier;
pub mod metrics;
pub mod output;
pub mod point;
pub mod run;
pub mod selector;

pub use error::{Error, Result};
