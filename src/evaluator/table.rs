//! Replay evaluator over precomputed metrics

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::checkpoint::Location;
use crate::metrics::{Evaluation, Metrics};
use crate::{Error, Result};

use super::Evaluator;

/// One precomputed row: `{"location": 3, "train": [c, a, i], "test": [c, a, i]}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    /// Checkpoint location
    pub location: Location,
    /// Train metrics as `[correct, abstained, incorrect]`
    pub train: [f64; 3],
    /// Test metrics as `[correct, abstained, incorrect]`
    pub test: [f64; 3],
}

/// Evaluator answering from an in-memory table.
///
/// Useful when a full (or partial) evaluation sweep already exists and the
/// selection should be replayed, and for testing selection behavior against
/// a known curve. Locations missing from the table fail like a missing
/// checkpoint artifact would.
#[derive(Debug, Clone, Default)]
pub struct TableEvaluator {
    entries: BTreeMap<Location, Evaluation>,
    calls: usize,
}

impl TableEvaluator {
    /// Build from `(location, evaluation)` pairs. Later duplicates win.
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = (Location, Evaluation)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            calls: 0,
        }
    }

    /// Table where location `i` has test accuracy `curve[i]`.
    ///
    /// Train metrics mirror test metrics; the remainder of each triple is
    /// counted as incorrect.
    #[must_use]
    pub fn from_curve(curve: &[f64]) -> Self {
        Self::new(curve.iter().enumerate().map(|(location, &acc)| {
            let m = Metrics::new(acc, 0.0, 1.0 - acc);
            (location, Evaluation::new(m, m))
        }))
    }

    /// Load a JSON array of [`TableEntry`] rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Parse a JSON array of [`TableEntry`] rows.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not valid JSON of the expected shape.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let rows: Vec<TableEntry> = serde_json::from_str(raw)?;
        Ok(Self::new(rows.into_iter().map(|row| {
            (
                row.location,
                Evaluation::new(Metrics::from(row.train), Metrics::from(row.test)),
            )
        })))
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many times [`Evaluator::evaluate`] was called.
    #[must_use]
    pub const fn calls(&self) -> usize {
        self.calls
    }
}

impl Evaluator for TableEvaluator {
    fn evaluate(&mut self, location: Location, checkpoint: &str) -> Result<Evaluation> {
        self.calls += 1;
        self.entries
            .get(&location)
            .copied()
            .ok_or_else(|| Error::MissingArtifact {
                trial: "table".to_string(),
                checkpoint: checkpoint.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_str() {
        let raw = r#"[
            {"location": 0, "train": [0.0, 0.0, 0.0], "test": [0.0, 0.0, 0.0]},
            {"location": 4, "train": [0.9, 0.05, 0.05], "test": [0.7, 0.1, 0.2]}
        ]"#;
        let mut table = TableEvaluator::from_json_str(raw).unwrap();
        assert_eq!(table.len(), 2);

        let eval = table.evaluate(4, "c4").unwrap();
        assert!((eval.test.correct - 0.7).abs() < f64::EPSILON);
        assert!((eval.train.abstained - 0.05).abs() < f64::EPSILON);
        assert_eq!(table.calls(), 1);
    }

    #[test]
    fn test_missing_location_is_missing_artifact() {
        let mut table = TableEvaluator::from_curve(&[0.0, 0.5]);
        let err = table.evaluate(7, "ckpt-7").unwrap_err();
        assert!(matches!(err, Error::MissingArtifact { ref checkpoint, .. } if checkpoint == "ckpt-7"));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            TableEvaluator::from_json_str("{not json"),
            Err(Error::Json(_))
        ));
    }
}
