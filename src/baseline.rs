//! Linear accuracy baseline
//!
//! The naive guess for the accuracy curve is a straight line from the
//! untrained model (accuracy 0 at location 0) to the final checkpoint
//! (measured accuracy at location N-1). Points that deviate most from this
//! line are the most informative ones to evaluate.

use crate::checkpoint::Location;

/// Expected accuracy at every location, by linear interpolation.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearBaseline {
    values: Vec<f64>,
}

impl LinearBaseline {
    /// `n` evenly spaced values from `0.0` to `final_accuracy`, both inclusive.
    ///
    /// With `n == 1` the only location is the final checkpoint, so its value is
    /// `final_accuracy` and not the start value `0.0`. Its deviation is zero
    /// either way, so the choice does not change any priority.
    ///
    /// # Example
    ///
    /// ```rust
    /// use checkpoint_sampler::baseline::LinearBaseline;
    ///
    /// let baseline = LinearBaseline::new(9, 0.8);
    /// assert_eq!(baseline.expected(0), 0.0);
    /// assert!((baseline.expected(4) - 0.4).abs() < 1e-12);
    /// assert_eq!(baseline.expected(8), 0.8);
    /// ```
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(n: usize, final_accuracy: f64) -> Self {
        let values = match n {
            0 => Vec::new(),
            1 => vec![final_accuracy],
            _ => {
                let last = n - 1;
                let step = final_accuracy / last as f64;
                (0..n)
                    .map(|i| if i == last { final_accuracy } else { step * i as f64 })
                    .collect()
            }
        };
        Self { values }
    }

    /// Expected accuracy at `location`.
    ///
    /// # Panics
    ///
    /// Panics if `location` is outside the baseline; callers only pass
    /// locations produced from the same checkpoint index.
    #[must_use]
    pub fn expected(&self, location: Location) -> f64 {
        self.values[location]
    }

    /// Priority score of a measurement: `-|accuracy - expected(location)|`.
    ///
    /// Zero means the line predicted the checkpoint exactly; more negative
    /// means more divergent.
    #[must_use]
    pub fn deviation(&self, location: Location, accuracy: f64) -> f64 {
        -(accuracy - self.expected(location)).abs()
    }

    /// Number of locations covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when built for zero locations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All expected values in location order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_exact() {
        let baseline = LinearBaseline::new(7, 0.63);
        assert_eq!(baseline.len(), 7);
        assert_eq!(baseline.expected(0), 0.0);
        assert_eq!(baseline.expected(6), 0.63);
    }

    #[test]
    fn test_evenly_spaced() {
        let baseline = LinearBaseline::new(5, 1.0);
        let expected = [0.0, 0.25, 0.5, 0.75, 1.0];
        for (got, want) in baseline.values().iter().zip(expected) {
            assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn test_single_location() {
        let baseline = LinearBaseline::new(1, 0.9);
        assert_eq!(baseline.values(), &[0.9]);
    }

    #[test]
    fn test_empty() {
        assert!(LinearBaseline::new(0, 0.5).is_empty());
    }

    #[test]
    fn test_deviation_is_non_positive() {
        let baseline = LinearBaseline::new(9, 0.8);
        assert!((baseline.deviation(4, 0.7) - (-0.3)).abs() < 1e-12);
        assert!((baseline.deviation(4, 0.1) - (-0.3)).abs() < 1e-12);
        assert_eq!(baseline.deviation(8, 0.8), 0.0);
    }
}
