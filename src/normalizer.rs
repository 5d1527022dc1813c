//! Per-feature standardization of observed values.
//!
//! Values are scaled as `(x - mean) / variance`. This divides by the
//! variance, not the standard deviation, and the sequence model expects it.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use crate::error::{ForecastError, Result};

/// Overall feature moments of the training series.
///
/// Computed once before any stepping and read-only afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct InputStatistics {
    pub mean: Array1<f64>,
    pub variance: Array1<f64>,
}

impl InputStatistics {
    /// Builds statistics from explicit moments. Degenerate variances are
    /// replaced by `1.0`; a mean that is not finite is an error.
    pub fn new(mean: Array1<f64>, variance: Array1<f64>) -> Result<Self> {
        if mean.len() != variance.len() {
            return Err(ForecastError::ShapeMismatch {
                what: "variance",
                expected: mean.len(),
                actual: variance.len(),
            });
        }

        if let Some(&value) = mean.iter().find(|m| !m.is_finite()) {
            return Err(ForecastError::NonFinite { what: "feature mean", value });
        }

        let variance = variance.mapv(|v| {
            if v.is_finite() && v > f64::EPSILON {
                v
            } else {
                tracing::warn!(variance = v, "degenerate feature variance, normalizing with 1.0");
                1.0
            }
        });

        Ok(InputStatistics { mean, variance })
    }

    /// Population mean and variance of each column of a `(len, num_features)` matrix.
    pub fn from_values(values: ArrayView2<f64>) -> Result<Self> {
        if values.nrows() == 0 {
            return Err(ForecastError::EmptySeries);
        }

        let mean = values.mean_axis(Axis(0)).ok_or(ForecastError::EmptySeries)?;
        let variance = values.var_axis(Axis(0), 0.0);
        tracing::debug!(?mean, ?variance, rows = values.nrows(), "computed input statistics");

        Self::new(mean, variance)
    }

    pub fn num_features(&self) -> usize {
        self.mean.len()
    }

    /// Maps raw values onto the model's normalized scale.
    pub fn transform(&self, data: ArrayView1<f64>) -> Array1<f64> {
        (&data - &self.mean) / &self.variance
    }

    /// Maps normalized values back to the original scale.
    pub fn de_transform(&self, data: ArrayView1<f64>) -> Array1<f64> {
        &data * &self.variance + &self.mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_transform_uses_variance() {
        let stats = InputStatistics::new(arr1(&[10.0]), arr1(&[4.0])).unwrap();
        let y = stats.transform(arr1(&[18.0]).view());
        assert!((y[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_round_trip() {
        let stats = InputStatistics::new(arr1(&[-3.5, 120.0]), arr1(&[0.25, 900.0])).unwrap();
        for x in [arr1(&[0.0, 0.0]), arr1(&[1e6, -42.0]), arr1(&[-3.5, 120.0])] {
            let back = stats.de_transform(stats.transform(x.view()).view());
            for (a, b) in back.iter().zip(x.iter()) {
                assert!((a - b).abs() <= 1e-9 * b.abs().max(1.0));
            }
        }
    }

    #[test]
    fn test_from_values() {
        let values = arr2(&[[1.0], [2.0], [3.0], [4.0]]);
        let stats = InputStatistics::from_values(values.view()).unwrap();
        assert!((stats.mean[0] - 2.5).abs() < 1e-12);
        assert!((stats.variance[0] - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_constant_series_gets_unit_variance() {
        let values = arr2(&[[5.0], [5.0], [5.0]]);
        let stats = InputStatistics::from_values(values.view()).unwrap();
        assert_eq!(stats.variance[0], 1.0);
        assert_eq!(stats.transform(arr1(&[5.0]).view())[0], 0.0);
    }

    #[test]
    fn test_mismatched_moments_rejected() {
        let err = InputStatistics::new(arr1(&[0.0, 1.0]), arr1(&[1.0])).unwrap_err();
        assert!(matches!(err, ForecastError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_non_finite_mean_rejected() {
        let err = InputStatistics::new(arr1(&[f64::NAN]), arr1(&[1.0])).unwrap_err();
        assert!(matches!(err, ForecastError::NonFinite { what: "feature mean", .. }));

        let values = arr2(&[[1.0], [f64::INFINITY]]);
        assert!(InputStatistics::from_values(values.view()).is_err());
    }

    #[test]
    fn test_empty_values_rejected() {
        let values = ndarray::Array2::<f64>::zeros((0, 1));
        assert!(matches!(
            InputStatistics::from_values(values.view()),
            Err(ForecastError::EmptySeries)
        ));
    }
}
