//! Per-step scoring of a prediction against the normalized observation.

use ndarray::Array2;

/// Scores `(features, batch)` predictions against targets of the same shape
pub trait LossFunction {
    fn compute_loss(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> f64;

    /// d(loss)/d(predictions)
    fn compute_gradient(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> Array2<f64>;
}

/// Squared error averaged over features, the filtering-step loss
#[derive(Clone, Copy, Debug, Default)]
pub struct MSELoss;

impl LossFunction for MSELoss {
    fn compute_loss(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> f64 {
        let count = predictions.len() as f64;
        (predictions - targets).mapv(|d| d * d).sum() / count
    }

    fn compute_gradient(&self, predictions: &Array2<f64>, targets: &Array2<f64>) -> Array2<f64> {
        let count = predictions.len() as f64;
        (predictions - targets).mapv(|d| 2.0 * d / count)
    }
}
