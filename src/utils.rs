//! Activation functions and vector/column conversions shared by the layers.
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Sigmoid activation function: σ(x) = 1 / (1 + e^(-x))
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Turns a feature vector into a `(len, 1)` column, the layout the layers use.
pub fn to_column(vector: ArrayView1<f64>) -> Array2<f64> {
    vector.to_owned().insert_axis(Axis(1))
}

/// Drops the batch axis of a single-column matrix.
pub fn from_column(column: ArrayView2<f64>) -> Array1<f64> {
    column.index_axis(Axis(1), 0).to_owned()
}

/// Squared L2 norm, used by gradient clipping.
pub fn squared_norm(matrix: &Array2<f64>) -> f64 {
    matrix.iter().map(|x| x * x).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-10);
        assert!(sigmoid(1000.0) > 0.99);
        assert!(sigmoid(-1000.0) < 0.01);
    }

    #[test]
    fn test_column_conversions() {
        let v = arr1(&[1.0, 2.0, 3.0]);
        let column = to_column(v.view());
        assert_eq!(column.shape(), &[3, 1]);
        assert_eq!(from_column(column.view()), v);
    }

    #[test]
    fn test_squared_norm() {
        let m = arr2(&[[3.0], [4.0]]);
        assert!((squared_norm(&m) - 25.0).abs() < 1e-12);
    }
}
