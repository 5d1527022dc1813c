//! Dense projection from the LSTM hidden output to the normalized feature space.

use ndarray::{Array2, Axis};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rand::Rng;

use crate::error::{ForecastError, Result};
use crate::optimizers::Optimizer;

/// Weight and bias gradients of a [`LinearLayer`]
#[derive(Clone, Debug)]
pub struct LinearGradients {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
}

impl LinearGradients {
    /// `self += scale * other`
    pub fn add_scaled(&mut self, other: &LinearGradients, scale: f64) {
        self.weight.scaled_add(scale, &other.weight);
        self.bias.scaled_add(scale, &other.bias);
    }

    pub fn matrices_mut(&mut self) -> [&mut Array2<f64>; 2] {
        [&mut self.weight, &mut self.bias]
    }
}

/// `output = weight · hidden + bias`, column-major like the cell
#[derive(Clone, Debug)]
pub struct LinearLayer {
    /// (output_size, input_size)
    pub weight: Array2<f64>,
    /// (output_size, 1)
    pub bias: Array2<f64>,
    pub input_size: usize,
    pub output_size: usize,
}

impl LinearLayer {
    pub fn new(input_size: usize, output_size: usize) -> Self {
        Self::with_rng(input_size, output_size, &mut rand::thread_rng())
    }

    /// Glorot-uniform weights drawn from `rng`, zero bias
    pub fn with_rng<R: Rng + ?Sized>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        let scale = (2.0 / (input_size + output_size) as f64).sqrt();

        let weight = Array2::random_using((output_size, input_size), Uniform::new(-scale, scale), rng);
        let bias = Array2::zeros((output_size, 1));

        Self { weight, bias, input_size, output_size }
    }

    /// Layer with fixed parameters; `bias` must be `(output_size, 1)`
    pub fn from_weights(weight: Array2<f64>, bias: Array2<f64>) -> Result<Self> {
        let (output_size, input_size) = weight.dim();
        if bias.dim() != (output_size, 1) {
            return Err(ForecastError::ShapeMismatch {
                what: "projection bias",
                expected: output_size,
                actual: bias.len(),
            });
        }
        Ok(Self { weight, bias, input_size, output_size })
    }

    /// Projects `(input_size, batch)` columns to `(output_size, batch)`
    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        debug_assert_eq!(input.nrows(), self.input_size);
        &self.weight.dot(input) + &self.bias
    }

    /// Parameter gradients and the gradient flowing back into `input`,
    /// which must be the tensor the matching forward pass received
    pub fn backward(&self, input: &Array2<f64>, grad_output: &Array2<f64>) -> (LinearGradients, Array2<f64>) {
        debug_assert_eq!(grad_output.nrows(), self.output_size);
        debug_assert_eq!(input.ncols(), grad_output.ncols());

        let gradients = LinearGradients {
            weight: grad_output.dot(&input.t()),
            bias: grad_output.sum_axis(Axis(1)).insert_axis(Axis(1)),
        };
        (gradients, self.weight.t().dot(grad_output))
    }

    /// Parameters are keyed `{prefix}_weight` and `{prefix}_bias` in the optimizer
    pub fn update_parameters<O: Optimizer + ?Sized>(&mut self, gradients: &LinearGradients, optimizer: &mut O, prefix: &str) {
        optimizer.update(&format!("{}_weight", prefix), &mut self.weight, &gradients.weight);
        optimizer.update(&format!("{}_bias", prefix), &mut self.bias, &gradients.bias);
    }

    pub fn zero_gradients(&self) -> LinearGradients {
        LinearGradients {
            weight: Array2::zeros(self.weight.raw_dim()),
            bias: Array2::zeros(self.bias.raw_dim()),
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}
