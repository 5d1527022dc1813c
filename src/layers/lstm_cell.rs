use ndarray::{Array1, Array2, Axis, s};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rand::Rng;
use crate::utils::sigmoid;
use crate::optimizers::Optimizer;

/// Derivative of the sigmoid given its output
fn sigmoid_derivative(s: f64) -> f64 {
    s * (1.0 - s)
}

/// Gradients for every cell parameter
#[derive(Clone, Debug)]
pub struct LSTMCellGradients {
    pub w_ih: Array2<f64>,
    pub w_hh: Array2<f64>,
    pub b_ih: Array2<f64>,
    pub b_hh: Array2<f64>,
}

impl LSTMCellGradients {
    /// `self += scale * other`
    pub fn add_scaled(&mut self, other: &LSTMCellGradients, scale: f64) {
        self.w_ih.scaled_add(scale, &other.w_ih);
        self.w_hh.scaled_add(scale, &other.w_hh);
        self.b_ih.scaled_add(scale, &other.b_ih);
        self.b_hh.scaled_add(scale, &other.b_hh);
    }

    pub fn matrices_mut(&mut self) -> [&mut Array2<f64>; 4] {
        [&mut self.w_ih, &mut self.w_hh, &mut self.b_ih, &mut self.b_hh]
    }
}

/// Activations of one forward step, consumed by [`LSTMCell::backward`]
#[derive(Clone, Debug)]
pub struct LSTMCellCache {
    pub input: Array2<f64>,
    pub hx: Array2<f64>,
    pub cx: Array2<f64>,
    pub input_gate: Array2<f64>,
    pub forget_gate: Array2<f64>,
    pub cell_gate: Array2<f64>,
    pub output_gate: Array2<f64>,
    pub cy: Array2<f64>,
    pub hy: Array2<f64>,
}

/// Recurrent carry of a single sequence, with the batch axis removed.
#[derive(Clone, Debug, PartialEq)]
pub struct LSTMState {
    pub memory: Array1<f64>,
    pub hidden: Array1<f64>,
}

impl LSTMState {
    /// Takes column `index` out of batched `(hidden_size, batch)` carries.
    pub fn from_batch(memory: &Array2<f64>, hidden: &Array2<f64>, index: usize) -> Self {
        LSTMState {
            memory: memory.index_axis(Axis(1), index).to_owned(),
            hidden: hidden.index_axis(Axis(1), index).to_owned(),
        }
    }
}

/// The recurrent cell of the forecaster
///
/// - i_t = σ(W_xi * x_t + W_hi * h_t-1 + b_i)
/// - f_t = σ(W_xf * x_t + W_hf * h_t-1 + b_f)
/// - g_t = tanh(W_xg * x_t + W_hg * h_t-1 + b_g)
/// - o_t = σ(W_xo * x_t + W_ho * h_t-1 + b_o)
/// - c_t = f_t ⊙ c_t-1 + i_t ⊙ g_t
/// - h_t = o_t ⊙ tanh(c_t)
///
/// Inputs and carries are column-major: `(features, batch)`.
#[derive(Clone, Debug)]
pub struct LSTMCell {
    /// (4·hidden, input)
    pub w_ih: Array2<f64>,
    /// (4·hidden, hidden)
    pub w_hh: Array2<f64>,
    pub b_ih: Array2<f64>,
    pub b_hh: Array2<f64>,
    pub input_size: usize,
    pub hidden_size: usize,
}

impl LSTMCell {
    /// Weights uniform in ±0.1, zero biases
    pub fn new(input_size: usize, hidden_size: usize) -> Self {
        Self::with_rng(input_size, hidden_size, &mut rand::thread_rng())
    }

    /// Like [`LSTMCell::new`], drawing from `rng`
    pub fn with_rng<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let dist = Uniform::new(-0.1, 0.1);

        let w_ih = Array2::random_using((4 * hidden_size, input_size), dist, rng);
        let w_hh = Array2::random_using((4 * hidden_size, hidden_size), dist, rng);
        let b_ih = Array2::zeros((4 * hidden_size, 1));
        let b_hh = Array2::zeros((4 * hidden_size, 1));

        LSTMCell { w_ih, w_hh, b_ih, b_hh, input_size, hidden_size }
    }

    /// Zero (memory, hidden) carries for `batch_size` sequences
    pub fn zero_state(&self, batch_size: usize) -> (Array2<f64>, Array2<f64>) {
        (
            Array2::zeros((self.hidden_size, batch_size)),
            Array2::zeros((self.hidden_size, batch_size)),
        )
    }

    pub fn forward(&self, input: &Array2<f64>, hx: &Array2<f64>, cx: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        let (hy, cy, _) = self.forward_with_cache(input, hx, cx);
        (hy, cy)
    }

    pub fn forward_with_cache(&self, input: &Array2<f64>, hx: &Array2<f64>, cx: &Array2<f64>) -> (Array2<f64>, Array2<f64>, LSTMCellCache) {
        // Stacked pre-activations [i, f, g, o]
        let gates = &self.w_ih.dot(input) + &self.b_ih + &self.w_hh.dot(hx) + &self.b_hh;
        let h = self.hidden_size;

        let input_gate = gates.slice(s![0..h, ..]).mapv(sigmoid);
        let forget_gate = gates.slice(s![h..2 * h, ..]).mapv(sigmoid);
        let cell_gate = gates.slice(s![2 * h..3 * h, ..]).mapv(f64::tanh);
        let output_gate = gates.slice(s![3 * h..4 * h, ..]).mapv(sigmoid);

        let cy = &forget_gate * cx + &input_gate * &cell_gate;
        let hy = &output_gate * &cy.mapv(f64::tanh);

        let cache = LSTMCellCache {
            input: input.clone(),
            hx: hx.clone(),
            cx: cx.clone(),
            input_gate,
            forget_gate,
            cell_gate,
            output_gate,
            cy: cy.clone(),
            hy: hy.clone(),
        };

        (hy, cy, cache)
    }

    /// Backpropagates `dhy`/`dcy` through one step recorded in `cache`
    ///
    /// Returns `(gradients, dx, dhx, dcx)`.
    pub fn backward(&self, dhy: &Array2<f64>, dcy: &Array2<f64>, cache: &LSTMCellCache) -> (LSTMCellGradients, Array2<f64>, Array2<f64>, Array2<f64>) {
        let h = self.hidden_size;
        let tanh_cy = cache.cy.mapv(f64::tanh);

        // Memory gradient: the carried path plus the path through h = o ⊙ tanh(c)
        let dc = dcy + &(dhy * &cache.output_gate * &tanh_cy.mapv(|t| 1.0 - t * t));

        // Pre-activation gradients, stacked in forward order [i, f, g, o]
        let mut dgates = Array2::<f64>::zeros((4 * h, dhy.ncols()));
        dgates
            .slice_mut(s![0..h, ..])
            .assign(&(&dc * &cache.cell_gate * &cache.input_gate.mapv(sigmoid_derivative)));
        dgates
            .slice_mut(s![h..2 * h, ..])
            .assign(&(&dc * &cache.cx * &cache.forget_gate.mapv(sigmoid_derivative)));
        dgates
            .slice_mut(s![2 * h..3 * h, ..])
            .assign(&(&dc * &cache.input_gate * &cache.cell_gate.mapv(|g| 1.0 - g * g)));
        dgates
            .slice_mut(s![3 * h..4 * h, ..])
            .assign(&(dhy * &tanh_cy * &cache.output_gate.mapv(sigmoid_derivative)));

        let db = dgates.sum_axis(Axis(1)).insert_axis(Axis(1));
        let gradients = LSTMCellGradients {
            w_ih: dgates.dot(&cache.input.t()),
            w_hh: dgates.dot(&cache.hx.t()),
            b_ih: db.clone(),
            b_hh: db,
        };

        let dx = self.w_ih.t().dot(&dgates);
        let dhx = self.w_hh.t().dot(&dgates);
        let dcx = &dc * &cache.forget_gate;

        (gradients, dx, dhx, dcx)
    }

    pub fn zero_gradients(&self) -> LSTMCellGradients {
        LSTMCellGradients {
            w_ih: Array2::zeros(self.w_ih.raw_dim()),
            w_hh: Array2::zeros(self.w_hh.raw_dim()),
            b_ih: Array2::zeros(self.b_ih.raw_dim()),
            b_hh: Array2::zeros(self.b_hh.raw_dim()),
        }
    }

    /// Parameters are keyed `{prefix}_w_ih`, `{prefix}_w_hh`, `{prefix}_b_ih`, `{prefix}_b_hh`
    pub fn update_parameters<O: Optimizer + ?Sized>(&mut self, gradients: &LSTMCellGradients, optimizer: &mut O, prefix: &str) {
        optimizer.update(&format!("{}_w_ih", prefix), &mut self.w_ih, &gradients.w_ih);
        optimizer.update(&format!("{}_w_hh", prefix), &mut self.w_hh, &gradients.w_hh);
        optimizer.update(&format!("{}_b_ih", prefix), &mut self.b_ih, &gradients.b_ih);
        optimizer.update(&format!("{}_b_hh", prefix), &mut self.b_hh, &gradients.b_hh);
    }

    pub fn num_parameters(&self) -> usize {
        self.w_ih.len() + self.w_hh.len() + self.b_ih.len() + self.b_hh.len()
    }
}
