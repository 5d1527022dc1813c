//! Parameter update rules. Parameters are addressed by string id so one
//! optimizer instance can keep per-parameter moments for the whole model.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub trait Optimizer {
    /// Called once per training step, before the parameter updates of that step
    fn begin_step(&mut self) {}
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>);
    fn reset(&mut self);
    fn name(&self) -> &'static str;
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn begin_step(&mut self) {
        (**self).begin_step()
    }

    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        (**self).update(param_id, param, gradient)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Optimizer selection as it appears in configuration files
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Sgd,
    #[default]
    Adam,
    RMSprop,
}

impl OptimizerKind {
    pub fn build(self, learning_rate: f64) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::Sgd => Box::new(SGD::new(learning_rate)),
            OptimizerKind::Adam => Box::new(Adam::new(learning_rate)),
            OptimizerKind::RMSprop => Box::new(RMSprop::new(learning_rate)),
        }
    }
}

/// Stochastic Gradient Descent: θ = θ - η∇θ
pub struct SGD {
    learning_rate: f64,
}

impl SGD {
    pub fn new(learning_rate: f64) -> Self {
        SGD { learning_rate }
    }
}

impl Optimizer for SGD {
    fn update(&mut self, _param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        param.scaled_add(-self.learning_rate, gradient);
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "SGD"
    }
}

/// Adam optimizer with adaptive learning rates
///
/// Implements: m_t = β₁m_{t-1} + (1-β₁)g_t
///             v_t = β₂v_{t-1} + (1-β₂)g_t²
///             θ_t = θ_{t-1} - η * m̂_t / (√v̂_t + ε)
/// where m̂_t and v̂_t are bias-corrected estimates and t counts training steps
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: i32,
    m: HashMap<String, Array2<f64>>, // first moment estimates
    v: HashMap<String, Array2<f64>>, // second moment estimates
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Adam::with_params(learning_rate, 0.9, 0.999, 1e-8)
    }

    pub fn with_params(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: HashMap::new(),
            v: HashMap::new(),
        }
    }
}

impl Optimizer for Adam {
    fn begin_step(&mut self) {
        self.t += 1;
    }

    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        let t = self.t.max(1);

        let m_t = self.m.entry(param_id.to_string())
            .or_insert_with(|| Array2::zeros(param.raw_dim()));
        *m_t = self.beta1 * &*m_t + (1.0 - self.beta1) * gradient;
        let m_hat = &*m_t / (1.0 - self.beta1.powi(t));

        let v_t = self.v.entry(param_id.to_string())
            .or_insert_with(|| Array2::zeros(param.raw_dim()));
        *v_t = self.beta2 * &*v_t + (1.0 - self.beta2) * &(gradient * gradient);
        let v_hat = &*v_t / (1.0 - self.beta2.powi(t));

        let update = self.learning_rate * m_hat / (v_hat.mapv(f64::sqrt) + self.epsilon);
        *param -= &update;
    }

    fn reset(&mut self) {
        self.t = 0;
        self.m.clear();
        self.v.clear();
    }

    fn name(&self) -> &'static str {
        "Adam"
    }
}

/// RMSprop: v_t = αv_{t-1} + (1-α)g_t²
///          θ_t = θ_{t-1} - η * g_t / √(v_t + ε)
pub struct RMSprop {
    learning_rate: f64,
    alpha: f64, // decay rate for moving average
    epsilon: f64,
    v: HashMap<String, Array2<f64>>, // running average of squared gradients
}

impl RMSprop {
    pub fn new(learning_rate: f64) -> Self {
        RMSprop::with_params(learning_rate, 0.99, 1e-8)
    }

    pub fn with_params(learning_rate: f64, alpha: f64, epsilon: f64) -> Self {
        RMSprop {
            learning_rate,
            alpha,
            epsilon,
            v: HashMap::new(),
        }
    }
}

impl Optimizer for RMSprop {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        let v_t = self.v.entry(param_id.to_string())
            .or_insert_with(|| Array2::zeros(param.raw_dim()));

        *v_t = self.alpha * &*v_t + (1.0 - self.alpha) * &(gradient * gradient);

        let update = self.learning_rate * gradient / (v_t.mapv(f64::sqrt) + self.epsilon);
        *param -= &update;
    }

    fn reset(&mut self) {
        self.v.clear();
    }

    fn name(&self) -> &'static str {
        "RMSprop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_sgd_step() {
        let mut optimizer = SGD::new(0.1);
        let mut param = arr2(&[[1.0, 2.0]]);

        optimizer.update("lstm_cell_w_ih", &mut param, &arr2(&[[0.5, -1.0]]));

        assert!((param[[0, 0]] - 0.95).abs() < 1e-12);
        assert!((param[[0, 1]] - 2.1).abs() < 1e-12);
    }

    #[test]
    fn test_adam_first_step_moves_by_learning_rate() {
        let mut optimizer = Adam::new(0.01);
        let mut param = arr2(&[[1.0, -1.0]]);
        let gradient = arr2(&[[0.5, -2.0]]);

        optimizer.begin_step();
        optimizer.update("p", &mut param, &gradient);

        // Bias-corrected first step is η * sign(g)
        assert!((param[[0, 0]] - 0.99).abs() < 1e-6);
        assert!((param[[0, 1]] + 0.99).abs() < 1e-6);
    }

    #[test]
    fn test_adam_step_counter_is_per_step() {
        let mut optimizer = Adam::new(0.01);
        let mut a = arr2(&[[0.0]]);
        let mut b = arr2(&[[0.0]]);
        let gradient = arr2(&[[1.0]]);

        optimizer.begin_step();
        optimizer.update("a", &mut a, &gradient);
        optimizer.update("b", &mut b, &gradient);

        // Both parameters see the same bias correction within one step
        assert!((a[[0, 0]] - b[[0, 0]]).abs() < 1e-12);
    }

    #[test]
    fn test_rmsprop_reset_forgets_moments() {
        let mut optimizer = RMSprop::new(0.01);
        let gradient = arr2(&[[0.3]]);

        let mut first = arr2(&[[1.0]]);
        optimizer.update("p", &mut first, &gradient);
        optimizer.reset();
        let mut again = arr2(&[[1.0]]);
        optimizer.update("p", &mut again, &gradient);

        assert!(first[[0, 0]] < 1.0);
        assert_eq!(first, again);
    }

    #[test]
    fn test_optimizer_kind_builds_boxed() {
        let mut optimizer = OptimizerKind::RMSprop.build(0.1);
        assert_eq!(optimizer.name(), "RMSprop");

        let mut param = arr2(&[[1.0]]);
        optimizer.begin_step();
        optimizer.update("p", &mut param, &arr2(&[[1.0]]));
        assert!(param[[0, 0]] < 1.0);
    }

    #[test]
    fn test_optimizer_kind_serde_names() {
        let kind: OptimizerKind = serde_json::from_str("\"rmsprop\"").unwrap();
        assert_eq!(kind, OptimizerKind::RMSprop);
        assert_eq!(serde_json::to_string(&OptimizerKind::Sgd).unwrap(), "\"sgd\"");
    }
}
