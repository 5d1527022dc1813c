use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::{ForecastError, Result};
use crate::layers::linear::{LinearGradients, LinearLayer};
use crate::layers::lstm_cell::{LSTMCell, LSTMCellCache, LSTMCellGradients, LSTMState};
use crate::loss::{LossFunction, MSELoss};
use crate::normalizer::InputStatistics;
use crate::optimizers::Optimizer;
use crate::state_space::{Predictions, StateSpaceModel};
use crate::utils::{from_column, squared_norm, to_column};

const OUTPUT_NAMES: &[&str] = &["mean"];

/// State of one sequence between step calls
#[derive(Clone, Debug, PartialEq)]
pub struct ModelState {
    /// Time of the most recent update
    pub last_time: i64,
    /// Normalized last observation, or the last prediction when forecasting
    pub last_value_or_prediction: Array1<f64>,
    /// Recurrent carry; only prediction steps advance it
    pub lstm_state: LSTMState,
}

/// Parameters created by `initialize_graph`, then reused for every step
#[derive(Clone, Debug)]
struct Components {
    cell: LSTMCell,
    projector: LinearLayer,
    statistics: InputStatistics,
}

/// Intermediate values of one prediction step, kept for backpropagation
#[derive(Clone, Debug)]
struct StepCache {
    cell: LSTMCellCache,
    prediction: Array2<f64>,
    target: Array2<f64>,
}

/// Gradients for every trainable parameter of the sequence model
#[derive(Clone, Debug)]
pub struct SequenceModelGradients {
    pub cell: LSTMCellGradients,
    pub projector: LinearGradients,
}

impl SequenceModelGradients {
    /// `self += scale * other`
    pub fn add_scaled(&mut self, other: &SequenceModelGradients, scale: f64) {
        self.cell.add_scaled(&other.cell, scale);
        self.projector.add_scaled(&other.projector, scale);
    }

    pub fn global_norm(&self) -> f64 {
        let cell = &self.cell;
        let projector = &self.projector;
        (squared_norm(&cell.w_ih)
            + squared_norm(&cell.w_hh)
            + squared_norm(&cell.b_ih)
            + squared_norm(&cell.b_hh)
            + squared_norm(&projector.weight)
            + squared_norm(&projector.bias))
            .sqrt()
    }

    /// Rescales all gradients so their global norm is at most `max_norm`.
    /// Returns the norm before clipping.
    pub fn clip_global_norm(&mut self, max_norm: f64) -> f64 {
        let norm = self.global_norm();
        if norm > max_norm && norm > 0.0 {
            let scale = max_norm / norm;
            for matrix in self.cell.matrices_mut() {
                *matrix *= scale;
            }
            for matrix in self.projector.matrices_mut() {
                *matrix *= scale;
            }
        }
        norm
    }
}

/// Single-layer LSTM forecaster driven through the state-space step functions
///
/// Each prediction step feeds the last normalized value (observed or
/// predicted) through the LSTM cell and projects the hidden output to the
/// next normalized value. Filtering replaces that value with the normalized
/// observation and scores the prediction; the recurrent carry is left alone.
#[derive(Clone, Debug)]
pub struct LSTMSequenceModel {
    num_units: usize,
    num_features: usize,
    seed: Option<u64>,
    components: Option<Components>,
}

impl LSTMSequenceModel {
    pub fn new(num_units: usize, num_features: usize) -> Self {
        LSTMSequenceModel {
            num_units,
            num_features,
            seed: None,
            components: None,
        }
    }

    /// Draw initial parameters from a seeded generator
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn num_units(&self) -> usize {
        self.num_units
    }

    pub fn is_initialized(&self) -> bool {
        self.components.is_some()
    }

    pub fn input_statistics(&self) -> Option<&InputStatistics> {
        self.components.as_ref().map(|c| &c.statistics)
    }

    pub fn num_parameters(&self) -> usize {
        self.components
            .as_ref()
            .map(|c| c.cell.num_parameters() + c.projector.num_parameters())
            .unwrap_or(0)
    }

    fn components(&self) -> Result<&Components> {
        self.components.as_ref().ok_or(ForecastError::Uninitialized)
    }

    fn check_features(&self, what: &'static str, actual: usize) -> Result<()> {
        if actual != self.num_features {
            return Err(ForecastError::ShapeMismatch { what, expected: self.num_features, actual });
        }
        Ok(())
    }

    fn predict_with_cache(&self, current_time: i64, state: &ModelState) -> Result<(ModelState, Predictions, LSTMCellCache)> {
        let components = self.components()?;
        self.check_features("state value", state.last_value_or_prediction.len())?;

        let input = to_column(state.last_value_or_prediction.view());
        let hx = to_column(state.lstm_state.hidden.view());
        let cx = to_column(state.lstm_state.memory.view());

        let (hy, cy, cache) = components.cell.forward_with_cache(&input, &hx, &cx);
        let next_prediction = from_column(components.projector.forward(&hy).view());
        let mean = components.statistics.de_transform(next_prediction.view());

        let new_state = ModelState {
            last_time: current_time,
            last_value_or_prediction: next_prediction,
            lstm_state: LSTMState::from_batch(&cy, &hy, 0),
        };

        Ok((new_state, Predictions::new(mean), cache))
    }

    /// Loss and parameter gradients for one training window
    ///
    /// Starts from a fresh state and runs a prediction step followed by a
    /// filtering step at every time, then backpropagates the average
    /// filtering loss through time. Observations enter as constants. Gaps
    /// and ordering are handled as in [`filter_series`], so a window and an
    /// evaluation over the same observations see the same states.
    ///
    /// [`filter_series`]: crate::state_space::filter_series
    pub fn window_gradients(&self, times: &[i64], values: ArrayView2<f64>) -> Result<(f64, SequenceModelGradients)> {
        let components = self.components()?;
        if times.is_empty() {
            return Err(ForecastError::EmptySeries);
        }
        if values.nrows() != times.len() {
            return Err(ForecastError::ShapeMismatch {
                what: "window observations",
                expected: times.len(),
                actual: values.nrows(),
            });
        }

        let mut state = self.get_start_state()?;
        let mut caches = Vec::with_capacity(times.len());
        let mut total_loss = 0.0;

        let mut previous: Option<i64> = None;

        for (&time, observed) in times.iter().zip(values.rows()) {
            if let Some(previous) = previous {
                if time <= previous {
                    return Err(ForecastError::UnorderedTimes { previous, current: time });
                }
                for missing in previous + 1..time {
                    state = self.imputation_step(missing, state);
                }
            }
            previous = Some(time);

            let (predicted, predictions, cell_cache) = self.predict_with_cache(time, &state)?;
            let prediction = to_column(predicted.last_value_or_prediction.view());

            let (filtered, predictions) = self.filtering_step(time, observed, predicted, predictions)?;
            total_loss += predictions.loss.unwrap_or(0.0);

            caches.push(StepCache {
                cell: cell_cache,
                prediction,
                target: to_column(filtered.last_value_or_prediction.view()),
            });
            state = filtered;
        }

        let steps = times.len() as f64;
        let mut gradients = self.zero_gradients()?;

        // BPTT: hidden and memory gradients flow backwards through the carries
        let mut dh_next = Array2::<f64>::zeros((self.num_units, 1));
        let mut dc_next = Array2::<f64>::zeros((self.num_units, 1));

        for cache in caches.iter().rev() {
            let dprediction = MSELoss.compute_gradient(&cache.prediction, &cache.target) / steps;
            let (projector_gradients, dh_projector) = components.projector.backward(&cache.cell.hy, &dprediction);
            gradients.projector.add_scaled(&projector_gradients, 1.0);

            let dh = dh_projector + &dh_next;
            let (cell_gradients, _dx, dhx, dcx) = components.cell.backward(&dh, &dc_next, &cache.cell);
            gradients.cell.add_scaled(&cell_gradients, 1.0);

            dh_next = dhx;
            dc_next = dcx;
        }

        Ok((total_loss / steps, gradients))
    }

    /// Zero gradients for accumulation
    pub fn zero_gradients(&self) -> Result<SequenceModelGradients> {
        let components = self.components()?;
        Ok(SequenceModelGradients {
            cell: components.cell.zero_gradients(),
            projector: components.projector.zero_gradients(),
        })
    }

    /// Apply gradients using the provided optimizer
    pub fn apply_gradients<O: Optimizer + ?Sized>(&mut self, gradients: &SequenceModelGradients, optimizer: &mut O) -> Result<()> {
        let components = self.components.as_mut().ok_or(ForecastError::Uninitialized)?;
        components.cell.update_parameters(&gradients.cell, optimizer, "lstm_cell");
        components.projector.update_parameters(&gradients.projector, optimizer, "predict_from_lstm_output");
        Ok(())
    }
}

impl StateSpaceModel for LSTMSequenceModel {
    type State = ModelState;

    fn num_features(&self) -> usize {
        self.num_features
    }

    fn train_output_names(&self) -> &'static [&'static str] {
        OUTPUT_NAMES
    }

    fn predict_output_names(&self) -> &'static [&'static str] {
        OUTPUT_NAMES
    }

    fn initialize_graph(&mut self, input_statistics: InputStatistics) {
        match self.components.as_mut() {
            Some(components) => {
                tracing::debug!("reusing existing LSTM parameters");
                components.statistics = input_statistics;
            }
            None => {
                let mut rng = match self.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                let cell = LSTMCell::with_rng(self.num_features, self.num_units, &mut rng);
                let projector = LinearLayer::with_rng(self.num_units, self.num_features, &mut rng);
                tracing::debug!(
                    num_units = self.num_units,
                    num_features = self.num_features,
                    parameters = cell.num_parameters() + projector.num_parameters(),
                    "created LSTM sequence model parameters"
                );
                self.components = Some(Components { cell, projector, statistics: input_statistics });
            }
        }
    }

    fn get_start_state(&self) -> Result<ModelState> {
        let components = self.components()?;
        let (memory, hidden) = components.cell.zero_state(1);

        Ok(ModelState {
            last_time: 0,
            last_value_or_prediction: Array1::zeros(self.num_features),
            lstm_state: LSTMState::from_batch(&memory, &hidden, 0),
        })
    }

    fn filtering_step(
        &self,
        current_time: i64,
        current_values: ArrayView1<f64>,
        state: ModelState,
        mut predictions: Predictions,
    ) -> Result<(ModelState, Predictions)> {
        if current_time != state.last_time {
            return Err(ForecastError::TimeMismatch { state_time: state.last_time, current_time });
        }
        self.check_features("observation", current_values.len())?;
        let components = self.components()?;

        let transformed = components.statistics.transform(current_values);
        predictions.loss = Some(MSELoss.compute_loss(
            &to_column(state.last_value_or_prediction.view()),
            &to_column(transformed.view()),
        ));

        let new_state = ModelState {
            last_time: current_time,
            last_value_or_prediction: transformed,
            lstm_state: state.lstm_state,
        };
        Ok((new_state, predictions))
    }

    fn prediction_step(&self, current_time: i64, state: &ModelState) -> Result<(ModelState, Predictions)> {
        let (new_state, predictions, _) = self.predict_with_cache(current_time, state)?;
        Ok((new_state, predictions))
    }

    fn imputation_step(&self, _current_time: i64, state: ModelState) -> ModelState {
        state
    }

    fn exogenous_input_step(
        &self,
        _current_time: i64,
        _current_exogenous_regressors: ArrayView1<f64>,
        _state: ModelState,
    ) -> Result<ModelState> {
        Err(ForecastError::NotImplemented("exogenous inputs are not supported by the LSTM sequence model"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    fn initialized(num_units: usize, seed: u64) -> LSTMSequenceModel {
        let mut model = LSTMSequenceModel::new(num_units, 1).with_seed(seed);
        model.initialize_graph(InputStatistics::new(arr1(&[2.0]), arr1(&[4.0])).unwrap());
        model
    }

    fn window_loss(model: &LSTMSequenceModel, times: &[i64], values: &Array2<f64>) -> f64 {
        model.window_gradients(times, values.view()).unwrap().0
    }

    #[test]
    fn test_output_names() {
        let model = LSTMSequenceModel::new(4, 1);
        assert_eq!(model.train_output_names(), &["mean"]);
        assert_eq!(model.predict_output_names(), &["mean"]);
    }

    #[test]
    fn test_uninitialized_model_fails() {
        let model = LSTMSequenceModel::new(4, 1);
        assert!(matches!(model.get_start_state(), Err(ForecastError::Uninitialized)));
    }

    #[test]
    fn test_filtering_replaces_value_and_keeps_memory() {
        let model = initialized(3, 1);
        let start = model.get_start_state().unwrap();
        let (predicted, predictions) = model.prediction_step(1, &start).unwrap();

        let (filtered, predictions) = model
            .filtering_step(1, arr1(&[6.0]).view(), predicted.clone(), predictions)
            .unwrap();

        assert_eq!(filtered.last_time, 1);
        assert!((filtered.last_value_or_prediction[0] - 1.0).abs() < 1e-12);
        assert_eq!(filtered.lstm_state, predicted.lstm_state);

        let err = predicted.last_value_or_prediction[0] - 1.0;
        assert!((predictions.loss.unwrap() - err * err).abs() < 1e-12);
    }

    #[test]
    fn test_prediction_reports_original_scale() {
        let model = initialized(3, 2);
        let start = model.get_start_state().unwrap();
        let (next, predictions) = model.prediction_step(1, &start).unwrap();

        let normalized = next.last_value_or_prediction[0];
        assert!((predictions.mean[0] - (normalized * 4.0 + 2.0)).abs() < 1e-12);
        assert!(predictions.loss.is_none());
    }

    #[test]
    fn test_feature_count_checked() {
        let model = initialized(3, 3);
        let start = model.get_start_state().unwrap();
        let (predicted, predictions) = model.prediction_step(1, &start).unwrap();

        let err = model
            .filtering_step(1, arr1(&[1.0, 2.0]).view(), predicted, predictions)
            .unwrap_err();
        assert!(matches!(err, ForecastError::ShapeMismatch { expected: 1, actual: 2, .. }));
    }

    #[test]
    fn test_window_gradients_match_finite_differences() {
        let model = initialized(4, 11);
        let times = [1, 2, 3, 4, 5];
        let values = arr2(&[[1.0], [2.5], [2.0], [4.0], [3.5]]);

        let (_, gradients) = model.window_gradients(&times, values.view()).unwrap();

        let eps = 1e-6;
        let check = |analytic: f64, perturb: &dyn Fn(&mut Components, f64)| {
            let mut plus = model.clone();
            perturb(plus.components.as_mut().unwrap(), eps);
            let mut minus = model.clone();
            perturb(minus.components.as_mut().unwrap(), -eps);

            let numeric = (window_loss(&plus, &times, &values) - window_loss(&minus, &times, &values)) / (2.0 * eps);
            assert!(
                (numeric - analytic).abs() <= 1e-6 + 1e-4 * numeric.abs(),
                "numeric {} vs analytic {}", numeric, analytic
            );
        };

        check(gradients.projector.bias[[0, 0]], &|c, e| c.projector.bias[[0, 0]] += e);
        check(gradients.projector.weight[[0, 2]], &|c, e| c.projector.weight[[0, 2]] += e);
        check(gradients.cell.w_ih[[5, 0]], &|c, e| c.cell.w_ih[[5, 0]] += e);
        check(gradients.cell.w_hh[[9, 1]], &|c, e| c.cell.w_hh[[9, 1]] += e);
        check(gradients.cell.b_hh[[14, 0]], &|c, e| c.cell.b_hh[[14, 0]] += e);
    }

    #[test]
    fn test_training_lowers_window_loss() {
        let mut model = initialized(8, 5);
        let times = [1, 2, 3, 4, 5, 6];
        let values = arr2(&[[1.0], [3.0], [1.0], [3.0], [1.0], [3.0]]);
        let mut optimizer = crate::optimizers::Adam::new(0.01);

        let before = window_loss(&model, &times, &values);
        for _ in 0..100 {
            let (_, gradients) = model.window_gradients(&times, values.view()).unwrap();
            optimizer.begin_step();
            model.apply_gradients(&gradients, &mut optimizer).unwrap();
        }
        let after = window_loss(&model, &times, &values);

        assert!(after < before, "loss went from {} to {}", before, after);
    }

    #[test]
    fn test_window_matches_evaluation_across_gaps() {
        let model = initialized(4, 6);
        let times = [1, 2, 5, 6];
        let values = arr2(&[[1.0], [3.0], [2.0], [4.0]]);

        let (loss, _) = model.window_gradients(&times, values.view()).unwrap();
        let evaluated = crate::state_space::filter_series(&model, &times, values.view()).unwrap();

        assert!((loss - evaluated.loss).abs() < 1e-12);
    }

    #[test]
    fn test_window_rejects_unordered_times() {
        let model = initialized(4, 7);
        let values = arr2(&[[1.0], [2.0], [3.0]]);

        let err = model.window_gradients(&[1, 3, 3], values.view()).unwrap_err();
        assert!(matches!(err, ForecastError::UnorderedTimes { previous: 3, current: 3 }));
    }

    #[test]
    fn test_clip_global_norm() {
        let model = initialized(2, 4);
        let times = [1, 2];
        let values = arr2(&[[100.0], [-100.0]]);
        let (_, mut gradients) = model.window_gradients(&times, values.view()).unwrap();

        let before = gradients.clip_global_norm(1e-3);
        assert!(before > 1e-3);
        assert!((gradients.global_norm() - 1e-3).abs() < 1e-9);
    }
}
