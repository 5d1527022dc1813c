//! Sequential state-space contract consumed by the driver.
//!
//! A model exposes a start state and step functions. The driver threads the
//! state value through them one time step at a time: a prediction step
//! advances to the next time, and a filtering step folds in the observation
//! for that time when one exists. Gaps in the record go through the
//! imputation step.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::{ForecastError, Result};
use crate::normalizer::InputStatistics;

/// Output of a single step.
#[derive(Clone, Debug, PartialEq)]
pub struct Predictions {
    /// Predicted value for the step, on the original scale.
    pub mean: Array1<f64>,
    /// Squared error of the prediction on the normalized scale. Set by filtering.
    pub loss: Option<f64>,
}

impl Predictions {
    pub fn new(mean: Array1<f64>) -> Self {
        Predictions { mean, loss: None }
    }
}

pub trait StateSpaceModel {
    /// Per-sequence state, threaded by value between step calls.
    type State: Clone;

    fn num_features(&self) -> usize;

    /// Output names emitted while training.
    fn train_output_names(&self) -> &'static [&'static str];

    /// Output names emitted while forecasting.
    fn predict_output_names(&self) -> &'static [&'static str];

    /// Must run before any stepping.
    fn initialize_graph(&mut self, input_statistics: InputStatistics);

    fn get_start_state(&self) -> Result<Self::State>;

    /// Folds the observation at `current_time` into `state`. `predictions`
    /// holds the prediction step output for the same time.
    fn filtering_step(
        &self,
        current_time: i64,
        current_values: ArrayView1<f64>,
        state: Self::State,
        predictions: Predictions,
    ) -> Result<(Self::State, Predictions)>;

    /// Advances `state` to `current_time` without an observation.
    fn prediction_step(&self, current_time: i64, state: &Self::State) -> Result<(Self::State, Predictions)>;

    fn imputation_step(&self, current_time: i64, state: Self::State) -> Self::State;

    fn exogenous_input_step(
        &self,
        current_time: i64,
        current_exogenous_regressors: ArrayView1<f64>,
        state: Self::State,
    ) -> Result<Self::State>;
}

/// Result of threading a model through an observed series.
#[derive(Clone, Debug)]
pub struct FilterOutput<S> {
    /// One-step-ahead means, shape `(len, num_features)`.
    pub mean: Array2<f64>,
    /// Average filtering loss.
    pub loss: f64,
    pub end_state: S,
}

/// Runs prediction then filtering at every observed time, starting from the
/// model's start state.
pub fn filter_series<M: StateSpaceModel>(
    model: &M,
    times: &[i64],
    values: ArrayView2<f64>,
) -> Result<FilterOutput<M::State>> {
    if times.is_empty() {
        return Err(ForecastError::EmptySeries);
    }
    if values.nrows() != times.len() {
        return Err(ForecastError::ShapeMismatch {
            what: "observations",
            expected: times.len(),
            actual: values.nrows(),
        });
    }

    let mut state = model.get_start_state()?;
    let mut mean = Array2::zeros((times.len(), model.num_features()));
    let mut total_loss = 0.0;
    let mut previous: Option<i64> = None;

    for (i, (&time, observed)) in times.iter().zip(values.rows()).enumerate() {
        if let Some(previous) = previous {
            if time <= previous {
                return Err(ForecastError::UnorderedTimes { previous, current: time });
            }
            if time > previous + 1 {
                tracing::debug!(from = previous, to = time, "imputing gap in observations");
                for missing in previous + 1..time {
                    state = model.imputation_step(missing, state);
                }
            }
        }

        let (predicted, predictions) = model.prediction_step(time, &state)?;
        mean.row_mut(i).assign(&predictions.mean);

        let (filtered, predictions) = model.filtering_step(time, observed, predicted, predictions)?;
        total_loss += predictions.loss.unwrap_or(0.0);

        state = filtered;
        previous = Some(time);
    }

    Ok(FilterOutput {
        mean,
        loss: total_loss / times.len() as f64,
        end_state: state,
    })
}

/// Chains prediction steps over `times`, feeding each prediction into the next.
pub fn predict_continuation<M: StateSpaceModel>(
    model: &M,
    state: &M::State,
    times: &[i64],
) -> Result<(Array2<f64>, M::State)> {
    let mut mean = Array2::zeros((times.len(), model.num_features()));
    let mut state = state.clone();

    for (i, &time) in times.iter().enumerate() {
        let (next, predictions) = model.prediction_step(time, &state)?;
        mean.row_mut(i).assign(&predictions.mean);
        state = next;
    }

    Ok((mean, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};
    use std::cell::Cell;

    /// Predicts the last observed value; counts imputation calls.
    struct LastValue {
        imputed: Cell<usize>,
    }

    impl StateSpaceModel for LastValue {
        type State = (i64, f64);

        fn num_features(&self) -> usize {
            1
        }

        fn train_output_names(&self) -> &'static [&'static str] {
            &["mean"]
        }

        fn predict_output_names(&self) -> &'static [&'static str] {
            &["mean"]
        }

        fn initialize_graph(&mut self, _input_statistics: InputStatistics) {}

        fn get_start_state(&self) -> Result<Self::State> {
            Ok((0, 0.0))
        }

        fn filtering_step(
            &self,
            current_time: i64,
            current_values: ArrayView1<f64>,
            state: Self::State,
            mut predictions: Predictions,
        ) -> Result<(Self::State, Predictions)> {
            if current_time != state.0 {
                return Err(ForecastError::TimeMismatch { state_time: state.0, current_time });
            }
            let err = state.1 - current_values[0];
            predictions.loss = Some(err * err);
            Ok(((current_time, current_values[0]), predictions))
        }

        fn prediction_step(&self, current_time: i64, state: &Self::State) -> Result<(Self::State, Predictions)> {
            Ok(((current_time, state.1), Predictions::new(arr1(&[state.1]))))
        }

        fn imputation_step(&self, _current_time: i64, state: Self::State) -> Self::State {
            self.imputed.set(self.imputed.get() + 1);
            state
        }

        fn exogenous_input_step(&self, _: i64, _: ArrayView1<f64>, _: Self::State) -> Result<Self::State> {
            Err(ForecastError::NotImplemented("exogenous inputs"))
        }
    }

    #[test]
    fn test_filter_series_one_step_ahead() {
        let model = LastValue { imputed: Cell::new(0) };
        let values = arr2(&[[1.0], [3.0], [6.0]]);

        let out = filter_series(&model, &[1, 2, 3], values.view()).unwrap();

        assert_eq!(out.mean, arr2(&[[0.0], [1.0], [3.0]]));
        assert!((out.loss - (1.0 + 4.0 + 9.0) / 3.0).abs() < 1e-12);
        assert_eq!(out.end_state, (3, 6.0));
        assert_eq!(model.imputed.get(), 0);
    }

    #[test]
    fn test_filter_series_imputes_gaps() {
        let model = LastValue { imputed: Cell::new(0) };
        let values = arr2(&[[1.0], [2.0]]);

        filter_series(&model, &[1, 4], values.view()).unwrap();

        assert_eq!(model.imputed.get(), 2);
    }

    #[test]
    fn test_filter_series_rejects_unordered_times() {
        let model = LastValue { imputed: Cell::new(0) };
        let values = arr2(&[[1.0], [2.0]]);

        let err = filter_series(&model, &[5, 5], values.view()).unwrap_err();
        assert!(matches!(err, ForecastError::UnorderedTimes { previous: 5, current: 5 }));
    }

    #[test]
    fn test_filter_series_rejects_empty() {
        let model = LastValue { imputed: Cell::new(0) };
        let values = Array2::<f64>::zeros((0, 1));
        assert!(matches!(filter_series(&model, &[], values.view()), Err(ForecastError::EmptySeries)));
    }

    #[test]
    fn test_predict_continuation_chains() {
        let model = LastValue { imputed: Cell::new(0) };

        let (mean, state) = predict_continuation(&model, &(10, 7.0), &[11, 12, 13]).unwrap();

        assert_eq!(mean, arr2(&[[7.0], [7.0], [7.0]]));
        assert_eq!(state, (13, 7.0));
    }
}
