use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;

use crate::config::TrainingConfig;
use crate::data::TimeSeries;
use crate::error::{ForecastError, Result};
use crate::models::sequence_model::{LSTMSequenceModel, ModelState};
use crate::normalizer::InputStatistics;
use crate::optimizers::{Adam, Optimizer};
use crate::state_space::{filter_series, predict_continuation, StateSpaceModel};

/// Training metrics tracked during training
#[derive(Debug, Clone)]
pub struct TrainingMetrics {
    pub step: usize,
    pub train_loss: f64,
    /// Global gradient norm before clipping
    pub gradient_norm: f64,
    pub time_elapsed: f64,
}

/// One-step-ahead fit of the whole observed series
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub times: Vec<i64>,
    pub observed: Array2<f64>,
    pub mean: Array2<f64>,
    pub loss: f64,
    /// State after the last observation; the starting point of a continuation
    pub end_state: ModelState,
}

/// Continuation forecast past the end of an evaluation
#[derive(Debug, Clone)]
pub struct Forecast {
    pub times: Vec<i64>,
    pub mean: Array2<f64>,
}

/// Trains, evaluates and forecasts with an [`LSTMSequenceModel`]
pub struct TimeSeriesRegressor<O: Optimizer> {
    pub model: LSTMSequenceModel,
    pub optimizer: O,
    pub config: TrainingConfig,
    pub metrics_history: Vec<TrainingMetrics>,
    rng: StdRng,
}

impl<O: Optimizer> TimeSeriesRegressor<O> {
    pub fn new(model: LSTMSequenceModel, optimizer: O) -> Self {
        Self::with_config(model, optimizer, TrainingConfig::default())
    }

    pub fn with_config(model: LSTMSequenceModel, optimizer: O, config: TrainingConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        TimeSeriesRegressor {
            model,
            optimizer,
            config,
            metrics_history: Vec::new(),
            rng,
        }
    }

    /// Computes input statistics from `series` the first time the model is used
    fn ensure_initialized(&mut self, series: &TimeSeries) -> Result<()> {
        if self.model.is_initialized() {
            return Ok(());
        }
        if series.num_features() != self.model.num_features() {
            return Err(ForecastError::ShapeMismatch {
                what: "series features",
                expected: self.model.num_features(),
                actual: series.num_features(),
            });
        }
        let statistics = InputStatistics::from_values(series.values())?;
        self.model.initialize_graph(statistics);
        Ok(())
    }

    /// Runs `steps` optimizer steps over random windows of `series`
    pub fn train(&mut self, series: &TimeSeries, steps: usize) -> Result<()> {
        if series.is_empty() {
            return Err(ForecastError::EmptySeries);
        }
        if self.config.batch_size == 0 || self.config.window_size == 0 || self.config.log_every == 0 {
            return Err(ForecastError::Config(
                "batch_size, window_size and log_every must be positive".to_string(),
            ));
        }
        self.ensure_initialized(series)?;

        tracing::info!(
            steps,
            batch_size = self.config.batch_size,
            window_size = self.config.window_size,
            optimizer = self.optimizer.name(),
            parameters = self.model.num_parameters(),
            "starting training"
        );

        for _ in 0..steps {
            let start_time = Instant::now();
            let step = self.metrics_history.len();

            let windows = series.random_windows(&mut self.rng, self.config.batch_size, self.config.window_size);
            let scale = 1.0 / windows.len() as f64;

            let mut batch_loss = 0.0;
            let mut gradients = self.model.zero_gradients()?;
            for window in &windows {
                let (loss, window_gradients) = self.model.window_gradients(window.times, window.values)?;
                batch_loss += loss * scale;
                gradients.add_scaled(&window_gradients, scale);
            }

            // Clip gradients by global norm to prevent exploding gradients
            let gradient_norm = match self.config.clip_gradient {
                Some(max_norm) => gradients.clip_global_norm(max_norm),
                None => gradients.global_norm(),
            };

            self.optimizer.begin_step();
            self.model.apply_gradients(&gradients, &mut self.optimizer)?;

            let metrics = TrainingMetrics {
                step,
                train_loss: batch_loss,
                gradient_norm,
                time_elapsed: start_time.elapsed().as_secs_f64(),
            };
            if step % self.config.log_every == 0 {
                tracing::info!(step, loss = metrics.train_loss, gradient_norm, "training");
            }
            self.metrics_history.push(metrics);
        }

        tracing::info!(
            total_steps = self.metrics_history.len(),
            final_loss = self.get_latest_metrics().map(|m| m.train_loss),
            "training completed"
        );
        Ok(())
    }

    /// One-step-ahead predictions over the whole series
    pub fn evaluate(&mut self, series: &TimeSeries) -> Result<Evaluation> {
        self.ensure_initialized(series)?;

        let output = filter_series(&self.model, series.times(), series.values())?;
        tracing::info!(observations = series.len(), loss = output.loss, "evaluation");

        Ok(Evaluation {
            times: series.times().to_vec(),
            observed: series.values().to_owned(),
            mean: output.mean,
            loss: output.loss,
            end_state: output.end_state,
        })
    }

    /// Forecast `steps` consecutive times after the end of `evaluation`
    pub fn predict(&self, evaluation: &Evaluation, steps: usize) -> Result<Forecast> {
        let last_time = evaluation.end_state.last_time;
        let times: Vec<i64> = (1..=steps as i64).map(|offset| last_time + offset).collect();

        let (mean, _) = predict_continuation(&self.model, &evaluation.end_state, &times)?;
        tracing::info!(from = last_time + 1, steps, "forecast");

        Ok(Forecast { times, mean })
    }

    pub fn get_latest_metrics(&self) -> Option<&TrainingMetrics> {
        self.metrics_history.last()
    }

    pub fn get_metrics_history(&self) -> &[TrainingMetrics] {
        &self.metrics_history
    }
}

/// Regressor with the Adam optimizer and default training settings
pub fn create_adam_regressor(model: LSTMSequenceModel, learning_rate: f64) -> TimeSeriesRegressor<Adam> {
    TimeSeriesRegressor::new(model, Adam::new(learning_rate))
}
