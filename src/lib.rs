//! # LSTM Forecast
//!
//! A single-layer LSTM forecaster for time series, driven through a
//! sequential state-space interface.
//!
//! ## Core Components
//!
//! - **State-space contract**: start state, prediction, filtering, imputation and exogenous steps
//! - **Sequence model**: LSTM cell plus linear projection over normalized values
//! - **Normalizer**: per-feature mean/variance scaling and its inverse
//! - **Estimator**: windowed training with BPTT, one-step-ahead evaluation and continuation forecasts
//! - **Optimizers**: SGD, Adam, and RMSprop
//! - **Data and plotting**: CSV loading and a bitmap chart of the forecast
//!
//! ## Quick Start
//!
//! ```rust
//! use lstm_forecast::{LSTMSequenceModel, TimeSeries, TimeSeriesRegressor, Adam};
//! use lstm_forecast::config::TrainingConfig;
//!
//! let times: Vec<i64> = (0..40).collect();
//! let values: Vec<f64> = times.iter().map(|&t| t as f64).collect();
//! let series = TimeSeries::univariate(times, values).unwrap();
//!
//! let model = LSTMSequenceModel::new(8, 1).with_seed(7);
//! let config = TrainingConfig { seed: Some(7), ..TrainingConfig::default() };
//! let mut regressor = TimeSeriesRegressor::with_config(model, Adam::new(0.01), config);
//!
//! regressor.train(&series, 5).unwrap();
//! let evaluation = regressor.evaluate(&series).unwrap();
//! let forecast = regressor.predict(&evaluation, 5).unwrap();
//! assert_eq!(forecast.times, vec![40, 41, 42, 43, 44]);
//! ```

pub mod utils;
pub mod error;
pub mod layers;
pub mod models;
pub mod normalizer;
pub mod state_space;
pub mod loss;
pub mod optimizers;
pub mod data;
pub mod config;
pub mod estimator;
pub mod plot;

// Re-export commonly used items
pub use models::sequence_model::{LSTMSequenceModel, ModelState};
pub use layers::lstm_cell::{LSTMCell, LSTMState};
pub use state_space::{StateSpaceModel, Predictions};
pub use normalizer::InputStatistics;
pub use estimator::{TimeSeriesRegressor, Evaluation, Forecast};
pub use config::ForecastConfig;
pub use data::TimeSeries;
pub use error::{ForecastError, Result};
pub use optimizers::{SGD, Adam, RMSprop, OptimizerKind};
pub use loss::MSELoss;
