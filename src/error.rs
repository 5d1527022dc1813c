//! Error type shared by the model, the driver and the data/plot glue.

use thiserror::Error;

/// Errors raised while loading data, stepping the model or rendering output.
///
/// `TimeMismatch` and `NotImplemented` signal integration errors rather than
/// bad input; the driver never tries to recover from them.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("state is at time {state_time} but the caller claims time {current_time}")]
    TimeMismatch { state_time: i64, current_time: i64 },

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("model used before initialize_graph was called")]
    Uninitialized,

    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("time series is empty")]
    EmptySeries,

    #[error("times must be strictly increasing: {previous} followed by {current}")]
    UnorderedTimes { previous: i64, current: i64 },

    #[error("non-finite {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("duplicate observation for time {0}")]
    DuplicateTime(i64),

    #[error("failed to parse row {row}: {reason}")]
    Parse { row: usize, reason: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("plot error: {0}")]
    Plot(String),
}

impl From<serde_json::Error> for ForecastError {
    fn from(error: serde_json::Error) -> Self {
        ForecastError::Config(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;
