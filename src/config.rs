//! Run configuration, loadable from JSON.
//!
//! Every field is optional in the file; missing fields take the defaults of
//! the reference radio-growth run (128 units, Adam at 0.01, batches of four
//! 20-step windows, 100 training steps, 5-step continuation).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ForecastError, Result};
use crate::optimizers::OptimizerKind;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub csv_path: PathBuf,
    pub output_path: PathBuf,
    pub num_units: usize,
    pub num_features: usize,
    pub batch_size: usize,
    pub window_size: usize,
    pub train_steps: usize,
    pub learning_rate: f64,
    pub optimizer: OptimizerKind,
    pub clip_gradient: Option<f64>,
    pub predict_steps: usize,
    pub log_every: usize,
    pub seed: Option<u64>,
    /// Time of the history/forecast divider in the chart; last observed time when unset
    pub marker_time: Option<i64>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        ForecastConfig {
            csv_path: PathBuf::from("growth.csv"),
            output_path: PathBuf::from("lstm_result.jpg"),
            num_units: 128,
            num_features: 1,
            batch_size: 4,
            window_size: 20,
            train_steps: 100,
            learning_rate: 0.01,
            optimizer: OptimizerKind::Adam,
            clip_gradient: None,
            predict_steps: 5,
            log_every: 10,
            seed: None,
            marker_time: None,
        }
    }
}

impl ForecastConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ForecastConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            tracing::info!(path = %path.as_ref().display(), "loading configuration");
            Self::from_json_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("num_units", self.num_units),
            ("num_features", self.num_features),
            ("batch_size", self.batch_size),
            ("window_size", self.window_size),
            ("log_every", self.log_every),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ForecastError::Config(format!("{} must be positive", name)));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ForecastError::Config(format!(
                "learning_rate must be positive, got {}", self.learning_rate
            )));
        }
        if let Some(clip) = self.clip_gradient {
            if !(clip.is_finite() && clip > 0.0) {
                return Err(ForecastError::Config(format!("clip_gradient must be positive, got {}", clip)));
            }
        }
        Ok(())
    }

    /// Driver settings carried by this configuration
    pub fn training(&self) -> TrainingConfig {
        TrainingConfig {
            batch_size: self.batch_size,
            window_size: self.window_size,
            clip_gradient: self.clip_gradient,
            log_every: self.log_every,
            seed: self.seed,
        }
    }
}

/// Configuration for the training driver
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub batch_size: usize,
    pub window_size: usize,
    pub clip_gradient: Option<f64>,
    pub log_every: usize,
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        ForecastConfig::default().training()
    }
}
