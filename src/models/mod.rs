/// State-space LSTM forecaster.
pub mod sequence_model;
