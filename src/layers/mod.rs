/// Recurrent LSTM cell.
pub mod lstm_cell;

/// Dense output projection.
pub mod linear;
