//! Chart of observed, fitted and forecast values.
//!
//! Colors: observation black, one-step-ahead evaluation green, forecast red,
//! plus a thick dashed red line at the history/forecast boundary. Only the
//! bitmap backend is built, with no font support, so the chart carries no
//! text labels.

use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use std::path::Path;

use crate::error::{ForecastError, Result};
use crate::estimator::{Evaluation, Forecast};

const CHART_SIZE: (u32, u32) = (1500, 500);
/// Dash length and gap of the history/forecast divider, in pixels
const MARKER_DASH: (u32, u32) = (6, 6);

fn plot_error<E: std::fmt::Display>(error: E) -> ForecastError {
    ForecastError::Plot(error.to_string())
}

fn series_points(times: &[i64], values: impl Iterator<Item = f64>) -> Vec<(f64, f64)> {
    times.iter().map(|&t| t as f64).zip(values).collect()
}

/// Padded `(min, max)` over all values, never an empty range.
fn value_range<'a>(values: impl Iterator<Item = &'a f64>) -> (f64, f64) {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !min.is_finite() {
        return (-1.0, 1.0);
    }
    let pad = ((max - min) * 0.05).max(1e-6);
    (min - pad, max + pad)
}

/// Renders the first feature of `evaluation` and `forecast` to `path`.
/// The image format follows the file extension.
pub fn render_forecast<P: AsRef<Path>>(
    path: P,
    evaluation: &Evaluation,
    forecast: &Forecast,
    marker_time: i64,
) -> Result<()> {
    let first = evaluation.times.first().copied().ok_or(ForecastError::EmptySeries)?;
    let last = forecast
        .times
        .last()
        .or_else(|| evaluation.times.last())
        .copied()
        .unwrap_or(first);
    let x_range = (first.min(marker_time) as f64)..(last.max(marker_time).max(first + 1) as f64);

    let (y_min, y_max) = value_range(
        evaluation
            .observed
            .column(0)
            .iter()
            .chain(evaluation.mean.column(0).iter())
            .chain(forecast.mean.column(0).iter()),
    );

    let root = BitMapBackend::new(path.as_ref(), CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(x_range, y_min..y_max)
        .map_err(plot_error)?;

    chart
        .draw_series(DashedLineSeries::new(
            vec![(marker_time as f64, y_min), (marker_time as f64, y_max)],
            MARKER_DASH.0,
            MARKER_DASH.1,
            RED.stroke_width(4),
        ))
        .map_err(plot_error)?;

    chart
        .draw_series(LineSeries::new(
            series_points(&evaluation.times, evaluation.observed.column(0).iter().copied()),
            &BLACK,
        ))
        .map_err(plot_error)?;

    chart
        .draw_series(LineSeries::new(
            series_points(&evaluation.times, evaluation.mean.column(0).iter().copied()),
            &GREEN,
        ))
        .map_err(plot_error)?;

    chart
        .draw_series(LineSeries::new(
            series_points(&forecast.times, forecast.mean.column(0).iter().copied()),
            &RED,
        ))
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    tracing::info!(path = %path.as_ref().display(), "rendered forecast chart");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::lstm_cell::LSTMState;
    use crate::models::sequence_model::ModelState;
    use ndarray::{arr1, Array1, Array2};

    fn evaluation(len: usize) -> Evaluation {
        let observed = Array2::from_shape_fn((len, 1), |(i, _)| i as f64);
        Evaluation {
            times: (0..len as i64).collect(),
            mean: observed.clone(),
            observed,
            loss: 0.0,
            end_state: ModelState {
                last_time: len as i64 - 1,
                last_value_or_prediction: arr1(&[0.0]),
                lstm_state: LSTMState { memory: Array1::zeros(2), hidden: Array1::zeros(2) },
            },
        }
    }

    #[test]
    fn test_dashed_divider_inside_history() {
        let evaluation = evaluation(30);
        let forecast = Forecast {
            times: vec![30, 31, 32],
            mean: Array2::from_elem((3, 1), 30.0),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("divider.png");

        render_forecast(&path, &evaluation, &forecast, 15).unwrap();

        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_empty_evaluation_rejected() {
        let evaluation = evaluation(0);
        let forecast = Forecast { times: vec![], mean: Array2::zeros((0, 1)) };
        let dir = tempfile::tempdir().unwrap();

        let result = render_forecast(dir.path().join("empty.png"), &evaluation, &forecast, 0);
        assert!(matches!(result, Err(ForecastError::EmptySeries)));
    }

    #[test]
    fn test_value_range_pads() {
        let values = [1.0, 3.0, f64::NAN];
        let (lo, hi) = value_range(values.iter());
        assert!(lo < 1.0 && hi > 3.0);
    }

    #[test]
    fn test_value_range_constant_is_not_empty() {
        let values = [5.0, 5.0];
        let (lo, hi) = value_range(values.iter());
        assert!(lo < hi);
    }

    #[test]
    fn test_value_range_empty() {
        let values: [f64; 0] = [];
        assert_eq!(value_range(values.iter()), (-1.0, 1.0));
    }
}
