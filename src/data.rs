//! Observed series: CSV loading, window sampling and synthetic data.

use chrono::{Datelike, NaiveDate};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{ForecastError, Result};

/// A univariate or multivariate series on strictly increasing integer times.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeries {
    times: Vec<i64>,
    values: Array2<f64>,
}

/// A run of consecutive observations borrowed from a [`TimeSeries`].
#[derive(Clone, Copy, Debug)]
pub struct Window<'a> {
    pub times: &'a [i64],
    pub values: ArrayView2<'a, f64>,
}

impl TimeSeries {
    /// Sorts observations by time. Fails on length mismatch, duplicate times
    /// or values that are NaN or infinite.
    pub fn new(times: Vec<i64>, values: Array2<f64>) -> Result<Self> {
        if times.len() != values.nrows() {
            return Err(ForecastError::ShapeMismatch {
                what: "values",
                expected: times.len(),
                actual: values.nrows(),
            });
        }

        if let Some(&value) = values.iter().find(|v| !v.is_finite()) {
            return Err(ForecastError::NonFinite { what: "observation", value });
        }

        let mut order: Vec<usize> = (0..times.len()).collect();
        order.sort_by_key(|&i| times[i]);

        if let Some(pair) = order.windows(2).find(|pair| times[pair[0]] == times[pair[1]]) {
            return Err(ForecastError::DuplicateTime(times[pair[0]]));
        }

        let sorted_times = order.iter().map(|&i| times[i]).collect();
        let sorted_values = values.select(Axis(0), &order);

        Ok(TimeSeries { times: sorted_times, values: sorted_values })
    }

    /// Single-feature series from parallel slices.
    pub fn univariate(times: Vec<i64>, values: Vec<f64>) -> Result<Self> {
        Self::new(times, Array1::from(values).insert_axis(Axis(1)))
    }

    /// Loads a headerless `date,radios` CSV file.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let series = Self::from_reader(BufReader::new(file))?;
        tracing::debug!(path = %path.as_ref().display(), rows = series.len(), "loaded time series");
        Ok(series)
    }

    /// Reads `date,value` records positionally. A leading row that does not
    /// parse is taken to be a header and skipped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut times = Vec::new();
        let mut values = Vec::new();

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let date = record.get(0).unwrap_or("");
            let value = record.get(1).unwrap_or("");

            let parsed = parse_time(date).and_then(|t| value.parse::<f64>().ok().map(|v| (t, v)));
            if let Some((_, v)) = parsed {
                if !v.is_finite() {
                    return Err(ForecastError::Parse {
                        row,
                        reason: format!("value `{}` is not a finite number", value),
                    });
                }
            }
            match parsed {
                Some((t, v)) => {
                    times.push(t);
                    values.push(v);
                }
                None if row == 0 => {
                    tracing::debug!(date, value, "skipping header row");
                }
                None => {
                    return Err(ForecastError::Parse {
                        row,
                        reason: format!("expected `date,value`, found `{},{}`", date, value),
                    });
                }
            }
        }

        if times.is_empty() {
            return Err(ForecastError::EmptySeries);
        }
        Self::univariate(times, values)
    }

    /// Noisy increasing series on times `0..len`, roughly `t + noise`.
    pub fn synthetic_growth<R: Rng + ?Sized>(len: usize, noise_std: f64, rng: &mut R) -> Result<Self> {
        let noise = Normal::new(0.0, noise_std)
            .map_err(|e| ForecastError::Config(format!("noise_std {}: {}", noise_std, e)))?;
        let times: Vec<i64> = (0..len as i64).collect();
        let values = Array2::from_shape_fn((len, 1), |(i, _)| i as f64 + noise.sample(rng));
        Ok(TimeSeries { times, values })
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.values.ncols()
    }

    pub fn times(&self) -> &[i64] {
        &self.times
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn last_time(&self) -> Option<i64> {
        self.times.last().copied()
    }

    /// The whole series as one window.
    pub fn whole(&self) -> Window<'_> {
        Window { times: &self.times, values: self.values.view() }
    }

    pub fn window(&self, start: usize, len: usize) -> Window<'_> {
        let end = (start + len).min(self.len());
        Window {
            times: &self.times[start..end],
            values: self.values.slice(s![start..end, ..]),
        }
    }

    /// `batch_size` windows of `window_size` consecutive observations with
    /// uniformly drawn start positions. Series shorter than a window yield
    /// the whole series.
    pub fn random_windows<R: Rng + ?Sized>(&self, rng: &mut R, batch_size: usize, window_size: usize) -> Vec<Window<'_>> {
        if self.len() <= window_size {
            return (0..batch_size).map(|_| self.whole()).collect();
        }
        let max_start = self.len() - window_size;
        (0..batch_size)
            .map(|_| self.window(rng.gen_range(0..=max_start), window_size))
            .collect()
    }
}

/// Integer timestamps pass through; ISO dates become days since the common era.
fn parse_time(raw: &str) -> Option<i64> {
    if let Ok(t) = raw.parse::<i64>() {
        return Some(t);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|date| i64::from(date.num_days_from_ce()))
}
