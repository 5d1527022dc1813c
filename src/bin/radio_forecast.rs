use anyhow::Context;
use lstm_forecast::estimator::TimeSeriesRegressor;
use lstm_forecast::plot::render_forecast;
use lstm_forecast::{ForecastConfig, LSTMSequenceModel, TimeSeries};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CONFIG_PATH: &str = "forecast.json";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "lstm_forecast=info,radio_forecast=info".into()))
        .init();

    let config = ForecastConfig::load_or_default(CONFIG_PATH)
        .with_context(|| format!("reading configuration from {}", CONFIG_PATH))?;
    config.validate().context("invalid configuration")?;

    let series = TimeSeries::from_csv(&config.csv_path)
        .with_context(|| format!("loading observations from {}", config.csv_path.display()))?;
    tracing::info!(
        observations = series.len(),
        first = series.times().first().copied(),
        last = series.last_time(),
        "loaded series"
    );

    let mut model = LSTMSequenceModel::new(config.num_units, config.num_features);
    if let Some(seed) = config.seed {
        model = model.with_seed(seed);
    }
    let optimizer = config.optimizer.build(config.learning_rate);
    let mut regressor = TimeSeriesRegressor::with_config(model, optimizer, config.training());

    regressor.train(&series, config.train_steps).context("training failed")?;
    let evaluation = regressor.evaluate(&series).context("evaluation failed")?;
    let forecast = regressor
        .predict(&evaluation, config.predict_steps)
        .context("forecast failed")?;

    for (time, value) in forecast.times.iter().zip(forecast.mean.rows()) {
        tracing::info!(time, value = ?value.to_vec(), "predicted");
    }

    let marker_time = config.marker_time.unwrap_or(evaluation.end_state.last_time);
    render_forecast(&config.output_path, &evaluation, &forecast, marker_time)
        .with_context(|| format!("writing chart to {}", config.output_path.display()))?;

    Ok(())
}
