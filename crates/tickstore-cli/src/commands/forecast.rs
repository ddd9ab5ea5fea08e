use serde::Serialize;
use serde_json::Value;
use tickstore_core::{
    next_trading_days, predict_next_prices, rsi, Series, SessionDate, Symbol, UtcDateTime,
    DEFAULT_RSI_WINDOW,
};
use tickstore_warehouse::TimeSeriesStore;

use crate::cli::ForecastArgs;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct ForecastResponseData {
    symbol: Symbol,
    window: Option<usize>,
    history: usize,
    last_date: Option<SessionDate>,
    /// RSI over the closes considered, at the last session.
    rsi: Option<f64>,
    predictions: Vec<ForecastPoint>,
}

#[derive(Debug, Serialize)]
struct ForecastPoint {
    date: SessionDate,
    close: f64,
}

pub fn run(args: &ForecastArgs, store: &TimeSeriesStore) -> Result<Value, CliError> {
    let series = store.read(&args.symbol)?;
    Ok(serde_json::to_value(build_forecast(&series, args)?)?)
}

fn build_forecast(series: &Series, args: &ForecastArgs) -> Result<ForecastResponseData, CliError> {
    let recent = Series::new(series.symbol.clone(), series.tail(args.history).to_vec());
    let closes = recent.closes();
    let levels = predict_next_prices(&closes, args.days, args.window)?;
    let momentum = rsi(&closes, DEFAULT_RSI_WINDOW)?.last().copied();

    // Undated or unparseable history projects from today.
    let last_date = recent.last_date().cloned();
    let anchor = last_date
        .as_ref()
        .and_then(SessionDate::day)
        .unwrap_or_else(|| UtcDateTime::now().into_inner().date());

    let predictions = next_trading_days(anchor, levels.len())
        .into_iter()
        .zip(levels)
        .map(|(day, close)| ForecastPoint {
            date: SessionDate::from(day),
            close,
        })
        .collect();

    Ok(ForecastResponseData {
        symbol: series.symbol.clone(),
        window: args.window,
        history: recent.len(),
        last_date,
        rsi: momentum,
        predictions,
    })
}
