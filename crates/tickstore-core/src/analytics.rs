//! Rolling indicators and the flat-line forecast shown next to the chart.
//!
//! The forecast repeats the last simple moving average; it is an overlay for
//! the presentation layer, not a model.

use crate::ValidationError;

const DEFAULT_FORECAST_WINDOW: usize = 10;
pub const DEFAULT_RSI_WINDOW: usize = 14;

/// Simple moving average with partial leading windows (`min_periods = 1`).
pub fn sma(values: &[f64], window: usize) -> Result<Vec<f64>, ValidationError> {
    if window < 1 {
        return Err(ValidationError::InvalidWindow);
    }
    Ok(rolling_mean(values, window))
}

/// Relative Strength Index from rolling means of gains and losses.
///
/// Positions where the index is undefined (the first value, or a window with
/// no losses) are reported as `0.0`.
pub fn rsi(values: &[f64], window: usize) -> Result<Vec<f64>, ValidationError> {
    if window < 1 {
        return Err(ValidationError::InvalidWindow);
    }
    if values.is_empty() {
        return Ok(Vec::new());
    }

    let deltas: Vec<f64> = std::iter::once(f64::NAN)
        .chain(values.windows(2).map(|pair| pair[1] - pair[0]))
        .collect();
    let gains: Vec<f64> = deltas
        .iter()
        .map(|delta| if delta.is_nan() { f64::NAN } else { delta.max(0.0) })
        .collect();
    let losses: Vec<f64> = deltas
        .iter()
        .map(|delta| if delta.is_nan() { f64::NAN } else { (-delta).max(0.0) })
        .collect();

    let up = rolling_mean(&gains, window);
    let down = rolling_mean(&losses, window);

    Ok(up
        .iter()
        .zip(down.iter())
        .map(|(up, down)| {
            if *down == 0.0 || down.is_nan() || up.is_nan() {
                return 0.0;
            }
            100.0 - 100.0 / (1.0 + up / down)
        })
        .collect())
}

/// Repeat the last SMA of `prices` for `days` future sessions.
///
/// The default window is `min(10, prices.len())`; an explicit window below 1
/// is raised to 1.
pub fn predict_next_prices(
    prices: &[f64],
    days: usize,
    window: Option<usize>,
) -> Result<Vec<f64>, ValidationError> {
    if days == 0 {
        return Ok(Vec::new());
    }
    if prices.is_empty() {
        return Err(ValidationError::InsufficientData);
    }

    let window = match window {
        Some(window) => window.max(1),
        None => DEFAULT_FORECAST_WINDOW.min(prices.len()),
    };

    let level = sma(prices, window)?
        .into_iter()
        .rev()
        .find(|value| value.is_finite())
        .or_else(|| prices.iter().rev().copied().find(|price| price.is_finite()))
        .ok_or(ValidationError::InsufficientData)?;

    Ok(vec![level; days])
}

/// Trailing mean over up to `window` values, skipping NaN. A window with no
/// usable value yields NaN.
fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    (0..values.len())
        .map(|end| {
            let start = (end + 1).saturating_sub(window);
            let (sum, count) = values[start..=end]
                .iter()
                .filter(|value| !value.is_nan())
                .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
            if count == 0 {
                f64::NAN
            } else {
                sum / count as f64
            }
        })
        .collect()
}
