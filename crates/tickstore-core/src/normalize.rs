//! Map provider frames onto the canonical record schema.

use tracing::debug;

use crate::data_source::{RawCell, RawFrame};
use crate::{PriceRecord, Series, SessionDate, Symbol, UtcDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Date,
    Open,
    High,
    Low,
    Close,
    AdjClose,
    Volume,
}

/// Resolve a provider column name (`Date`, `Adj Close`, `adjclose`, ...) to a
/// canonical field. Matching ignores case, spaces and underscores.
fn canonical_field(column: &str) -> Option<Field> {
    let key: String = column
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '_')
        .map(|ch| ch.to_ascii_lowercase())
        .collect();

    match key.as_str() {
        "date" | "datetime" | "timestamp" => Some(Field::Date),
        "open" => Some(Field::Open),
        "high" => Some(Field::High),
        "low" => Some(Field::Low),
        "close" => Some(Field::Close),
        "adjclose" => Some(Field::AdjClose),
        "volume" => Some(Field::Volume),
        _ => None,
    }
}

/// Rename, coerce and stamp a provider frame into a [`Series`].
///
/// Unknown columns are dropped. A date that cannot be coerced is kept as raw
/// text rather than failing the whole frame.
pub fn normalize_frame(symbol: &Symbol, frame: &RawFrame, fetched_at: UtcDateTime) -> Series {
    let fields: Vec<Option<Field>> = frame
        .columns
        .iter()
        .map(|column| {
            let field = canonical_field(column);
            if field.is_none() {
                debug!(symbol = %symbol, column = %column, "dropping unmapped provider column");
            }
            field
        })
        .collect();

    let records = frame
        .rows
        .iter()
        .map(|row| {
            let mut record = PriceRecord {
                date: None,
                open: None,
                high: None,
                low: None,
                close: None,
                adj_close: None,
                volume: None,
                fetched_at,
            };

            for (cell, field) in row.iter().zip(fields.iter()) {
                match field {
                    Some(Field::Date) => record.date = coerce_date(cell),
                    Some(Field::Open) => record.open = coerce_price(cell),
                    Some(Field::High) => record.high = coerce_price(cell),
                    Some(Field::Low) => record.low = coerce_price(cell),
                    Some(Field::Close) => record.close = coerce_price(cell),
                    Some(Field::AdjClose) => record.adj_close = coerce_price(cell),
                    Some(Field::Volume) => record.volume = coerce_volume(cell),
                    None => {}
                }
            }

            record
        })
        .collect();

    Series::new(symbol.clone(), records)
}

fn coerce_date(cell: &RawCell) -> Option<SessionDate> {
    match cell {
        RawCell::Text(text) if !text.trim().is_empty() => Some(SessionDate::coerce(text)),
        RawCell::Number(value) if value.is_finite() && value.fract() == 0.0 => {
            SessionDate::from_unix_timestamp(*value as i64)
        }
        RawCell::Number(value) => Some(SessionDate::Raw(value.to_string())),
        RawCell::Text(_) | RawCell::Missing => None,
    }
}

fn coerce_price(cell: &RawCell) -> Option<f64> {
    let value = match cell {
        RawCell::Number(value) => *value,
        RawCell::Text(text) => text.trim().parse::<f64>().ok()?,
        RawCell::Missing => return None,
    };
    value.is_finite().then_some(value)
}

fn coerce_volume(cell: &RawCell) -> Option<u64> {
    if let RawCell::Text(text) = cell {
        if let Ok(volume) = text.trim().parse::<u64>() {
            return Some(volume);
        }
    }
    coerce_price(cell)
        .filter(|value| *value >= 0.0)
        .map(|value| value.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn text(value: &str) -> RawCell {
        RawCell::Text(value.to_owned())
    }

    fn fetched() -> UtcDateTime {
        UtcDateTime::parse("2025-01-05T00:00:00Z").expect("timestamp")
    }

    #[test]
    fn renames_csv_headers_to_canonical_fields() {
        let mut frame = RawFrame::new(
            ["Date", "Open", "High", "Low", "Close", "Adj Close", "Volume"]
                .map(String::from)
                .to_vec(),
        );
        frame.push_row(vec![
            text("2025-01-02"),
            text("10.0"),
            text("12.5"),
            text("9.5"),
            text("11.0"),
            text("10.9"),
            text("123456"),
        ]);

        let symbol = Symbol::parse("AAPL").expect("symbol");
        let series = normalize_frame(&symbol, &frame, fetched());
        let record = &series.records[0];

        assert_eq!(record.date, Some(SessionDate::Day(date!(2025 - 01 - 02))));
        assert_eq!(record.open, Some(10.0));
        assert_eq!(record.high, Some(12.5));
        assert_eq!(record.low, Some(9.5));
        assert_eq!(record.close, Some(11.0));
        assert_eq!(record.adj_close, Some(10.9));
        assert_eq!(record.volume, Some(123_456));
        assert_eq!(record.fetched_at, fetched());
    }

    #[test]
    fn null_cells_become_missing_fields() {
        let mut frame = RawFrame::new(vec![String::from("timestamp"), String::from("close")]);
        frame.push_row(vec![RawCell::Number(1_735_776_000.0), text("null")]);

        let symbol = Symbol::parse("AAPL").expect("symbol");
        let series = normalize_frame(&symbol, &frame, fetched());

        assert_eq!(
            series.records[0].date,
            Some(SessionDate::Day(date!(2025 - 01 - 02)))
        );
        assert_eq!(series.records[0].close, None);
    }

    #[test]
    fn frame_without_date_column_yields_undated_records() {
        let mut frame = RawFrame::new(vec![String::from("Close"), String::from("Ticker")]);
        frame.push_row(vec![RawCell::Number(5.0), text("AAPL")]);

        let symbol = Symbol::parse("AAPL").expect("symbol");
        let series = normalize_frame(&symbol, &frame, fetched());

        assert!(!series.has_dates());
        assert_eq!(series.records[0].close, Some(5.0));
    }
}
