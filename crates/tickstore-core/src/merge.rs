//! Combine a stored series with freshly fetched rows.
//!
//! Rows are concatenated stored-then-fresh, stable-sorted by date and reduced
//! to the last row per date, so a fresh row always replaces a stored row for
//! the same session. Precedence is positional; `fetched_at` is never compared.

use std::collections::HashSet;

use crate::{PriceRecord, Series, SessionDate};

/// Merge `fresh` into `existing`.
///
/// When neither side carries a date the merge degrades to dropping exact
/// duplicate rows (first occurrence kept, `fetched_at` ignored).
pub fn merge_series(existing: &Series, fresh: &Series) -> Series {
    let mut combined: Vec<PriceRecord> = existing
        .records
        .iter()
        .chain(fresh.records.iter())
        .cloned()
        .collect();

    let records = if existing.has_dates() || fresh.has_dates() {
        // Vec::sort_by is stable: equal dates keep stored-before-fresh order.
        combined.sort_by(|left, right| left.date.cmp(&right.date));
        keep_last_per_date(combined)
    } else {
        drop_exact_duplicates(combined)
    };

    Series::new(fresh.symbol.clone(), records)
}

fn keep_last_per_date(sorted: Vec<PriceRecord>) -> Vec<PriceRecord> {
    let mut result: Vec<PriceRecord> = Vec::with_capacity(sorted.len());
    for record in sorted {
        match result.last_mut() {
            Some(previous) if previous.date == record.date => *previous = record,
            _ => result.push(record),
        }
    }
    result
}

/// Every field but `fetched_at`, which is provenance only. Prices are compared
/// by bit pattern with `-0.0` folded into `0.0`.
type ObservationKey = (Option<SessionDate>, [Option<u64>; 5], Option<u64>);

/// `None` when a price is NaN: such a row never equals another one.
fn observation_key(record: &PriceRecord) -> Option<ObservationKey> {
    let bits = |value: Option<f64>| match value {
        None => Some(None),
        Some(price) if price.is_nan() => None,
        Some(price) => Some(Some((price + 0.0).to_bits())),
    };
    Some((
        record.date.clone(),
        [
            bits(record.open)?,
            bits(record.high)?,
            bits(record.low)?,
            bits(record.close)?,
            bits(record.adj_close)?,
        ],
        record.volume,
    ))
}

fn drop_exact_duplicates(records: Vec<PriceRecord>) -> Vec<PriceRecord> {
    let mut seen: HashSet<ObservationKey> = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| match observation_key(record) {
            Some(key) => seen.insert(key),
            None => true,
        })
        .collect()
}
