use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use time::macros::format_description;
use time::Date;

use crate::{Symbol, UtcDateTime};

/// Trading session a record belongs to.
///
/// Provider dates are coerced to a calendar day with any time-of-day dropped.
/// Text that cannot be coerced is kept verbatim so nothing is lost; such
/// records sort after every parsed day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionDate {
    Day(Date),
    Raw(String),
}

impl SessionDate {
    /// Coerce provider text (`2025-01-02`, `2025-01-02 00:00:00-05:00`,
    /// RFC3339, or unix seconds) into a session day.
    pub fn coerce(input: &str) -> Self {
        let trimmed = input.trim();

        if let Some(day) = trimmed.get(..10).and_then(parse_iso_day) {
            let rest = &trimmed[10..];
            if rest.is_empty() || rest.starts_with(' ') || rest.starts_with('T') {
                return Self::Day(day);
            }
        }

        if !trimmed.is_empty() && trimmed.chars().all(|ch| ch.is_ascii_digit()) {
            if let Some(ts) = trimmed
                .parse::<i64>()
                .ok()
                .and_then(UtcDateTime::from_unix_timestamp)
            {
                return Self::Day(ts.into_inner().date());
            }
        }

        Self::Raw(input.to_owned())
    }

    pub fn from_unix_timestamp(seconds: i64) -> Option<Self> {
        UtcDateTime::from_unix_timestamp(seconds).map(|ts| Self::Day(ts.into_inner().date()))
    }

    pub const fn day(&self) -> Option<Date> {
        match self {
            Self::Day(day) => Some(*day),
            Self::Raw(_) => None,
        }
    }

    /// Storage form: ISO `YYYY-MM-DD` for parsed days, the original text otherwise.
    pub fn to_storage_string(&self) -> String {
        match self {
            Self::Day(day) => format_iso_day(*day),
            Self::Raw(raw) => raw.clone(),
        }
    }
}

impl From<Date> for SessionDate {
    fn from(value: Date) -> Self {
        Self::Day(value)
    }
}

impl Display for SessionDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_storage_string())
    }
}

impl Serialize for SessionDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_storage_string())
    }
}

impl<'de> Deserialize<'de> for SessionDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        if value.is_empty() {
            return Err(D::Error::custom("session date cannot be empty"));
        }
        Ok(Self::coerce(&value))
    }
}

fn parse_iso_day(input: &str) -> Option<Date> {
    Date::parse(input, format_description!("[year]-[month]-[day]")).ok()
}

fn format_iso_day(day: Date) -> String {
    day.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| day.to_string())
}

/// One canonical OHLCV row of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: Option<SessionDate>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adj_close: Option<f64>,
    pub volume: Option<u64>,
    pub fetched_at: UtcDateTime,
}

impl PriceRecord {
    /// Record carrying only a date and a close, the shape most tests and the
    /// close-only spark tier produce.
    pub fn close_only(date: impl Into<SessionDate>, close: f64, fetched_at: UtcDateTime) -> Self {
        Self {
            date: Some(date.into()),
            open: None,
            high: None,
            low: None,
            close: Some(close),
            adj_close: None,
            volume: None,
            fetched_at,
        }
    }
}

/// Ordered price history for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub symbol: Symbol,
    pub records: Vec<PriceRecord>,
}

impl Series {
    pub fn new(symbol: Symbol, records: Vec<PriceRecord>) -> Self {
        Self { symbol, records }
    }

    pub fn empty(symbol: Symbol) -> Self {
        Self::new(symbol, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether any record carries a date. A series without one can only be
    /// merged in the degraded whole-row mode.
    pub fn has_dates(&self) -> bool {
        self.records.iter().any(|record| record.date.is_some())
    }

    pub fn first_date(&self) -> Option<&SessionDate> {
        self.records.iter().find_map(|record| record.date.as_ref())
    }

    pub fn last_date(&self) -> Option<&SessionDate> {
        self.records.iter().rev().find_map(|record| record.date.as_ref())
    }

    /// The most recent `n` records, or all of them when fewer exist.
    pub fn tail(&self, n: usize) -> &[PriceRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    pub fn closes(&self) -> Vec<f64> {
        self.records.iter().filter_map(|record| record.close).collect()
    }
}

/// Sidecar document written next to every persisted series.
///
/// Descriptive only: nothing in the pipeline reads it back to make decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub written_at: Option<UtcDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<UtcDateTime>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SeriesMetadata {
    pub fn merged(merged_at: UtcDateTime) -> Self {
        Self {
            merged_at: Some(merged_at),
            ..Self::default()
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Fill `written_at` and `rows` unless the caller already supplied them.
    pub fn completed(mut self, rows: usize, now: UtcDateTime) -> Self {
        self.written_at.get_or_insert(now);
        self.rows.get_or_insert(rows);
        self
    }
}
