//! # Tickstore Warehouse
//!
//! Durable per-symbol price series on the local filesystem.
//!
//! ## Overview
//!
//! Each symbol is stored as one Parquet file written through DuckDB, next to
//! an advisory JSON sidecar. Writes stage the file in the storage root and
//! move it into place with a single rename, so readers never observe a
//! partially written series.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tickstore_core::{Period, ReqwestHttpClient};
//! use tickstore_warehouse::{StoreConfig, TimeSeriesStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = TimeSeriesStore::yahoo(StoreConfig::from_env(), Arc::new(ReqwestHttpClient::new()));
//!
//!     let merged = store.fetch_and_merge("AAPL", Period::OneYear).await?;
//!     let recent = store.get_prices("AAPL", 30, false).await?;
//!     println!("{} stored, {} returned", merged.len(), recent.records.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Layout
//!
//! | Path | Description |
//! |------|-------------|
//! | `stock_<SYMBOL>.parquet` | Series rows (`date`, OHLC, `adj_close`, `volume`, `fetched_at`) |
//! | `stock_<SYMBOL>.meta.json` | `written_at`, `rows`, optional `merged_at`, caller fields |
//! | `debug/` | Truncated provider responses captured on throttling or parse failure |

pub mod parquet;
pub mod sidecar;
mod store;

use std::env;
use std::path::PathBuf;

use thiserror::Error;
use tickstore_core::{RetryPolicy, SourceError, SourceErrorKind, ValidationError};

pub use store::{PriceResponse, SeriesStore, TimeSeriesStore};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// Caller input rejected before any I/O or network call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No persisted series exists for the symbol.
    #[error("no stored series for '{symbol}'")]
    NotFound { symbol: String },

    /// Persisting an empty series is refused; nothing is written.
    #[error("refusing to persist an empty series for '{symbol}'")]
    EmptySeries { symbol: String },

    /// Fetch failed after the retry budget was spent.
    #[error(transparent)]
    Source(SourceError),

    /// Stored file exists but its rows do not match the schema.
    #[error("stored series at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Sidecar encoding or decoding failed.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl WarehouseError {
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Source(error) if error.is_rate_limited())
    }

    /// Stable machine-readable code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "store.invalid_argument",
            Self::NotFound { .. } => "store.not_found",
            Self::EmptySeries { .. } => "store.empty_series",
            Self::Source(error) => error.code(),
            Self::Corrupt { .. } => "store.corrupt",
            Self::DuckDb(_) => "store.duckdb",
            Self::Io(_) => "store.io",
            Self::Serialization(_) => "store.serialization",
        }
    }
}

impl From<ValidationError> for WarehouseError {
    fn from(value: ValidationError) -> Self {
        Self::InvalidArgument(value.to_string())
    }
}

impl From<SourceError> for WarehouseError {
    fn from(value: SourceError) -> Self {
        match value.kind() {
            SourceErrorKind::InvalidRequest => Self::InvalidArgument(value.message().to_owned()),
            _ => Self::Source(value),
        }
    }
}

/// Configuration for the series store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Directory holding the Parquet files, sidecars and `debug/`.
    pub root: PathBuf,
    /// Attempt budget and backoff for provider fetches.
    pub retry: RetryPolicy,
    /// Per-request HTTP timeout.
    pub request_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            retry: RetryPolicy::default(),
            request_timeout_ms: 10_000,
        }
    }

    /// Root from `TICKSTORE_HOME`, else `$HOME/.tickstore`, else `./.tickstore`.
    pub fn from_env() -> Self {
        Self::new(resolve_tickstore_home())
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout_ms(mut self, request_timeout_ms: u64) -> Self {
        self.request_timeout_ms = request_timeout_ms;
        self
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.root.join("debug")
    }
}

/// Resolve the tickstore home directory from environment or default.
fn resolve_tickstore_home() -> PathBuf {
    if let Some(path) = env::var_os("TICKSTORE_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".tickstore");
    }

    PathBuf::from(".tickstore")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickstore_core::Symbol;

    #[test]
    fn invalid_source_request_becomes_invalid_argument() {
        let error = WarehouseError::from(SourceError::invalid_request("symbol must be a non-empty string"));

        assert!(matches!(error, WarehouseError::InvalidArgument(_)));
        assert_eq!(error.code(), "store.invalid_argument");
    }

    #[test]
    fn rate_limited_source_error_is_preserved() {
        let error = WarehouseError::from(SourceError::rate_limited("429 Too Many Requests"));

        assert!(error.is_rate_limited());
        assert_eq!(error.code(), "source.rate_limited");

        let symbol = Symbol::parse("AAPL").expect("symbol");
        let no_data = WarehouseError::from(SourceError::no_data(&symbol));
        assert!(!no_data.is_rate_limited());
        assert_eq!(no_data.to_string(), "no data for ticker AAPL (source.no_data)");
    }

    #[test]
    fn debug_dir_lives_under_root() {
        let config = StoreConfig::new("/tmp/tickstore");

        assert_eq!(config.debug_dir(), PathBuf::from("/tmp/tickstore/debug"));
        assert_eq!(config.retry, RetryPolicy::default());
    }
}
