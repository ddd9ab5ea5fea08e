//! # Tickstore Core
//!
//! Domain types and the fetch pipeline for locally stored stock-price series.
//!
//! ## Overview
//!
//! - **Canonical domain models** for price records, series and their sidecar metadata
//! - **Fetch tiers** for Yahoo Finance (chart JSON, spark JSON, CSV download)
//! - **Retry policy** with separate schedules for throttling and transient failures
//! - **Merge rules** that deduplicate by session date, fresh rows winning
//! - **Analytics** for the SMA forecast overlay and RSI
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Yahoo Finance tiers and session handling |
//! | [`analytics`] | SMA, RSI and the flat-line forecast |
//! | [`calendar`] | Weekday trading calendar |
//! | [`data_source`] | Fetch tier trait, raw frames and `SourceError` |
//! | [`domain`] | Domain models (Symbol, Period, PriceRecord, Series) |
//! | [`error`] | Validation errors |
//! | [`fetch`] | Tier fallback under the retry policy |
//! | [`http_client`] | HTTP client abstraction |
//! | [`merge`] | Series merge and deduplication |
//! | [`normalize`] | Provider columns to the canonical schema |
//! | [`retry`] | Backoff schedules and sleepers |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tickstore_core::{yahoo_tiers, Fetcher, Period, ReqwestHttpClient, YahooConnection};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = YahooConnection::new(Arc::new(ReqwestHttpClient::new()));
//!     let fetcher = Fetcher::new(yahoo_tiers(connection));
//!
//!     let series = fetcher.fetch("AAPL", Period::OneYear, 3).await?;
//!     println!("{} rows, last {:?}", series.len(), series.last_date());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Fetcher        │──── RetryPolicy / Sleeper
//! └────────┬────────┘
//!          │  ordered tiers
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ FetchTier       │────▶│ HttpClient       │
//! │ chart/spark/csv │     │ (reqwest)        │
//! └────────┬────────┘     └──────────────────┘
//!          │  RawFrame
//!          ▼
//! ┌─────────────────┐
//! │ normalize       │──── merge_series
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use tickstore_core::{SourceError, SourceErrorKind};
//!
//! fn handle_error(error: SourceError) {
//!     match error.kind() {
//!         SourceErrorKind::RateLimited => {
//!             // Reduce request frequency
//!         }
//!         SourceErrorKind::NoData => {
//!             // Unknown or delisted symbol
//!         }
//!         SourceErrorKind::InvalidRequest => {
//!             // Report to user
//!         }
//!         _ => {}
//!     }
//! }
//! ```

pub mod adapters;
pub mod analytics;
pub mod calendar;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod http_client;
pub mod merge;
pub mod normalize;
pub mod retry;

// Adapter implementations
pub use adapters::{
    yahoo_tiers, DebugArtifacts, YahooChartTier, YahooConnection, YahooCsvTier, YahooSession,
    YahooSparkTier,
};

// Analytics and calendar
pub use analytics::{predict_next_prices, rsi, sma, DEFAULT_RSI_WINDOW};
pub use calendar::{is_trading_day, load_holiday_calendar, next_trading_days};

// Fetch tier contract
pub use data_source::{FetchRequest, FetchTier, RawCell, RawFrame, SourceError, SourceErrorKind};

// Domain models
pub use domain::{Period, PriceRecord, Series, SeriesMetadata, SessionDate, Symbol, UtcDateTime};

// Error types
pub use error::ValidationError;

// Pipeline
pub use fetch::Fetcher;
pub use merge::merge_series;
pub use normalize::normalize_frame;

// HTTP client types
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};

// Retry logic
pub use retry::{Backoff, RecordingSleeper, RetryPolicy, Sleeper, TokioSleeper};
