//! Provider adapters.
//!
//! Yahoo Finance is the only upstream. It is reached through three
//! [`FetchTier`](crate::FetchTier)s tried in order by the
//! [`Fetcher`](crate::Fetcher).

mod diagnostics;
pub mod yahoo;

pub use diagnostics::DebugArtifacts;
pub use yahoo::{yahoo_tiers, YahooChartTier, YahooConnection, YahooCsvTier, YahooSession, YahooSparkTier};
