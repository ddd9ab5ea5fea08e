//! CLI argument definitions for tickstore.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fetch` | Fetch a symbol and merge it into local storage |
//! | `prices` | Most recent stored records, bootstrapping when missing |
//! | `forecast` | Flat-line SMA extrapolation over stored closes |
//! | `metadata` | Print the sidecar written with the last series |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--home` | `$TICKSTORE_HOME` or `~/.tickstore` | Storage root |
//! | `--max-retries` | `5` | Fetch attempts before giving up |
//! | `--timeout-ms` | `10000` | Per-request timeout in ms |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! # Pull two years of history for AAPL
//! tickstore fetch AAPL --period 2y
//!
//! # Last 30 sessions, refreshing first
//! tickstore prices AAPL --days 30 --refresh --pretty
//!
//! # Five-session forecast from a 20-session window
//! tickstore forecast AAPL --days 5 --window 20
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tickstore_core::Period;

/// Local stock-price history with a naive forecast overlay.
#[derive(Debug, Parser)]
#[command(
    name = "tickstore",
    author,
    version,
    about = "Fetch, merge and serve locally stored stock-price series"
)]
pub struct Cli {
    /// Storage root. Overrides TICKSTORE_HOME.
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Fetch attempts before the last error is reported.
    #[arg(long, global = true, default_value_t = 5)]
    pub max_retries: u32,

    /// Per-request timeout in milliseconds.
    #[arg(long, global = true, default_value_t = 10_000)]
    pub timeout_ms: u64,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch a symbol and merge the rows into local storage.
    Fetch(FetchArgs),
    /// Print the most recent stored records.
    Prices(PricesArgs),
    /// Print a flat-line SMA forecast for the next trading days.
    Forecast(ForecastArgs),
    /// Print the metadata sidecar of a stored series.
    Metadata(MetadataArgs),
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Ticker symbol, case-sensitive (e.g. AAPL, BRK-B, ^GSPC).
    pub symbol: String,

    /// Lookback window: 1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max.
    #[arg(long, default_value_t = Period::OneYear)]
    pub period: Period,
}

#[derive(Debug, Args)]
pub struct PricesArgs {
    pub symbol: String,

    /// Number of most recent records to return.
    #[arg(long, default_value_t = 90)]
    pub days: usize,

    /// Fetch and merge before reading.
    #[arg(long, default_value_t = false)]
    pub refresh: bool,
}

#[derive(Debug, Args)]
pub struct ForecastArgs {
    pub symbol: String,

    /// Number of future trading days to project.
    #[arg(long, default_value_t = 3)]
    pub days: usize,

    /// SMA window; defaults to min(10, history length).
    #[arg(long)]
    pub window: Option<usize>,

    /// Stored sessions to feed the forecast.
    #[arg(long, default_value_t = 90)]
    pub history: usize,
}

#[derive(Debug, Args)]
pub struct MetadataArgs {
    pub symbol: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_period_and_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "tickstore",
            "fetch",
            "AAPL",
            "--period",
            "5y",
            "--home",
            "/tmp/ts",
            "--max-retries",
            "2",
        ])
        .expect("valid arguments");

        assert_eq!(cli.home, Some(PathBuf::from("/tmp/ts")));
        assert_eq!(cli.max_retries, 2);
        match cli.command {
            Command::Fetch(args) => {
                assert_eq!(args.symbol, "AAPL");
                assert_eq!(args.period, Period::FiveYears);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_period() {
        assert!(Cli::try_parse_from(["tickstore", "fetch", "AAPL", "--period", "3w"]).is_err());
    }
}
