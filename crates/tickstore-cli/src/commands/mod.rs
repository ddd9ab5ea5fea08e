mod fetch;
mod forecast;
mod metadata;
mod prices;

use std::sync::Arc;

use serde_json::Value;
use tickstore_core::ReqwestHttpClient;
use tickstore_warehouse::{StoreConfig, TimeSeriesStore};
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    let config = store_config(cli);
    debug!(
        root = %config.root.display(),
        max_attempts = config.retry.max_attempts,
        "opening store"
    );
    let store = TimeSeriesStore::yahoo(config, Arc::new(ReqwestHttpClient::new()));

    match &cli.command {
        Command::Fetch(args) => fetch::run(args, &store).await,
        Command::Prices(args) => prices::run(args, &store).await,
        Command::Forecast(args) => forecast::run(args, &store),
        Command::Metadata(args) => metadata::run(args, &store),
    }
}

fn store_config(cli: &Cli) -> StoreConfig {
    let config = match &cli.home {
        Some(home) => StoreConfig::new(home),
        None => StoreConfig::from_env(),
    };
    let retry = config.retry.clone().with_max_attempts(cli.max_retries);
    config
        .with_retry(retry)
        .with_request_timeout_ms(cli.timeout_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn global_options_flow_into_store_config() {
        let cli = Cli::try_parse_from([
            "tickstore",
            "--home",
            "/tmp/tickstore-test",
            "--max-retries",
            "3",
            "--timeout-ms",
            "2500",
            "metadata",
            "AAPL",
        ])
        .expect("valid arguments");

        let config = store_config(&cli);

        assert_eq!(config.root, std::path::PathBuf::from("/tmp/tickstore-test"));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.request_timeout_ms, 2_500);
    }
}
