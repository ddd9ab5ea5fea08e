use serde_json::Value;
use tickstore_warehouse::TimeSeriesStore;

use crate::cli::PricesArgs;
use crate::error::CliError;

pub async fn run(args: &PricesArgs, store: &TimeSeriesStore) -> Result<Value, CliError> {
    let response = store
        .get_prices(&args.symbol, args.days, args.refresh)
        .await?;
    Ok(serde_json::to_value(response)?)
}
