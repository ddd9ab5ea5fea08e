use serde::Serialize;
use serde_json::Value;
use tickstore_core::{SessionDate, Symbol};
use tickstore_warehouse::TimeSeriesStore;

use crate::cli::FetchArgs;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct FetchResponseData {
    symbol: Symbol,
    period: &'static str,
    rows: usize,
    first_date: Option<SessionDate>,
    last_date: Option<SessionDate>,
    path: String,
}

pub async fn run(args: &FetchArgs, store: &TimeSeriesStore) -> Result<Value, CliError> {
    let series = store.fetch_and_merge(&args.symbol, args.period).await?;
    let path = store.series_store().data_path(&series.symbol);

    Ok(serde_json::to_value(FetchResponseData {
        rows: series.len(),
        first_date: series.first_date().cloned(),
        last_date: series.last_date().cloned(),
        path: path.display().to_string(),
        period: args.period.as_str(),
        symbol: series.symbol,
    })?)
}
