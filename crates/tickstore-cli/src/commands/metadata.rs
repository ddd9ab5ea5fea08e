use serde_json::Value;
use tickstore_core::Symbol;
use tickstore_warehouse::TimeSeriesStore;

use crate::cli::MetadataArgs;
use crate::error::CliError;

pub fn run(args: &MetadataArgs, store: &TimeSeriesStore) -> Result<Value, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let metadata = store.series_store().read_metadata(&symbol)?;
    Ok(serde_json::to_value(metadata)?)
}
