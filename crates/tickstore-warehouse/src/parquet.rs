//! Parquet encoding of a [`Series`] through an in-memory `DuckDB` connection.
//!
//! Rows are staged in a temporary table with parameterized inserts and
//! exported with `COPY ... (FORMAT PARQUET)`. Reading goes through
//! `read_parquet`.

use std::path::Path;

use ::duckdb::{Connection, ToSql};
use tickstore_core::{PriceRecord, Series, SessionDate, Symbol, UtcDateTime};

use crate::WarehouseError;

const STAGING_TABLE_SQL: &str = "CREATE TEMP TABLE staged_prices (\
     seq UBIGINT NOT NULL, \
     date VARCHAR, \
     open DOUBLE, \
     high DOUBLE, \
     low DOUBLE, \
     close DOUBLE, \
     adj_close DOUBLE, \
     volume UBIGINT, \
     fetched_at VARCHAR NOT NULL)";

const COLUMNS: &str = "date, open, high, low, close, adj_close, volume, fetched_at";

/// Write `series` to `path` as a single Parquet file, replacing any file there.
pub fn write_series(path: &Path, series: &Series) -> Result<(), WarehouseError> {
    let connection = Connection::open_in_memory()?;
    connection.execute_batch(STAGING_TABLE_SQL)?;

    connection.execute_batch("BEGIN TRANSACTION")?;
    let staged = (|| -> Result<(), WarehouseError> {
        for (seq, record) in series.records.iter().enumerate() {
            let seq = seq as u64;
            let date = record.date.as_ref().map(SessionDate::to_storage_string);
            let fetched_at = record.fetched_at.format_rfc3339();
            let params: [&dyn ToSql; 9] = [
                &seq,
                &date,
                &record.open,
                &record.high,
                &record.low,
                &record.close,
                &record.adj_close,
                &record.volume,
                &fetched_at,
            ];
            connection.execute(
                "INSERT INTO staged_prices VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params.as_slice(),
            )?;
        }
        Ok(())
    })();
    finalize_transaction(&connection, staged)?;

    let sql = format!(
        "COPY (SELECT {COLUMNS} FROM staged_prices ORDER BY seq) TO '{}' (FORMAT PARQUET)",
        escape_sql_string(path_to_sql(path).as_str())
    );
    connection.execute_batch(sql.as_str())?;
    Ok(())
}

/// Read a Parquet file written by [`write_series`].
///
/// Dates are coerced back to calendar days; text that does not parse is kept
/// as [`SessionDate::Raw`].
pub fn read_series(path: &Path, symbol: &Symbol) -> Result<Series, WarehouseError> {
    let connection = Connection::open_in_memory()?;
    let sql = format!(
        "SELECT {COLUMNS} FROM read_parquet('{}')",
        escape_sql_string(path_to_sql(path).as_str())
    );

    let mut statement = connection.prepare(sql.as_str())?;
    let rows = statement.query_map([], |row| {
        Ok(StoredRow {
            date: row.get(0)?,
            open: row.get(1)?,
            high: row.get(2)?,
            low: row.get(3)?,
            close: row.get(4)?,
            adj_close: row.get(5)?,
            volume: row.get(6)?,
            fetched_at: row.get(7)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?.into_record(path)?);
    }

    Ok(Series::new(symbol.clone(), records))
}

struct StoredRow {
    date: Option<String>,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    adj_close: Option<f64>,
    volume: Option<u64>,
    fetched_at: String,
}

impl StoredRow {
    fn into_record(self, path: &Path) -> Result<PriceRecord, WarehouseError> {
        let fetched_at =
            UtcDateTime::parse(&self.fetched_at).map_err(|error| WarehouseError::Corrupt {
                path: path.to_path_buf(),
                reason: error.to_string(),
            })?;

        Ok(PriceRecord {
            date: self.date.as_deref().map(SessionDate::coerce),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            adj_close: self.adj_close,
            volume: self.volume,
            fetched_at,
        })
    }
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Convert a path to a SQL-compatible string (forward slashes).
fn path_to_sql(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Escape a string literal for inclusion in SQL.
///
/// Only used for file paths built by the store; row values always go through
/// parameters.
fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}
