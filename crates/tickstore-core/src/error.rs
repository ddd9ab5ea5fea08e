use thiserror::Error;

/// Validation and contract errors exposed by `tickstore-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol must be a non-empty string")]
    EmptySymbol,
    #[error("symbol '{value}' cannot be used as a storage key")]
    SymbolNotStorable { value: String },

    #[error("invalid period '{value}', expected one of 1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max")]
    InvalidPeriod { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("window must be >= 1")]
    InvalidWindow,
    #[error("days must be greater than zero")]
    NonPositiveDays,
    #[error("max_retries must be greater than zero")]
    NoRetryBudget,

    #[error("insufficient data")]
    InsufficientData,
}
