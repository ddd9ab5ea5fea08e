//! # Domain Models
//!
//! Canonical types for a locally stored price history.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Case-sensitive ticker used as the storage key |
//! | [`Period`] | Provider lookback window (`1mo`, `1y`, `max`, ...) |
//! | [`SessionDate`] | Calendar day of a record, or the raw text when coercion fails |
//! | [`PriceRecord`] | One OHLCV row with its `fetched_at` provenance |
//! | [`Series`] | Ordered records for one symbol |
//! | [`SeriesMetadata`] | Advisory sidecar written with every series |
//! | [`UtcDateTime`] | UTC timestamp |

mod models;
mod period;
mod symbol;
mod timestamp;

pub use models::{PriceRecord, Series, SeriesMetadata, SessionDate};
pub use period::Period;
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
