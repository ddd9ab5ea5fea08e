//! Fetch tier contract and the errors it reports.
//!
//! A provider is queried through an ordered list of [`FetchTier`]s. Each tier
//! returns a [`RawFrame`] with the provider's own column names, or a
//! [`SourceError`] whose kind tells the fetcher what to do next:
//!
//! | Kind | Fetcher reaction |
//! |------|------------------|
//! | `NoData` | try the next tier |
//! | `Malformed` | jump straight to the raw CSV tier |
//! | `RateLimited` | abort the attempt, long backoff |
//! | `Unavailable` | abort the attempt, short backoff |
//! | `InvalidRequest` | fail immediately, never retried |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use crate::{Period, Symbol, ValidationError};

// Explicit 429 statuses are mapped to `RateLimited` by the adapters; the bare
// digits also appear in tickers and URLs.
const RATE_LIMIT_PATTERNS: [&str; 2] = ["too many requests", "rate limit"];

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    InvalidRequest,
    NoData,
    RateLimited,
    Malformed,
    Unavailable,
    Internal,
}

/// Structured fetch error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
}

impl SourceError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::InvalidRequest, message)
    }

    pub fn no_data(symbol: &Symbol) -> Self {
        Self::new(
            SourceErrorKind::NoData,
            format!("no data for ticker {symbol}"),
        )
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::RateLimited, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Malformed, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Internal, message)
    }

    fn new(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Throttling signalled either explicitly or through the message text.
    pub fn is_rate_limited(&self) -> bool {
        if self.kind == SourceErrorKind::RateLimited {
            return true;
        }
        let lowered = self.message.to_ascii_lowercase();
        RATE_LIMIT_PATTERNS
            .iter()
            .any(|pattern| lowered.contains(pattern))
    }

    pub const fn retryable(&self) -> bool {
        !matches!(self.kind, SourceErrorKind::InvalidRequest)
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::NoData => "source.no_data",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::Malformed => "source.malformed",
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

impl From<ValidationError> for SourceError {
    fn from(value: ValidationError) -> Self {
        Self::invalid_request(value.to_string())
    }
}

/// One provider cell before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Number(f64),
    Text(String),
    Missing,
}

/// Provider rows keyed by the provider's own column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

impl RawFrame {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<RawCell>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What a tier is asked to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub symbol: Symbol,
    pub period: Period,
}

impl FetchRequest {
    pub fn new(symbol: Symbol, period: Period) -> Self {
        Self { symbol, period }
    }
}

/// One acquisition strategy in the ordered fallback list.
///
/// An empty frame and `SourceErrorKind::NoData` both mean "nothing here,
/// move on".
pub trait FetchTier: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this is the low-level CSV tier a malformed payload jumps to.
    fn is_raw_fallback(&self) -> bool {
        false
    }

    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RawFrame, SourceError>> + Send + 'a>>;
}
