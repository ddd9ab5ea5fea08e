use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, warn};

use super::DebugArtifacts;
use crate::data_source::{FetchRequest, FetchTier, RawCell, RawFrame, SourceError};
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::{Symbol, UtcDateTime};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const REFERER: &str = "https://finance.yahoo.com/";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// Session - cookie/crumb handshake
// ============================================================================

/// Cached Yahoo crumb.
///
/// Yahoo's unofficial endpoints want a session cookie from `fc.yahoo.com`
/// (kept by the transport's cookie jar) and a crumb token passed as a query
/// parameter. The crumb is reused until it expires or a 401/403 invalidates it.
#[derive(Debug)]
pub struct YahooSession {
    crumb: Mutex<Option<CachedCrumb>>,
    ttl: Duration,
}

#[derive(Debug, Clone)]
struct CachedCrumb {
    value: String,
    obtained_at: Instant,
}

impl Default for YahooSession {
    fn default() -> Self {
        Self::new(Duration::from_secs(3_600))
    }
}

impl YahooSession {
    pub fn new(ttl: Duration) -> Self {
        Self {
            crumb: Mutex::new(None),
            ttl,
        }
    }

    fn cached(&self) -> Option<String> {
        let guard = self.crumb.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|cached| cached.obtained_at.elapsed() < self.ttl)
            .map(|cached| cached.value.clone())
    }

    fn store(&self, value: String) {
        *self.crumb.lock().unwrap_or_else(PoisonError::into_inner) = Some(CachedCrumb {
            value,
            obtained_at: Instant::now(),
        });
    }

    /// Drop the cached crumb so the next request performs a fresh handshake.
    pub fn invalidate(&self) {
        *self.crumb.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Current crumb, refreshing it through `http` when missing or expired.
    pub async fn crumb(
        &self,
        http: &dyn HttpClient,
        base_url: &str,
        timeout_ms: u64,
    ) -> Result<String, SourceError> {
        if let Some(crumb) = self.cached() {
            return Ok(crumb);
        }

        // fc.yahoo.com answers 404 but still sets the session cookie.
        let cookie_request = HttpRequest::get(COOKIE_URL)
            .with_header("referer", REFERER)
            .with_timeout_ms(timeout_ms);
        http.execute(cookie_request).await.map_err(|e| {
            SourceError::unavailable(format!("failed to fetch Yahoo cookie: {}", e.message()))
        })?;

        let crumb_request = HttpRequest::get(format!("{base_url}/v1/test/getcrumb"))
            .with_header("referer", REFERER)
            .with_timeout_ms(timeout_ms);
        let response = http.execute(crumb_request).await.map_err(|e| {
            SourceError::unavailable(format!("failed to fetch Yahoo crumb: {}", e.message()))
        })?;

        if response.is_rate_limited() || is_rate_limit_body(&response.body) {
            return Err(SourceError::rate_limited(
                "Yahoo rate limited while fetching crumb",
            ));
        }
        if !response.is_success() {
            return Err(SourceError::unavailable(format!(
                "Yahoo crumb endpoint returned status {}",
                response.status
            )));
        }

        let crumb = response.body.trim();
        if crumb.is_empty() || crumb.len() >= 100 || crumb.contains(['<', ' ']) {
            return Err(SourceError::unavailable("Yahoo returned an unusable crumb"));
        }

        self.store(crumb.to_owned());
        Ok(crumb.to_owned())
    }
}

fn is_rate_limit_body(body: &str) -> bool {
    body.to_ascii_lowercase().contains("too many requests")
}

// ============================================================================
// Connection - shared by all three tiers
// ============================================================================

/// Transport, session and diagnostics shared by the Yahoo tiers.
#[derive(Clone)]
pub struct YahooConnection {
    http: Arc<dyn HttpClient>,
    session: Option<Arc<YahooSession>>,
    debug: Option<DebugArtifacts>,
    base_url: String,
    timeout_ms: u64,
}

impl YahooConnection {
    /// Connection without a crumb session or debug capture.
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            session: None,
            debug: None,
            base_url: String::from(DEFAULT_BASE_URL),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_session(mut self, session: Arc<YahooSession>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_debug_artifacts(mut self, debug: DebugArtifacts) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// GET `path_and_query` (which must already contain a `?`) and return the
    /// body of a successful response.
    async fn get(
        &self,
        tier: &'static str,
        symbol: &Symbol,
        path_and_query: String,
    ) -> Result<String, SourceError> {
        let mut url = format!("{}{}", self.base_url, path_and_query);

        if let Some(session) = &self.session {
            match session
                .crumb(self.http.as_ref(), &self.base_url, self.timeout_ms)
                .await
            {
                Ok(crumb) => {
                    url.push_str("&crumb=");
                    url.push_str(&urlencoding::encode(&crumb));
                }
                Err(error) if error.is_rate_limited() => return Err(error),
                Err(error) => {
                    warn!(tier, symbol = %symbol, %error, "continuing without Yahoo crumb");
                }
            }
        }

        debug!(tier, symbol = %symbol, url = %url, "requesting Yahoo endpoint");
        let request = HttpRequest::get(url)
            .with_header("referer", REFERER)
            .with_timeout_ms(self.timeout_ms);
        let response = self.http.execute(request).await.map_err(|e| {
            SourceError::unavailable(format!("yahoo {tier} transport error: {}", e.message()))
        })?;

        self.check_status(tier, symbol, response)
    }

    fn check_status(
        &self,
        tier: &'static str,
        symbol: &Symbol,
        response: HttpResponse,
    ) -> Result<String, SourceError> {
        match response.status {
            429 => {
                self.capture(tier, symbol, &response);
                Err(SourceError::rate_limited(format!(
                    "yahoo {tier} returned 429 Too Many Requests for {symbol}"
                )))
            }
            401 | 403 => {
                if let Some(session) = &self.session {
                    session.invalidate();
                }
                Err(SourceError::unavailable(format!(
                    "yahoo {tier} rejected the session with status {}",
                    response.status
                )))
            }
            404 => Err(SourceError::no_data(symbol)),
            _ if !response.is_success() => Err(SourceError::unavailable(format!(
                "yahoo {tier} returned status {}",
                response.status
            ))),
            _ => Ok(response.body),
        }
    }

    fn capture(&self, tier: &'static str, symbol: &Symbol, response: &HttpResponse) {
        if let Some(debug) = &self.debug {
            debug.capture(tier, symbol, response.status, &response.body);
        }
    }

    fn malformed(&self, tier: &'static str, symbol: &Symbol, body: &str, reason: String) -> SourceError {
        self.capture(tier, symbol, &HttpResponse::ok(body));
        SourceError::malformed(format!("yahoo {tier} payload for {symbol}: {reason}"))
    }
}

/// The three Yahoo tiers in fallback order: chart, spark, CSV download.
pub fn yahoo_tiers(connection: YahooConnection) -> Vec<Arc<dyn FetchTier>> {
    vec![
        Arc::new(YahooChartTier::new(connection.clone())),
        Arc::new(YahooSparkTier::new(connection.clone())),
        Arc::new(YahooCsvTier::new(connection)),
    ]
}

// ============================================================================
// Tier a: v8 chart JSON
// ============================================================================

/// Primary tier: `/v8/finance/chart/{symbol}` with full OHLCV and adjusted close.
#[derive(Clone)]
pub struct YahooChartTier {
    connection: YahooConnection,
}

impl YahooChartTier {
    pub fn new(connection: YahooConnection) -> Self {
        Self { connection }
    }

    async fn fetch_frame(&self, request: &FetchRequest) -> Result<RawFrame, SourceError> {
        let symbol = &request.symbol;
        let path = format!(
            "/v8/finance/chart/{}?range={}&interval=1d&events=history",
            urlencoding::encode(symbol.as_str()),
            request.period
        );
        let body = self.connection.get(self.name(), symbol, path).await?;

        let envelope: YahooChartEnvelope = serde_json::from_str(&body).map_err(|e| {
            self.connection
                .malformed(self.name(), symbol, &body, format!("not chart JSON: {e}"))
        })?;

        if let Some(error) = envelope.chart.error {
            return Err(error.into_source_error(symbol));
        }

        let Some(result) = envelope.chart.result.and_then(|results| results.into_iter().next())
        else {
            return Ok(RawFrame::default());
        };

        Ok(result.into_frame())
    }
}

impl FetchTier for YahooChartTier {
    fn name(&self) -> &'static str {
        "chart"
    }

    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RawFrame, SourceError>> + Send + 'a>> {
        Box::pin(self.fetch_frame(request))
    }
}

// ============================================================================
// Tier b: v7 spark JSON (bulk endpoint, close only)
// ============================================================================

/// Secondary tier: the multi-symbol `/v7/finance/spark` endpoint.
#[derive(Clone)]
pub struct YahooSparkTier {
    connection: YahooConnection,
}

impl YahooSparkTier {
    pub fn new(connection: YahooConnection) -> Self {
        Self { connection }
    }

    async fn fetch_frame(&self, request: &FetchRequest) -> Result<RawFrame, SourceError> {
        let symbol = &request.symbol;
        let path = format!(
            "/v7/finance/spark?symbols={}&range={}&interval=1d",
            urlencoding::encode(symbol.as_str()),
            request.period
        );
        let body = self.connection.get(self.name(), symbol, path).await?;

        let envelope: YahooSparkEnvelope = serde_json::from_str(&body).map_err(|e| {
            self.connection
                .malformed(self.name(), symbol, &body, format!("not spark JSON: {e}"))
        })?;

        if let Some(error) = envelope.spark.error {
            return Err(error.into_source_error(symbol));
        }

        let series = envelope
            .spark
            .result
            .unwrap_or_default()
            .into_iter()
            .find(|entry| entry.symbol.eq_ignore_ascii_case(symbol.as_str()))
            .and_then(|entry| entry.response.into_iter().next());

        let Some(series) = series else {
            return Ok(RawFrame::default());
        };

        let timestamps = series.timestamp.unwrap_or_default();
        let closes = series
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|quote| quote.close)
            .unwrap_or_default();

        let mut frame = RawFrame::new(vec![String::from("timestamp"), String::from("close")]);
        for (index, timestamp) in timestamps.iter().enumerate() {
            frame.push_row(vec![
                RawCell::Number(*timestamp as f64),
                number_at(&closes, index),
            ]);
        }
        Ok(frame)
    }
}

impl FetchTier for YahooSparkTier {
    fn name(&self) -> &'static str {
        "spark"
    }

    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RawFrame, SourceError>> + Send + 'a>> {
        Box::pin(self.fetch_frame(request))
    }
}

// ============================================================================
// Tier c: v7 CSV download
// ============================================================================

/// Raw fallback tier: the `/v7/finance/download` CSV export.
///
/// The status is checked for 429 before the body is touched; a throttled or
/// unparseable response is saved to the debug directory.
#[derive(Clone)]
pub struct YahooCsvTier {
    connection: YahooConnection,
}

impl YahooCsvTier {
    pub fn new(connection: YahooConnection) -> Self {
        Self { connection }
    }

    async fn fetch_frame(&self, request: &FetchRequest) -> Result<RawFrame, SourceError> {
        let symbol = &request.symbol;
        let now = UtcDateTime::now();
        let path = format!(
            "/v7/finance/download/{}?period1={}&period2={}&interval=1d&events=history&includeAdjustedClose=true",
            urlencoding::encode(symbol.as_str()),
            request.period.start_timestamp(now.into_inner()),
            now.unix_timestamp()
        );
        let body = self.connection.get(self.name(), symbol, path).await?;

        parse_csv(&body).map_err(|reason| self.connection.malformed(self.name(), symbol, &body, reason))
    }
}

impl FetchTier for YahooCsvTier {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn is_raw_fallback(&self) -> bool {
        true
    }

    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RawFrame, SourceError>> + Send + 'a>> {
        Box::pin(self.fetch_frame(request))
    }
}

fn parse_csv(body: &str) -> Result<RawFrame, String> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('<') || trimmed.starts_with('{') {
        return Err(String::from("expected CSV, got markup or JSON"));
    }
    if trimmed.is_empty() {
        return Ok(RawFrame::default());
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(trimmed.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| format!("unreadable CSV header: {e}"))?
        .iter()
        .map(str::to_owned)
        .collect();
    if !headers.iter().any(|header| header.eq_ignore_ascii_case("date")) {
        return Err(format!("CSV header has no Date column: {}", headers.join(",")));
    }

    let mut frame = RawFrame::new(headers);
    for record in reader.records() {
        let record = record.map_err(|e| format!("unreadable CSV row: {e}"))?;
        frame.push_row(
            record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        RawCell::Missing
                    } else {
                        RawCell::Text(field.to_owned())
                    }
                })
                .collect(),
        );
    }
    Ok(frame)
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct YahooChartEnvelope {
    chart: YahooChartData,
}

#[derive(Debug, Deserialize)]
struct YahooChartData {
    #[serde(default)]
    result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
struct YahooSparkEnvelope {
    spark: YahooSparkData,
}

#[derive(Debug, Deserialize)]
struct YahooSparkData {
    #[serde(default)]
    result: Option<Vec<YahooSparkResult>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
struct YahooSparkResult {
    symbol: String,
    #[serde(default)]
    response: Vec<YahooChartResult>,
}

#[derive(Debug, Deserialize)]
struct YahooChartResult {
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    #[serde(default)]
    indicators: YahooChartIndicators,
}

#[derive(Debug, Default, Deserialize)]
struct YahooChartIndicators {
    #[serde(default)]
    quote: Vec<YahooChartQuote>,
    #[serde(default)]
    adjclose: Vec<YahooAdjClose>,
}

#[derive(Debug, Default, Deserialize)]
struct YahooChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct YahooAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct YahooApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

impl YahooApiError {
    fn into_source_error(self, symbol: &Symbol) -> SourceError {
        if self.code.eq_ignore_ascii_case("not found") {
            SourceError::no_data(symbol)
        } else {
            SourceError::unavailable(format!(
                "yahoo API error {}: {}",
                self.code, self.description
            ))
        }
    }
}

impl YahooChartResult {
    fn into_frame(self) -> RawFrame {
        let timestamps = self.timestamp.unwrap_or_default();
        let quote = self.indicators.quote.into_iter().next().unwrap_or_default();
        let adjclose = self
            .indicators
            .adjclose
            .into_iter()
            .next()
            .unwrap_or_default()
            .adjclose;

        let mut frame = RawFrame::new(
            ["timestamp", "open", "high", "low", "close", "adjclose", "volume"]
                .map(String::from)
                .to_vec(),
        );
        for (index, timestamp) in timestamps.iter().enumerate() {
            frame.push_row(vec![
                RawCell::Number(*timestamp as f64),
                number_at(&quote.open, index),
                number_at(&quote.high, index),
                number_at(&quote.low, index),
                number_at(&quote.close, index),
                number_at(&adjclose, index),
                number_at(&quote.volume, index),
            ]);
        }
        frame
    }
}

fn number_at(values: &[Option<f64>], index: usize) -> RawCell {
    values
        .get(index)
        .copied()
        .flatten()
        .map_or(RawCell::Missing, RawCell::Number)
}
