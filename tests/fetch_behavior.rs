//! Behavior-driven tests for remote acquisition
//!
//! These tests verify HOW the fetcher walks its tiers, backs off between
//! attempts, and which error surfaces once the attempt budget is spent.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tickstore_core::{
    FetchRequest, FetchTier, Fetcher, Period, RawCell, RawFrame, RecordingSleeper, RetryPolicy,
    SessionDate, SourceError, SourceErrorKind, Symbol,
};

/// Tier that replays scripted outcomes, repeating the last one once the
/// script runs out.
struct ScriptedTier {
    name: &'static str,
    raw_fallback: bool,
    script: Mutex<VecDeque<Result<RawFrame, SourceError>>>,
    last: Mutex<Option<Result<RawFrame, SourceError>>>,
    calls: AtomicUsize,
}

impl ScriptedTier {
    fn new(name: &'static str, script: Vec<Result<RawFrame, SourceError>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            raw_fallback: name == "csv",
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    fn always(name: &'static str, outcome: Result<RawFrame, SourceError>) -> Arc<Self> {
        Self::new(name, vec![outcome])
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Result<RawFrame, SourceError> {
        let mut script = self.script.lock().expect("script lock");
        let mut last = self.last.lock().expect("last lock");
        if let Some(outcome) = script.pop_front() {
            *last = Some(outcome.clone());
            return outcome;
        }
        last.clone()
            .unwrap_or_else(|| Err(SourceError::internal("empty script")))
    }
}

impl FetchTier for ScriptedTier {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_raw_fallback(&self) -> bool {
        self.raw_fallback
    }

    fn fetch<'a>(
        &'a self,
        _request: &'a FetchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RawFrame, SourceError>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.next_outcome();
        Box::pin(async move { outcome })
    }
}

fn frame(rows: &[(&str, f64)]) -> RawFrame {
    let mut frame = RawFrame::new(vec![String::from("Date"), String::from("Close")]);
    for (date, close) in rows {
        frame.push_row(vec![RawCell::Text((*date).to_owned()), RawCell::Number(*close)]);
    }
    frame
}

fn fetcher(tiers: Vec<Arc<dyn FetchTier>>, sleeper: Arc<RecordingSleeper>) -> Fetcher {
    Fetcher::new(tiers).with_sleeper(sleeper)
}

fn within(actual: Duration, low_secs: f64, high_secs: f64) -> bool {
    let secs = actual.as_secs_f64();
    secs >= low_secs && secs < high_secs
}

// =============================================================================
// Fetch: Rate Limiting
// =============================================================================

#[tokio::test]
async fn when_provider_throttles_three_times_then_fetch_backs_off_exponentially_from_a_minute() {
    // Given: A tier that is rate limited three times before answering
    let chart = ScriptedTier::new(
        "chart",
        vec![
            Err(SourceError::rate_limited("429 Too Many Requests")),
            Err(SourceError::rate_limited("429 Too Many Requests")),
            Err(SourceError::rate_limited("429 Too Many Requests")),
            Ok(frame(&[("2025-01-02", 11.0), ("2025-01-03", 12.0)])),
        ],
    );
    let sleeper = Arc::new(RecordingSleeper::new());
    let fetcher = fetcher(vec![chart.clone()], sleeper.clone());

    // When: Fetching with a budget of four attempts
    let series = fetcher
        .fetch("AAPL", Period::OneYear, 4)
        .await
        .expect("fourth attempt succeeds");

    // Then: The series arrives after three jittered rate-limit sleeps
    assert_eq!(series.len(), 2);
    assert_eq!(chart.calls(), 4);
    let sleeps = sleeper.sleeps();
    assert_eq!(sleeps.len(), 3);
    assert!(within(sleeps[0], 60.0, 61.0), "first sleep {sleeps:?}");
    assert!(within(sleeps[1], 120.0, 121.0), "second sleep {sleeps:?}");
    assert!(within(sleeps[2], 240.0, 241.0), "third sleep {sleeps:?}");
}

#[tokio::test]
async fn when_rate_limit_backoff_grows_large_then_it_is_capped_at_thirty_minutes() {
    // Given: A tier that is always throttled and a generous budget
    let chart = ScriptedTier::always("chart", Err(SourceError::rate_limited("429")));
    let sleeper = Arc::new(RecordingSleeper::new());
    let fetcher = Fetcher::new(vec![chart])
        .with_policy(RetryPolicy::default().without_jitter())
        .with_sleeper(sleeper.clone());

    // When: Every attempt is spent
    let error = fetcher
        .fetch("AAPL", Period::OneYear, 8)
        .await
        .expect_err("throttled throughout");

    // Then: The last error is the rate limit and no delay exceeds the cap
    assert!(error.is_rate_limited());
    let sleeps = sleeper.sleeps();
    assert_eq!(sleeps.len(), 7);
    assert_eq!(sleeps[5], Duration::from_secs(1_800));
    assert_eq!(sleeps[6], Duration::from_secs(1_800));
}

#[tokio::test]
async fn when_last_attempt_fails_then_no_sleep_follows_it() {
    // Given: A tier that keeps failing with a transport error
    let chart = ScriptedTier::always("chart", Err(SourceError::unavailable("connection reset")));
    let sleeper = Arc::new(RecordingSleeper::new());
    let fetcher = Fetcher::new(vec![chart.clone()])
        .with_policy(RetryPolicy::default().without_jitter())
        .with_sleeper(sleeper.clone());

    // When: Fetching with three attempts
    let error = fetcher
        .fetch("AAPL", Period::OneYear, 3)
        .await
        .expect_err("all attempts fail");

    // Then: Two transient sleeps of 2s and 4s separate the three attempts
    assert_eq!(error.kind(), SourceErrorKind::Unavailable);
    assert_eq!(chart.calls(), 3);
    assert_eq!(
        sleeper.sleeps(),
        vec![Duration::from_secs(2), Duration::from_secs(4)]
    );
}

#[tokio::test]
async fn when_a_ticker_contains_429_then_missing_data_uses_the_short_backoff() {
    // Given: A ticker whose digits look like a throttling status
    let symbol = Symbol::parse("1429.HK").expect("symbol");
    let chart = ScriptedTier::always("chart", Err(SourceError::no_data(&symbol)));
    let sleeper = Arc::new(RecordingSleeper::new());
    let fetcher = Fetcher::new(vec![chart.clone()])
        .with_policy(RetryPolicy::default().without_jitter())
        .with_sleeper(sleeper.clone());

    // When: Every attempt finds no data
    let error = fetcher
        .fetch("1429.HK", Period::OneYear, 3)
        .await
        .expect_err("no data");

    // Then: The transient schedule applies, not the rate-limit one
    assert_eq!(error.kind(), SourceErrorKind::NoData);
    assert!(!error.is_rate_limited());
    assert_eq!(
        sleeper.sleeps(),
        vec![Duration::from_secs(2), Duration::from_secs(4)]
    );
}

// =============================================================================
// Fetch: Tier Fallback
// =============================================================================

#[tokio::test]
async fn when_primary_tier_is_empty_then_the_next_tier_answers_within_the_same_attempt() {
    // Given: An empty chart tier followed by a spark tier with rows
    let chart = ScriptedTier::always("chart", Ok(RawFrame::default()));
    let spark = ScriptedTier::always("spark", Ok(frame(&[("2025-01-02", 11.0)])));
    let csv = ScriptedTier::always("csv", Ok(frame(&[("2025-01-02", 99.0)])));
    let sleeper = Arc::new(RecordingSleeper::new());
    let fetcher = fetcher(vec![chart.clone(), spark.clone(), csv.clone()], sleeper.clone());

    // When: Fetching once
    let series = fetcher
        .fetch("MSFT", Period::OneMonth, 1)
        .await
        .expect("spark answers");

    // Then: The spark rows are used and the csv tier is never asked
    assert_eq!(series.records[0].close, Some(11.0));
    assert_eq!((chart.calls(), spark.calls(), csv.calls()), (1, 1, 0));
    assert!(sleeper.sleeps().is_empty());
}

#[tokio::test]
async fn when_primary_payload_is_malformed_then_fetch_jumps_to_the_csv_tier() {
    // Given: A chart tier returning HTML instead of JSON
    let chart = ScriptedTier::always("chart", Err(SourceError::malformed("expected JSON, got <html>")));
    let spark = ScriptedTier::always("spark", Ok(frame(&[("2025-01-02", 50.0)])));
    let csv = ScriptedTier::always(
        "csv",
        Ok(frame(&[("2025-01-02", 11.0), ("2025-01-03", 12.0)])),
    );
    let fetcher = fetcher(
        vec![chart.clone(), spark.clone(), csv.clone()],
        Arc::new(RecordingSleeper::new()),
    );

    // When: Fetching once
    let series = fetcher
        .fetch("AAPL", Period::OneYear, 1)
        .await
        .expect("csv answers");

    // Then: The raw CSV rows are used and spark is skipped
    assert_eq!(series.len(), 2);
    assert_eq!(spark.calls(), 0);
    assert_eq!(csv.calls(), 1);
    assert_eq!(series.records[1].date, Some(SessionDate::coerce("2025-01-03")));
}

#[tokio::test]
async fn when_every_tier_has_no_data_then_the_last_no_data_error_is_reported() {
    // Given: Tiers that are all empty for the ticker
    let chart = ScriptedTier::always("chart", Ok(RawFrame::default()));
    let spark = ScriptedTier::always(
        "spark",
        Err(SourceError::no_data(&Symbol::parse("ZZZZ").expect("symbol"))),
    );
    let sleeper = Arc::new(RecordingSleeper::new());
    let fetcher = Fetcher::new(vec![chart.clone(), spark.clone()])
        .with_policy(RetryPolicy::default().without_jitter())
        .with_sleeper(sleeper.clone());

    // When: Fetching with two attempts
    let error = fetcher
        .fetch("ZZZZ", Period::OneYear, 2)
        .await
        .expect_err("no tier has rows");

    // Then: The error from the final attempt is re-raised after one transient sleep
    assert_eq!(error.kind(), SourceErrorKind::NoData);
    assert!(error.message().contains("ZZZZ"));
    assert_eq!((chart.calls(), spark.calls()), (2, 2));
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(2)]);
}

// =============================================================================
// Fetch: Invalid Input
// =============================================================================

#[tokio::test]
async fn when_symbol_is_blank_then_fetch_fails_without_any_request() {
    // Given: A healthy tier
    let chart = ScriptedTier::always("chart", Ok(frame(&[("2025-01-02", 11.0)])));
    let sleeper = Arc::new(RecordingSleeper::new());
    let fetcher = fetcher(vec![chart.clone()], sleeper.clone());

    // When: Fetching an empty symbol
    let error = fetcher
        .fetch("   ", Period::OneYear, 5)
        .await
        .expect_err("blank symbol");

    // Then: The request is rejected up front
    assert_eq!(error.kind(), SourceErrorKind::InvalidRequest);
    assert_eq!(chart.calls(), 0);
    assert!(sleeper.sleeps().is_empty());
}

#[tokio::test]
async fn when_a_tier_rejects_the_request_then_it_is_never_retried() {
    // Given: A tier that reports the request itself as invalid
    let chart = ScriptedTier::always("chart", Err(SourceError::invalid_request("unknown interval")));
    let spark = ScriptedTier::always("spark", Ok(frame(&[("2025-01-02", 11.0)])));
    let sleeper = Arc::new(RecordingSleeper::new());
    let fetcher = fetcher(vec![chart.clone(), spark.clone()], sleeper.clone());

    // When: Fetching with a full budget
    let error = fetcher
        .fetch("AAPL", Period::OneYear, 5)
        .await
        .expect_err("invalid request");

    // Then: One call, no fallback, no sleep
    assert_eq!(error.kind(), SourceErrorKind::InvalidRequest);
    assert_eq!((chart.calls(), spark.calls()), (1, 0));
    assert!(sleeper.sleeps().is_empty());
}
