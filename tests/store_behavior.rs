//! Behavior-driven tests for the time-series store
//!
//! These tests verify HOW fetched rows become durable per-symbol files, how
//! later fetches merge into them, and what callers see when a fetch fails.

use std::fs;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::tempdir;
use tickstore_core::{
    FetchRequest, FetchTier, Period, PriceRecord, RawCell, RawFrame, RecordingSleeper,
    RetryPolicy, Series, SessionDate, SourceError, Symbol, UtcDateTime,
};
use tickstore_warehouse::{StoreConfig, TimeSeriesStore, WarehouseError};

/// Tier whose next answer is set by the test.
struct StubTier {
    outcome: Mutex<Result<RawFrame, SourceError>>,
    calls: AtomicUsize,
}

impl StubTier {
    fn answering(outcome: Result<RawFrame, SourceError>) -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(outcome),
            calls: AtomicUsize::new(0),
        })
    }

    fn set(&self, outcome: Result<RawFrame, SourceError>) {
        *self.outcome.lock().expect("outcome lock") = outcome;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FetchTier for StubTier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn fetch<'a>(
        &'a self,
        _request: &'a FetchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RawFrame, SourceError>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.outcome.lock().expect("outcome lock").clone();
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

fn store_with(root: &Path, tier: Arc<StubTier>, max_attempts: u32) -> TimeSeriesStore {
    let config = StoreConfig::new(root)
        .with_retry(RetryPolicy::default().with_max_attempts(max_attempts).without_jitter());
    let tiers: Vec<Arc<dyn FetchTier>> = vec![tier];
    TimeSeriesStore::new(config, tiers).with_sleeper(Arc::new(RecordingSleeper::new()))
}

fn closes(series: &Series) -> Vec<(String, f64)> {
    series
        .records
        .iter()
        .map(|record| {
            (
                record.date.as_ref().map(SessionDate::to_string).unwrap_or_default(),
                record.close.unwrap_or(f64::NAN),
            )
        })
        .collect()
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =============================================================================
// Store: First Fetch
// =============================================================================

#[tokio::test]
async fn when_user_fetches_a_new_symbol_then_stored_rows_equal_the_fetched_rows() {
    // Given: An empty store and a provider with two sessions
    let temp = tempdir().expect("tempdir");
    let tier = StubTier::answering(Ok(frame(&[("2025-01-01", 10.0), ("2025-01-02", 11.0)])));
    let store = store_with(temp.path(), tier, 1);

    // When: The symbol is fetched and merged
    let merged = store
        .fetch_and_merge("AAPL", Period::OneMonth)
        .await
        .expect("fetch and merge");

    // Then: The file on disk holds exactly the fetched rows
    let stored = store.read("AAPL").expect("read back");
    assert_eq!(closes(&stored), closes(&merged));
    assert_eq!(
        closes(&stored),
        vec![(String::from("2025-01-01"), 10.0), (String::from("2025-01-02"), 11.0)]
    );
    assert_eq!(
        entries(temp.path()),
        vec!["stock_AAPL.meta.json", "stock_AAPL.parquet"]
    );

    let metadata = store
        .series_store()
        .read_metadata(&Symbol::parse("AAPL").expect("symbol"))
        .expect("sidecar");
    assert_eq!(metadata.rows, Some(2));
    assert!(metadata.merged_at.is_some());
    assert_eq!(metadata.extra["period"], "1mo");
}

// =============================================================================
// Store: Incremental Merge
// =============================================================================

#[tokio::test]
async fn when_a_later_fetch_overlaps_then_fresh_closes_replace_stored_ones() {
    // Given: A stored series for 01-01 and 01-02
    let temp = tempdir().expect("tempdir");
    let tier = StubTier::answering(Ok(frame(&[("2025-01-01", 10.0), ("2025-01-02", 11.0)])));
    let store = store_with(temp.path(), tier.clone(), 1);
    store
        .fetch_and_merge("AAPL", Period::OneYear)
        .await
        .expect("initial fetch");

    // When: A later fetch revises 01-02 and adds 01-03
    tier.set(Ok(frame(&[("2025-01-02", 12.0), ("2025-01-03", 13.0)])));
    store
        .fetch_and_merge("AAPL", Period::OneYear)
        .await
        .expect("second fetch");

    // Then: The stored series is 10, 12, 13
    let stored = store.read("AAPL").expect("read back");
    assert_eq!(
        closes(&stored),
        vec![
            (String::from("2025-01-01"), 10.0),
            (String::from("2025-01-02"), 12.0),
            (String::from("2025-01-03"), 13.0),
        ]
    );
}

#[tokio::test]
async fn when_a_fetch_fails_then_the_stored_series_is_untouched() {
    // Given: A stored series
    let temp = tempdir().expect("tempdir");
    let tier = StubTier::answering(Ok(frame(&[("2025-01-01", 10.0)])));
    let store = store_with(temp.path(), tier.clone(), 2);
    store
        .fetch_and_merge("AAPL", Period::OneYear)
        .await
        .expect("initial fetch");
    let data_path = temp.path().join("stock_AAPL.parquet");
    let before = fs::read(&data_path).expect("stored bytes");

    // When: Every later attempt is throttled
    tier.set(Err(SourceError::rate_limited("429 Too Many Requests")));
    let error = store
        .fetch_and_merge("AAPL", Period::OneYear)
        .await
        .expect_err("throttled");

    // Then: The rate limit surfaces and the file is byte-for-byte unchanged
    assert!(error.is_rate_limited());
    assert_eq!(tier.calls(), 3);
    assert_eq!(fs::read(&data_path).expect("stored bytes"), before);
}

#[tokio::test]
async fn when_the_stored_file_is_unreadable_then_the_merge_starts_from_the_fetch() {
    // Given: A data file that is not Parquet
    let temp = tempdir().expect("tempdir");
    let data_path = temp.path().join("stock_AAPL.parquet");
    fs::write(&data_path, b"not a parquet file").expect("write garbage");
    let tier = StubTier::answering(Ok(frame(&[("2025-01-02", 12.0), ("2025-01-03", 13.0)])));
    let store = store_with(temp.path(), tier, 1);

    // When: Fetching and merging
    let merged = store
        .fetch_and_merge("AAPL", Period::OneYear)
        .await
        .expect("merge replaces unreadable data");

    // Then: The result and the rewritten file hold only the fresh rows
    let expected = vec![(String::from("2025-01-02"), 12.0), (String::from("2025-01-03"), 13.0)];
    assert_eq!(closes(&merged), expected);
    assert_eq!(closes(&store.read("AAPL").expect("read back")), expected);
}

// =============================================================================
// Store: Persist And Read
// =============================================================================

#[tokio::test]
async fn when_an_empty_series_is_persisted_then_nothing_is_written() {
    // Given: An empty store
    let temp = tempdir().expect("tempdir");
    let store = store_with(temp.path(), StubTier::answering(Ok(RawFrame::default())), 1);

    // When: Persisting a series with no rows
    let error = store
        .persist(&Series::empty(Symbol::parse("AAPL").expect("symbol")), None)
        .expect_err("empty series");

    // Then: The call fails and the root stays empty
    assert!(matches!(error, WarehouseError::EmptySeries { .. }));
    assert!(entries(temp.path()).is_empty());
}

#[tokio::test]
async fn when_the_final_rename_fails_then_no_staging_directory_is_left_behind() {
    // Given: A directory squatting on the data file path
    let temp = tempdir().expect("tempdir");
    let store = store_with(temp.path(), StubTier::answering(Ok(RawFrame::default())), 1);
    let data_path = temp.path().join("stock_AAPL.parquet");
    fs::create_dir(&data_path).expect("blocking dir");
    fs::write(data_path.join("keep"), b"x").expect("blocking file");
    let fetched_at = UtcDateTime::parse("2025-01-05T00:00:00Z").expect("timestamp");
    let series = Series::new(
        Symbol::parse("AAPL").expect("symbol"),
        vec![PriceRecord::close_only(SessionDate::coerce("2025-01-02"), 11.0, fetched_at)],
    );

    // When: Persisting
    let error = store.persist(&series, None).expect_err("rename must fail");

    // Then: The I/O error surfaces and the scratch directory is gone
    assert!(matches!(error, WarehouseError::Io(_)));
    assert_eq!(entries(temp.path()), vec!["stock_AAPL.parquet"]);
    assert!(data_path.is_dir());
}

#[tokio::test]
async fn when_nothing_is_stored_then_read_reports_not_found() {
    // Given: An empty store
    let temp = tempdir().expect("tempdir");
    let store = store_with(temp.path(), StubTier::answering(Ok(RawFrame::default())), 1);

    // When: Reading an unknown symbol
    let error = store.read("AAPL").expect_err("missing");

    // Then: The error is NotFound
    assert!(error.is_not_found());
    assert_eq!(error.code(), "store.not_found");
}

#[tokio::test]
async fn when_a_symbol_contains_a_path_separator_then_read_rejects_it() {
    // Given: An empty store
    let temp = tempdir().expect("tempdir");
    let store = store_with(temp.path(), StubTier::answering(Ok(RawFrame::default())), 1);

    // When: Reading a symbol that would escape the root
    let error = store.read("../etc/passwd").expect_err("invalid symbol");

    // Then: It is refused as an invalid argument
    assert!(matches!(error, WarehouseError::InvalidArgument(_)));
}

// =============================================================================
// Store: Price Queries
// =============================================================================

#[tokio::test]
async fn when_more_days_are_requested_than_stored_then_all_rows_are_returned() {
    // Given: Five stored sessions
    let temp = tempdir().expect("tempdir");
    let tier = StubTier::answering(Ok(RawFrame::default()));
    let store = store_with(temp.path(), tier.clone(), 1);
    let fetched_at = UtcDateTime::parse("2025-01-08T00:00:00Z").expect("timestamp");
    let records = ["2025-01-02", "2025-01-03", "2025-01-06", "2025-01-07", "2025-01-08"]
        .iter()
        .enumerate()
        .map(|(index, day)| {
            PriceRecord::close_only(SessionDate::coerce(day), 100.0 + index as f64, fetched_at)
        })
        .collect();
    store
        .persist(&Series::new(Symbol::parse("AAPL").expect("symbol"), records), None)
        .expect("persist");

    // When: Asking for ninety days without refresh
    let response = store.get_prices("AAPL", 90, false).await.expect("prices");

    // Then: All five rows come back and no fetch was made
    assert_eq!(response.records.len(), 5);
    assert_eq!(response.records[4].close, Some(104.0));
    assert_eq!(tier.calls(), 0);
}

#[tokio::test]
async fn when_a_symbol_is_not_stored_then_get_prices_bootstraps_it() {
    // Given: An empty store and a provider with three sessions
    let temp = tempdir().expect("tempdir");
    let tier = StubTier::answering(Ok(frame(&[
        ("2025-01-02", 11.0),
        ("2025-01-03", 12.0),
        ("2025-01-06", 13.0),
    ])));
    let store = store_with(temp.path(), tier.clone(), 1);

    // When: Asking for the last two days
    let response = store.get_prices("MSFT", 2, false).await.expect("prices");

    // Then: One fetch fills the store and the two latest rows are returned
    assert_eq!(tier.calls(), 1);
    let closes: Vec<Option<f64>> = response.records.iter().map(|record| record.close).collect();
    assert_eq!(closes, vec![Some(12.0), Some(13.0)]);
    assert!(temp.path().join("stock_MSFT.parquet").is_file());
}

#[tokio::test]
async fn when_zero_days_are_requested_then_get_prices_rejects_the_call() {
    // Given: A store whose provider would answer
    let temp = tempdir().expect("tempdir");
    let tier = StubTier::answering(Ok(frame(&[("2025-01-02", 11.0)])));
    let store = store_with(temp.path(), tier.clone(), 1);

    // When: Asking for zero days
    let error = store.get_prices("AAPL", 0, true).await.expect_err("zero days");

    // Then: It is an invalid argument and the provider is not called
    assert!(matches!(error, WarehouseError::InvalidArgument(_)));
    assert_eq!(tier.calls(), 0);
}
