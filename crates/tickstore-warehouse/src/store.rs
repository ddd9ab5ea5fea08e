use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tickstore_core::{
    merge_series, yahoo_tiers, DebugArtifacts, FetchTier, Fetcher, HttpClient, Period,
    PriceRecord, Series, SeriesMetadata, Sleeper, Symbol, UtcDateTime, ValidationError,
    YahooConnection, YahooSession,
};
use tracing::{debug, info, warn};

use crate::{parquet, sidecar, StoreConfig, WarehouseError};

/// Atomic per-symbol Parquet files plus their metadata sidecars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesStore {
    root: PathBuf,
}

impl SeriesStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/stock_<SYMBOL>.parquet`
    pub fn data_path(&self, symbol: &Symbol) -> PathBuf {
        self.root.join(format!("stock_{symbol}.parquet"))
    }

    /// `<root>/stock_<SYMBOL>.meta.json`
    pub fn metadata_path(&self, symbol: &Symbol) -> PathBuf {
        self.root.join(format!("stock_{symbol}.meta.json"))
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.data_path(symbol).is_file()
    }

    /// Replace the stored series with `series` and refresh its sidecar.
    ///
    /// The Parquet file is staged in a scratch directory inside the root and
    /// renamed into place; the scratch directory is removed whether or not the
    /// write succeeds. The sidecar is written afterwards and a failure there
    /// is only logged.
    pub fn persist(
        &self,
        series: &Series,
        metadata: Option<SeriesMetadata>,
    ) -> Result<PathBuf, WarehouseError> {
        let symbol = &series.symbol;
        if series.is_empty() {
            return Err(WarehouseError::EmptySeries {
                symbol: symbol.to_string(),
            });
        }

        fs::create_dir_all(&self.root)?;
        let target = self.data_path(symbol);
        let scratch = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.root)?;
        let staged = scratch.path().join(format!("stock_{symbol}.parquet"));

        parquet::write_series(&staged, series)?;
        fs::rename(&staged, &target)?;
        drop(scratch);

        let metadata = metadata
            .unwrap_or_default()
            .completed(series.len(), UtcDateTime::now());
        if let Err(error) = sidecar::write_metadata(&self.metadata_path(symbol), &metadata) {
            warn!(symbol = %symbol, %error, "failed to write metadata sidecar");
        }

        info!(
            symbol = %symbol,
            rows = series.len(),
            path = %target.display(),
            "persisted series"
        );
        Ok(target)
    }

    /// Load the stored series for `symbol`.
    pub fn read(&self, symbol: &Symbol) -> Result<Series, WarehouseError> {
        let path = self.data_path(symbol);
        if !path.is_file() {
            return Err(WarehouseError::NotFound {
                symbol: symbol.to_string(),
            });
        }
        let series = parquet::read_series(&path, symbol)?;
        debug!(symbol = %symbol, rows = series.len(), "read stored series");
        Ok(series)
    }

    /// Load the sidecar for `symbol`. Informational only.
    pub fn read_metadata(&self, symbol: &Symbol) -> Result<SeriesMetadata, WarehouseError> {
        let path = self.metadata_path(symbol);
        if !path.is_file() {
            return Err(WarehouseError::NotFound {
                symbol: symbol.to_string(),
            });
        }
        sidecar::read_metadata(&path)
    }
}

/// Response of [`TimeSeriesStore::get_prices`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceResponse {
    pub symbol: Symbol,
    pub records: Vec<PriceRecord>,
}

/// Fetch, merge and persist price series for the presentation layer.
pub struct TimeSeriesStore {
    config: StoreConfig,
    series: SeriesStore,
    fetcher: Fetcher,
}

impl TimeSeriesStore {
    /// Store over an explicit list of fetch tiers.
    pub fn new(config: StoreConfig, tiers: Vec<Arc<dyn FetchTier>>) -> Self {
        let fetcher = Fetcher::new(tiers).with_policy(config.retry.clone());
        let series = SeriesStore::new(config.root.clone());
        Self {
            config,
            series,
            fetcher,
        }
    }

    /// Store over the Yahoo tiers, saving diagnostics under `<root>/debug`.
    pub fn yahoo(config: StoreConfig, http: Arc<dyn HttpClient>) -> Self {
        let connection = YahooConnection::new(http)
            .with_timeout_ms(config.request_timeout_ms)
            .with_session(Arc::new(YahooSession::default()))
            .with_debug_artifacts(DebugArtifacts::new(config.debug_dir()));
        Self::new(config, yahoo_tiers(connection))
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.fetcher = self.fetcher.with_sleeper(sleeper);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn series_store(&self) -> &SeriesStore {
        &self.series
    }

    /// Fetch without touching storage.
    pub async fn fetch(&self, symbol: &str, period: Period) -> Result<Series, WarehouseError> {
        Ok(self.fetcher.fetch_with_policy(symbol, period).await?)
    }

    pub fn read(&self, symbol: &str) -> Result<Series, WarehouseError> {
        self.series.read(&Symbol::parse(symbol)?)
    }

    pub fn persist(
        &self,
        series: &Series,
        metadata: Option<SeriesMetadata>,
    ) -> Result<PathBuf, WarehouseError> {
        self.series.persist(series, metadata)
    }

    /// Fetch fresh rows and merge them into the stored series.
    ///
    /// A failed fetch propagates without touching storage. An unreadable
    /// stored series is logged and treated as empty.
    pub async fn fetch_and_merge(
        &self,
        symbol: &str,
        period: Period,
    ) -> Result<Series, WarehouseError> {
        let fresh = self.fetch(symbol, period).await?;

        let existing = match self.series.read(&fresh.symbol) {
            Ok(existing) => existing,
            Err(WarehouseError::NotFound { .. }) => Series::empty(fresh.symbol.clone()),
            Err(error) => {
                warn!(symbol = %fresh.symbol, %error, "stored series unreadable, replacing it");
                Series::empty(fresh.symbol.clone())
            }
        };

        let merged = merge_series(&existing, &fresh);
        info!(
            symbol = %merged.symbol,
            stored = existing.len(),
            fetched = fresh.len(),
            merged = merged.len(),
            "merged series"
        );

        let metadata =
            SeriesMetadata::merged(UtcDateTime::now()).with_field("period", period.as_str());
        self.series.persist(&merged, Some(metadata))?;
        Ok(merged)
    }

    /// The most recent `days` records for `symbol`.
    ///
    /// `refresh` forces a fetch-and-merge first. Without it, a symbol with no
    /// stored series is bootstrapped the same way.
    pub async fn get_prices(
        &self,
        symbol: &str,
        days: usize,
        refresh: bool,
    ) -> Result<PriceResponse, WarehouseError> {
        if days == 0 {
            return Err(ValidationError::NonPositiveDays.into());
        }
        let symbol = Symbol::parse(symbol)?;

        let series = if refresh {
            self.fetch_and_merge(symbol.as_str(), Period::default()).await?
        } else {
            match self.series.read(&symbol) {
                Ok(series) => series,
                Err(WarehouseError::NotFound { .. }) => {
                    info!(symbol = %symbol, "no local series, bootstrapping");
                    self.fetch_and_merge(symbol.as_str(), Period::default()).await?
                }
                Err(error) => return Err(error),
            }
        };

        Ok(PriceResponse {
            records: series.tail(days).to_vec(),
            symbol,
        })
    }
}
