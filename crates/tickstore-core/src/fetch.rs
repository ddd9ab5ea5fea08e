//! Remote acquisition with tier fallback and retry.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::data_source::{FetchRequest, FetchTier, RawFrame, SourceError, SourceErrorKind};
use crate::normalize::normalize_frame;
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::{Period, Series, Symbol, UtcDateTime, ValidationError};

/// Runs the ordered tiers under a [`RetryPolicy`].
///
/// Within one attempt the tiers are tried in order until one returns rows. An
/// empty frame or `NoData` moves on to the next tier, a malformed payload jumps
/// straight to the raw fallback tier, and anything else ends the attempt.
pub struct Fetcher {
    tiers: Vec<Arc<dyn FetchTier>>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl Fetcher {
    pub fn new(tiers: Vec<Arc<dyn FetchTier>>) -> Self {
        Self {
            tiers,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch `symbol` with at most `max_retries` attempts.
    ///
    /// Invalid input fails before any request is made. After the budget is
    /// spent the error of the final attempt is returned; there is no sleep
    /// after the final attempt.
    pub async fn fetch(
        &self,
        symbol: &str,
        period: Period,
        max_retries: u32,
    ) -> Result<Series, SourceError> {
        let symbol = Symbol::parse(symbol)?;
        if max_retries == 0 {
            return Err(ValidationError::NoRetryBudget.into());
        }

        let request = FetchRequest::new(symbol, period);
        let mut attempt = 1;
        loop {
            match self.run_tiers(&request, attempt).await {
                Ok(frame) => {
                    let series = normalize_frame(&request.symbol, &frame, UtcDateTime::now());
                    info!(
                        symbol = %request.symbol,
                        attempt,
                        rows = series.len(),
                        "fetched price series"
                    );
                    return Ok(series);
                }
                Err(error) if !error.retryable() => return Err(error),
                Err(error) if attempt >= max_retries => {
                    warn!(
                        symbol = %request.symbol,
                        attempt,
                        code = error.code(),
                        "fetch retries exhausted"
                    );
                    return Err(error);
                }
                Err(error) => {
                    let rate_limited = error.is_rate_limited();
                    let delay = self.policy.delay_for_attempt(attempt, rate_limited);
                    warn!(
                        symbol = %request.symbol,
                        attempt,
                        rate_limited,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "fetch attempt failed, backing off"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Fetch with the policy's own attempt budget.
    pub async fn fetch_with_policy(&self, symbol: &str, period: Period) -> Result<Series, SourceError> {
        self.fetch(symbol, period, self.policy.max_attempts).await
    }

    async fn run_tiers(&self, request: &FetchRequest, attempt: u32) -> Result<RawFrame, SourceError> {
        let mut last_error = None;
        let mut index = 0;

        while let Some(tier) = self.tiers.get(index) {
            let outcome = tier.fetch(request).await;
            index += 1;

            match outcome {
                Ok(frame) if !frame.is_empty() => {
                    debug!(symbol = %request.symbol, attempt, tier = tier.name(), rows = frame.len(), "tier returned rows");
                    return Ok(frame);
                }
                Ok(_) => {
                    debug!(symbol = %request.symbol, attempt, tier = tier.name(), "tier returned no rows");
                    last_error = Some(SourceError::no_data(&request.symbol));
                }
                Err(error) => match error.kind() {
                    SourceErrorKind::NoData => {
                        debug!(symbol = %request.symbol, attempt, tier = tier.name(), "tier has no data");
                        last_error = Some(error);
                    }
                    SourceErrorKind::Malformed => {
                        warn!(symbol = %request.symbol, attempt, tier = tier.name(), %error, "malformed payload");
                        if !tier.is_raw_fallback() {
                            if let Some(raw) = self.raw_fallback_after(index) {
                                index = raw;
                            }
                        }
                        last_error = Some(error);
                    }
                    SourceErrorKind::InvalidRequest
                    | SourceErrorKind::RateLimited
                    | SourceErrorKind::Unavailable
                    | SourceErrorKind::Internal => return Err(error),
                },
            }
        }

        Err(last_error.unwrap_or_else(|| SourceError::no_data(&request.symbol)))
    }

    fn raw_fallback_after(&self, start: usize) -> Option<usize> {
        self.tiers
            .iter()
            .skip(start)
            .position(|tier| tier.is_raw_fallback())
            .map(|offset| start + offset)
    }
}
