//! Bounded-concurrency bulk fetching and the retrying series fetch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{
    normalize_symbol, HistoricalSeries, MarketDataProvider, Quote, QuoteCache, SeriesKey,
    TtlCache,
};
use crate::clock::{Clock, Sleeper, SystemClock, TokioSleeper};
use crate::freshness::{DataClass, FreshnessPolicy};
use crate::fundamentals::FundamentalsSync;

pub const DEFAULT_MAX_WORKERS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("worker pool needs at least one worker")]
    NoWorkers,
    #[error("worker pool closed: {0}")]
    PoolClosed(#[from] tokio::sync::AcquireError),
}

/// Attempts and first backoff delay for retryable series fetches. The delay doubles
/// after every retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(5),
        }
    }
}

/// Summary of a bulk fundamentals refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub attempted: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

fn unique_symbols(symbols: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    symbols
        .iter()
        .map(|s| normalize_symbol(s))
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

pub struct FetchOrchestrator {
    provider: Arc<dyn MarketDataProvider>,
    quotes: Arc<QuoteCache>,
    fundamentals: Arc<FundamentalsSync>,
    series: TtlCache<SeriesKey, HistoricalSeries>,
    clock: Arc<dyn Clock>,
    policy: FreshnessPolicy,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
    max_workers: usize,
}

impl FetchOrchestrator {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        quotes: Arc<QuoteCache>,
        fundamentals: Arc<FundamentalsSync>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let policy = FreshnessPolicy::default();
        Self {
            provider,
            quotes,
            fundamentals,
            series: TtlCache::new(DataClass::HistoricalSeries, policy, clock.clone()),
            clock,
            policy,
            sleeper: Arc::new(TokioSleeper),
            retry: RetryPolicy::default(),
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.series = TtlCache::new(DataClass::HistoricalSeries, self.policy, clock.clone());
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: FreshnessPolicy) -> Self {
        self.series = TtlCache::new(DataClass::HistoricalSeries, policy, self.clock.clone());
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn quotes(&self) -> &Arc<QuoteCache> {
        &self.quotes
    }

    pub fn fundamentals(&self) -> &Arc<FundamentalsSync> {
        &self.fundamentals
    }

    fn pool(&self, jobs: usize) -> Result<Arc<Semaphore>, FetchError> {
        if self.max_workers == 0 {
            return Err(FetchError::NoWorkers);
        }
        Ok(Arc::new(Semaphore::new(self.max_workers.min(jobs).max(1))))
    }

    /// One quote per input symbol, in input order.
    ///
    /// Each distinct symbol is fetched once. A worker that dies yields a not-found
    /// quote for its symbol.
    pub async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, FetchError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let unique = unique_symbols(symbols);
        let pool = self.pool(unique.len())?;
        debug!(symbols = symbols.len(), unique = unique.len(), "fetching quote batch");

        let mut handles: Vec<(String, JoinHandle<Quote>)> = Vec::with_capacity(unique.len());
        for symbol in unique {
            let permit = pool.clone().acquire_owned().await?;
            let quotes = self.quotes.clone();
            let task_symbol = symbol.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                quotes.get_or_fetch(&task_symbol).await
            });
            handles.push((symbol, handle));
        }

        let mut by_symbol = HashMap::with_capacity(handles.len());
        for (symbol, handle) in handles {
            let quote = match handle.await {
                Ok(quote) => quote,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "quote worker failed");
                    Quote::not_found(&symbol, self.clock.now())
                }
            };
            by_symbol.insert(symbol, quote);
        }

        Ok(symbols
            .iter()
            .map(|raw| {
                let symbol = normalize_symbol(raw);
                by_symbol
                    .get(&symbol)
                    .cloned()
                    .unwrap_or_else(|| Quote::not_found(&symbol, self.clock.now()))
            })
            .collect())
    }

    /// Sync fundamentals for every distinct symbol. Failures are logged and reported,
    /// never returned.
    pub async fn refresh_all(&self, symbols: &[String]) -> RefreshReport {
        let unique = unique_symbols(symbols);
        let mut report = RefreshReport {
            attempted: unique.len(),
            ..Default::default()
        };
        if unique.is_empty() {
            return report;
        }

        let pool = match self.pool(unique.len()) {
            Ok(pool) => pool,
            Err(e) => {
                error!(error = %e, "cannot start fundamentals refresh");
                report.failed = unique;
                return report;
            }
        };
        info!(symbols = unique.len(), "refreshing fundamentals");

        let mut handles = Vec::with_capacity(unique.len());
        for symbol in unique {
            let permit = match pool.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "worker pool closed");
                    report.failed.push(symbol);
                    continue;
                }
            };
            let sync = self.fundamentals.clone();
            let task_symbol = symbol.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                sync.sync_symbol(&task_symbol).await
            });
            handles.push((symbol, handle));
        }

        for (symbol, handle) in handles {
            match handle.await {
                Ok(Ok(outcome)) if outcome.ok => report.succeeded.push(symbol),
                Ok(Ok(outcome)) => {
                    warn!(symbol = %symbol, detail = %outcome.detail, "fundamentals sync rejected");
                    report.failed.push(symbol);
                }
                Ok(Err(e)) => {
                    error!(symbol = %symbol, error = %e, "fundamentals sync failed");
                    report.failed.push(symbol);
                }
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "fundamentals worker failed");
                    report.failed.push(symbol);
                }
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "fundamentals refresh finished"
        );
        report
    }

    /// Price history for `(symbol, period, interval)`, possibly empty.
    ///
    /// Retryable failures back off and retry; anything else gives up at once.
    /// Only non-empty results are cached.
    pub async fn fetch_series(&self, symbol: &str, period: &str, interval: &str) -> HistoricalSeries {
        let symbol = normalize_symbol(symbol);
        let key = SeriesKey {
            symbol: symbol.clone(),
            period: period.to_string(),
            interval: interval.to_string(),
        };
        if let Some(series) = self.series.get_fresh(&key).await {
            debug!(symbol = %symbol, period, interval, "series served from cache");
            return series;
        }

        let mut delay = self.retry.initial_delay;
        for attempt in 1..=self.retry.max_attempts {
            match self.provider.get_series(&symbol, period, interval).await {
                Ok(points) => {
                    let series = HistoricalSeries {
                        symbol: symbol.clone(),
                        period: period.to_string(),
                        interval: interval.to_string(),
                        points,
                    };
                    if series.is_empty() {
                        debug!(symbol = %symbol, period, interval, "provider returned empty series");
                    } else {
                        self.series.insert(key, series.clone()).await;
                    }
                    return series;
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        symbol = %symbol,
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        error = %e,
                        "series fetch failed; backing off"
                    );
                    self.sleeper.sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "series fetch failed");
                    return HistoricalSeries::empty(&symbol, period, interval);
                }
            }
        }

        warn!(
            symbol = %symbol,
            attempts = self.retry.max_attempts,
            "series fetch gave up"
        );
        HistoricalSeries::empty(&symbol, period, interval)
    }
}
