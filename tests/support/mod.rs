#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use portfolio_sync::clock::Sleeper;
use portfolio_sync::fundamentals::{DatasetKind, DatasetPayload};
use portfolio_sync::market_data::{
    FxPair, MarketDataProvider, ProviderError, QuoteData, SeriesPoint, SymbolFundamentals,
};
use rust_decimal::Decimal;

pub fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 13, 0, 0).unwrap()
}

pub fn point(day: u32, close: &str) -> SeriesPoint {
    SeriesPoint {
        timestamp: Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).unwrap(),
        close: d(close),
        adjusted_close: d(close),
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

type DatasetScript = HashMap<DatasetKind, Result<Option<DatasetPayload>, ProviderError>>;

/// Scriptable provider with call counters.
#[derive(Default)]
pub struct MockProvider {
    quotes: Mutex<HashMap<String, Result<Option<QuoteData>, ProviderError>>>,
    panicking: Mutex<HashSet<String>>,
    quote_delay: Mutex<Duration>,
    fx: Mutex<Option<Result<Decimal, ProviderError>>>,
    series: Mutex<VecDeque<Result<Vec<SeriesPoint>, ProviderError>>>,
    datasets: Arc<Mutex<DatasetScript>>,
    failing_symbols: Arc<Mutex<HashSet<String>>>,
    failing_datasets: Arc<Mutex<HashSet<(String, DatasetKind)>>>,
    invalid_symbols: Mutex<HashSet<String>>,

    pub quote_calls: AtomicUsize,
    pub fx_calls: AtomicUsize,
    pub series_calls: AtomicUsize,
    pub dataset_calls: Arc<AtomicUsize>,
    quote_calls_by_symbol: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(self, symbol: &str, price: &str, change: &str) -> Self {
        lock(&self.quotes).insert(
            symbol.to_string(),
            Ok(Some(QuoteData {
                price: d(price),
                change_percent: d(change),
            })),
        );
        self
    }

    pub fn with_quote_error(self, symbol: &str, error: ProviderError) -> Self {
        lock(&self.quotes).insert(symbol.to_string(), Err(error));
        self
    }

    pub fn with_panicking_quote(self, symbol: &str) -> Self {
        lock(&self.panicking).insert(symbol.to_string());
        self
    }

    pub fn with_quote_delay(self, delay: Duration) -> Self {
        *lock(&self.quote_delay) = delay;
        self
    }

    pub fn with_fx(self, rate: &str) -> Self {
        *lock(&self.fx) = Some(Ok(d(rate)));
        self
    }

    pub fn with_fx_error(self, error: ProviderError) -> Self {
        *lock(&self.fx) = Some(Err(error));
        self
    }

    /// Results handed out by successive `get_series` calls.
    pub fn with_series_script(
        self,
        script: Vec<Result<Vec<SeriesPoint>, ProviderError>>,
    ) -> Self {
        *lock(&self.series) = script.into();
        self
    }

    pub fn with_dataset(self, kind: DatasetKind, payload: DatasetPayload) -> Self {
        lock(&self.datasets).insert(kind, Ok(Some(payload)));
        self
    }

    pub fn with_dataset_error(self, kind: DatasetKind, error: ProviderError) -> Self {
        lock(&self.datasets).insert(kind, Err(error));
        self
    }

    /// Every dataset fetch for `symbol` fails.
    pub fn with_failing_symbol(self, symbol: &str) -> Self {
        lock(&self.failing_symbols).insert(symbol.to_string());
        self
    }

    /// Only `kind` fails for `symbol`; its other datasets follow the script.
    pub fn with_failing_dataset(self, symbol: &str, kind: DatasetKind) -> Self {
        lock(&self.failing_datasets).insert((symbol.to_string(), kind));
        self
    }

    pub fn with_invalid_symbol(self, symbol: &str) -> Self {
        lock(&self.invalid_symbols).insert(symbol.to_string());
        self
    }

    pub fn set_dataset_error(&self, kind: DatasetKind, error: ProviderError) {
        lock(&self.datasets).insert(kind, Err(error));
    }

    pub fn quote_calls_for(&self, symbol: &str) -> usize {
        lock(&self.quote_calls_by_symbol)
            .get(symbol)
            .copied()
            .unwrap_or(0)
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    async fn get_quote(&self, symbol: &str) -> Result<Option<QuoteData>, ProviderError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.quote_calls_by_symbol)
            .entry(symbol.to_string())
            .or_default() += 1;

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        let delay = *lock(&self.quote_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if lock(&self.panicking).contains(symbol) {
            panic!("provider blew up for {symbol}");
        }
        lock(&self.quotes)
            .get(symbol)
            .cloned()
            .unwrap_or(Ok(None))
    }

    async fn get_fx(&self, _pair: &FxPair) -> Result<Decimal, ProviderError> {
        self.fx_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.fx)
            .clone()
            .unwrap_or_else(|| Err(ProviderError::NotFound("no fx scripted".to_string())))
    }

    async fn get_series(
        &self,
        _symbol: &str,
        _period: &str,
        _interval: &str,
    ) -> Result<Vec<SeriesPoint>, ProviderError> {
        self.series_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.series).pop_front().unwrap_or(Ok(Vec::new()))
    }

    fn fundamentals(&self, symbol: &str) -> Result<Box<dyn SymbolFundamentals>, ProviderError> {
        if lock(&self.invalid_symbols).contains(symbol) {
            return Err(ProviderError::InvalidSymbol(symbol.to_string()));
        }
        Ok(Box::new(MockFundamentals {
            symbol: symbol.to_string(),
            datasets: self.datasets.clone(),
            failing_symbols: self.failing_symbols.clone(),
            failing_datasets: self.failing_datasets.clone(),
            calls: self.dataset_calls.clone(),
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockFundamentals {
    symbol: String,
    datasets: Arc<Mutex<DatasetScript>>,
    failing_symbols: Arc<Mutex<HashSet<String>>>,
    failing_datasets: Arc<Mutex<HashSet<(String, DatasetKind)>>>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl SymbolFundamentals for MockFundamentals {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn fetch(&self, kind: DatasetKind) -> Result<Option<DatasetPayload>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if lock(&self.failing_symbols).contains(&self.symbol) {
            return Err(ProviderError::Other(format!("{} is broken", self.symbol)));
        }
        if lock(&self.failing_datasets).contains(&(self.symbol.clone(), kind)) {
            return Err(ProviderError::Transient(format!("{} {kind} timed out", self.symbol)));
        }
        lock(&self.datasets).get(&kind).cloned().unwrap_or(Ok(None))
    }
}

/// Records requested delays without waiting.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        lock(&self.slept).clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.slept).push(duration);
    }
}

/// Orchestrator over `provider` with in-memory fundamentals and a recording sleeper.
pub fn orchestrator(
    provider: Arc<MockProvider>,
    clock: Arc<portfolio_sync::clock::ManualClock>,
    sleeper: Arc<RecordingSleeper>,
) -> portfolio_sync::market_data::FetchOrchestrator {
    use portfolio_sync::fundamentals::{FundamentalsSync, MemoryFundamentalsStore};
    use portfolio_sync::market_data::{FetchOrchestrator, QuoteCache};

    let quotes = Arc::new(QuoteCache::new(provider.clone()).with_clock(clock.clone()));
    let fundamentals = Arc::new(
        FundamentalsSync::new(provider.clone(), Arc::new(MemoryFundamentalsStore::new()))
            .with_clock(clock.clone()),
    );
    FetchOrchestrator::new(provider, quotes, fundamentals)
        .with_clock(clock)
        .with_sleeper(sleeper)
}
