mod cache;
mod models;
mod orchestrator;
mod provider;
#[cfg(feature = "providers")]
pub mod providers;
mod quote_cache;
mod symbol;

pub use cache::TtlCache;
pub use models::{
    FxPair, FxRate, FxSource, HistoricalSeries, Quote, QuoteData, SeriesKey, SeriesPoint,
    SeriesRange,
};
pub use orchestrator::{
    FetchError, FetchOrchestrator, RefreshReport, RetryPolicy, DEFAULT_MAX_WORKERS,
};
pub use provider::{MarketDataProvider, ProviderError, SymbolFundamentals};
pub use quote_cache::{QuoteCache, DEFAULT_FX_FALLBACK};
pub use symbol::{normalize_symbol, provider_symbol};
