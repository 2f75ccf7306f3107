use rust_decimal::Decimal;

use super::{FxPair, QuoteData, SeriesPoint};
use crate::fundamentals::{DatasetKind, DatasetPayload};

/// Failure classes decided by the adapter, so callers never inspect error text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("transient upstream failure: {0}")]
    Transient(String),
    #[error("not found upstream: {0}")]
    NotFound(String),
    #[error("malformed upstream response: {0}")]
    Malformed(String),
    #[error("invalid symbol {0:?}")]
    InvalidSymbol(String),
    #[error("upstream error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Errors worth another attempt after a pause.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_) | ProviderError::NotFound(_))
    }
}

/// Per-symbol handle for the four fundamentals datasets.
#[async_trait::async_trait]
pub trait SymbolFundamentals: Send + Sync {
    fn symbol(&self) -> &str;

    /// `Ok(None)` means the provider has nothing for this dataset.
    async fn fetch(&self, kind: DatasetKind) -> Result<Option<DatasetPayload>, ProviderError>;
}

/// Upstream market data: quotes, FX, price history and fundamentals.
#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// `Ok(None)` is the typed not-found result.
    async fn get_quote(&self, symbol: &str) -> Result<Option<QuoteData>, ProviderError>;

    async fn get_fx(&self, pair: &FxPair) -> Result<Decimal, ProviderError>;

    async fn get_series(
        &self,
        symbol: &str,
        period: &str,
        interval: &str,
    ) -> Result<Vec<SeriesPoint>, ProviderError>;

    /// Build the handle for one symbol. Failing here is fatal for a fundamentals sync.
    fn fundamentals(&self, symbol: &str) -> Result<Box<dyn SymbolFundamentals>, ProviderError>;

    fn name(&self) -> &str;
}
