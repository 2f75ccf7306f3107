use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::freshness::{DataClass, FreshnessPolicy};

use super::{normalize_symbol, FxPair, FxRate, FxSource, MarketDataProvider, Quote, TtlCache};

/// Rate used for USD/BRL style pairs when the provider cannot answer.
pub const DEFAULT_FX_FALLBACK: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// Live quotes and FX rates with short TTLs.
///
/// Failures never surface to callers: a quote that cannot be fetched becomes a
/// not-found quote, and an FX rate that cannot be fetched becomes the fallback rate.
/// Both are cached like any other value so a failing upstream is asked at most once
/// per TTL.
pub struct QuoteCache {
    provider: Arc<dyn MarketDataProvider>,
    clock: Arc<dyn Clock>,
    policy: FreshnessPolicy,
    quotes: TtlCache<String, Quote>,
    fx: TtlCache<FxPair, FxRate>,
    fx_fallback: Decimal,
}

impl QuoteCache {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self::build(
            provider,
            Arc::new(SystemClock),
            FreshnessPolicy::default(),
            DEFAULT_FX_FALLBACK,
        )
    }

    fn build(
        provider: Arc<dyn MarketDataProvider>,
        clock: Arc<dyn Clock>,
        policy: FreshnessPolicy,
        fx_fallback: Decimal,
    ) -> Self {
        Self {
            quotes: TtlCache::new(DataClass::Quote, policy, clock.clone()),
            fx: TtlCache::new(DataClass::Fx, policy, clock.clone()),
            provider,
            clock,
            policy,
            fx_fallback,
        }
    }

    // The inner caches hold their own clock and policy, so rebuilding is the only
    // safe way to swap either one.
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self::build(self.provider, clock, self.policy, self.fx_fallback)
    }

    pub fn with_policy(self, policy: FreshnessPolicy) -> Self {
        Self::build(self.provider, self.clock, policy, self.fx_fallback)
    }

    pub fn with_fx_fallback(mut self, rate: Decimal) -> Self {
        self.fx_fallback = rate;
        self
    }

    pub fn fx_fallback(&self) -> Decimal {
        self.fx_fallback
    }

    /// Fresh cached quote, or exactly one provider call on a miss.
    pub async fn get_or_fetch(&self, symbol: &str) -> Quote {
        let symbol = normalize_symbol(symbol);
        if let Some(quote) = self.quotes.get_fresh(&symbol).await {
            debug!(symbol = %symbol, found = quote.found, "quote served from cache");
            return quote;
        }

        let fetched_at = self.clock.now();
        let quote = match self.provider.get_quote(&symbol).await {
            Ok(Some(data)) => {
                debug!(symbol = %symbol, price = %data.price, "quote fetched");
                Quote::found(&symbol, data, fetched_at)
            }
            Ok(None) => {
                info!(symbol = %symbol, "no quote available upstream");
                Quote::not_found(&symbol, fetched_at)
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "quote fetch failed");
                Quote::not_found(&symbol, fetched_at)
            }
        };

        self.quotes
            .insert_at(symbol, quote.clone(), fetched_at)
            .await;
        quote
    }

    /// Rate for `pair`. Identity pairs never reach the provider.
    pub async fn fx_rate(&self, pair: &FxPair) -> FxRate {
        let fetched_at = self.clock.now();
        if pair.is_identity() {
            return FxRate {
                pair: pair.clone(),
                rate: Decimal::ONE,
                fetched_at,
                source: FxSource::Identity,
            };
        }

        if let Some(rate) = self.fx.get_fresh(pair).await {
            debug!(pair = %pair, rate = %rate.rate, "fx rate served from cache");
            return rate;
        }

        let (rate, source) = match self.provider.get_fx(pair).await {
            Ok(rate) if rate > Decimal::ZERO => (rate, FxSource::Fetched),
            Ok(rate) => {
                warn!(pair = %pair, rate = %rate, fallback = %self.fx_fallback, "non-positive fx rate; using fallback");
                (self.fx_fallback, FxSource::Fallback)
            }
            Err(e) => {
                warn!(pair = %pair, error = %e, fallback = %self.fx_fallback, "fx fetch failed; using fallback");
                (self.fx_fallback, FxSource::Fallback)
            }
        };

        let value = FxRate {
            pair: pair.clone(),
            rate,
            fetched_at,
            source,
        };
        self.fx.insert_at(pair.clone(), value.clone(), fetched_at).await;
        value
    }
}
