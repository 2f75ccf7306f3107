use std::sync::Arc;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::fundamentals::FundamentalsBundle;
use crate::market_data::{provider_symbol, FetchOrchestrator, FxPair};
use crate::models::{AssetClass, Position, PositionCurrency};
use crate::valuation::{value_portfolio, PortfolioValuation, PositionValuation};

/// Everything known about one holding, as handed to the analysis provider and
/// hashed for the asset report cache. Amounts are floats so the document reads
/// like ordinary JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSnapshot {
    pub symbol: String,
    pub code: String,
    pub display_name: String,
    pub asset_class: AssetClass,
    pub currency: PositionCurrency,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub avg_cost: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub market_value: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost_basis: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub pnl: Decimal,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub pnl_percent: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float")]
    pub daily_change_percent: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub percent_of_portfolio: Decimal,
    pub priced: bool,
    pub sector: Option<String>,
    pub country: Option<String>,
    pub fundamentals: FundamentalsBundle,
}

impl AssetSnapshot {
    pub fn new(symbol: &str, line: &PositionValuation, fundamentals: FundamentalsBundle) -> Self {
        let (sector, country) = fundamentals.sector_and_country();
        Self {
            symbol: symbol.to_string(),
            code: line.code.clone(),
            display_name: line.display_name.clone(),
            asset_class: line.asset_class,
            currency: line.currency,
            quantity: line.quantity,
            avg_cost: line.avg_cost,
            current_price: line.current_price,
            market_value: line.market_value,
            cost_basis: line.cost_basis,
            pnl: line.pnl,
            pnl_percent: line.pnl_percent,
            daily_change_percent: line.daily_change_percent,
            percent_of_portfolio: line.percent_of_portfolio,
            priced: line.priced,
            sector,
            country,
            fundamentals,
        }
    }
}

/// Joins positions with live market data.
pub struct PortfolioService {
    orchestrator: Arc<FetchOrchestrator>,
    local_market_suffix: String,
    fx_pair: FxPair,
}

impl PortfolioService {
    pub fn new(orchestrator: Arc<FetchOrchestrator>) -> Self {
        Self {
            orchestrator,
            local_market_suffix: ".SA".to_string(),
            fx_pair: FxPair::new("USD", "BRL"),
        }
    }

    pub fn with_local_market_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.local_market_suffix = suffix.into();
        self
    }

    /// Pair converting the foreign currency into the reporting currency.
    pub fn with_fx_pair(mut self, pair: FxPair) -> Self {
        self.fx_pair = pair;
        self
    }

    pub fn provider_symbols(&self, positions: &[Position]) -> Vec<String> {
        positions
            .iter()
            .map(|p| provider_symbol(p, &self.local_market_suffix))
            .collect()
    }

    /// Quote every position and value the portfolio. The FX rate is only fetched
    /// when a foreign-currency position exists.
    pub async fn view(&self, positions: &[Position]) -> Result<PortfolioValuation> {
        let symbols = self.provider_symbols(positions);
        let quotes = self
            .orchestrator
            .fetch_quotes(&symbols)
            .await
            .context("Failed to fetch quotes")?;

        let quote_cache = self.orchestrator.quotes();
        let fx = if positions.iter().any(Position::is_foreign) {
            quote_cache.fx_rate(&self.fx_pair).await
        } else {
            let identity = FxPair::new(&self.fx_pair.quote, &self.fx_pair.quote);
            quote_cache.fx_rate(&identity).await
        };

        let valuation = value_portfolio(positions, &quotes, &fx);
        info!(
            positions = positions.len(),
            unpriced = valuation.unpriced.len(),
            total = %valuation.total_market_value,
            "portfolio valued"
        );
        Ok(valuation)
    }

    /// Snapshot of one holding from an existing valuation plus stored fundamentals.
    pub async fn asset_snapshot(
        &self,
        positions: &[Position],
        valuation: &PortfolioValuation,
        code: &str,
    ) -> Result<Option<AssetSnapshot>> {
        let Some(position) = positions.iter().find(|p| p.code.eq_ignore_ascii_case(code)) else {
            return Ok(None);
        };
        let Some(line) = valuation.line(&position.code) else {
            return Ok(None);
        };

        let symbol = provider_symbol(position, &self.local_market_suffix);
        let fundamentals = self
            .orchestrator
            .fundamentals()
            .store()
            .bundle(&symbol)
            .await
            .with_context(|| format!("Failed to read fundamentals for {symbol}"))?;
        debug!(symbol = %symbol, has_fundamentals = !fundamentals.is_empty(), "built asset snapshot");

        Ok(Some(AssetSnapshot::new(&symbol, line, fundamentals)))
    }
}
