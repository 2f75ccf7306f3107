//! Yahoo Finance adapter: chart endpoint for quotes, FX and history, quoteSummary
//! modules for fundamentals.
//!
//! No API key is needed. Local-exchange symbols carry their market suffix
//! (`PETR4.SA`) and FX pairs use the `BASEQUOTE=X` convention (`USDBRL=X`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::fundamentals::{DatasetKind, DatasetPayload, StatementPeriod};
use crate::market_data::{
    FxPair, MarketDataProvider, ProviderError, QuoteData, SeriesPoint, SymbolFundamentals,
};

const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
    previous_close: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<CloseSeries>,
    #[serde(default)]
    adjclose: Vec<AdjCloseSeries>,
}

#[derive(Debug, Deserialize)]
struct CloseSeries {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseSeries {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

fn to_decimal(value: f64) -> Option<Decimal> {
    Decimal::try_from(value)
        .ok()
        .map(|d| d.round_dp(8).normalize())
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Transient(format!("request timed out: {e}"))
    } else {
        ProviderError::Other(e.to_string())
    }
}

/// Market data from Yahoo Finance.
#[derive(Debug, Clone)]
pub struct YahooFinanceProvider {
    client: Client,
    base_url: String,
}

impl Default for YahooFinanceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooFinanceProvider {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            base_url: YAHOO_BASE_URL.to_string(),
        }
    }

    /// Client with a per-request timeout; used by the CLI.
    pub fn with_timeout(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("portfolio-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "yahoo request");
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::Transient(format!("rate limited on {path}")));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            return Err(ProviderError::Other(format!("HTTP {status} on {path}")));
        }

        let body = response.text().await.map_err(transport_error)?;
        serde_json::from_str(&body).map_err(|e| ProviderError::Malformed(e.to_string()))
    }

    async fn chart(
        &self,
        symbol: &str,
        range: &str,
        interval: &str,
    ) -> Result<ChartResult, ProviderError> {
        let path = format!("/v8/finance/chart/{symbol}");
        let envelope: ChartEnvelope = self
            .get_json(&path, &[("range", range), ("interval", interval)])
            .await?;

        if let Some(error) = envelope.chart.error {
            let detail = error.description.unwrap_or_else(|| error.code.clone());
            return Err(if error.code.eq_ignore_ascii_case("not found") {
                ProviderError::NotFound(detail)
            } else {
                ProviderError::Other(detail)
            });
        }

        envelope
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| ProviderError::NotFound(format!("no chart data for {symbol}")))
    }

    fn quote_from_meta(meta: &ChartMeta) -> Option<QuoteData> {
        let price = to_decimal(meta.regular_market_price?)?;
        let previous = meta
            .chart_previous_close
            .or(meta.previous_close)
            .and_then(to_decimal)
            .filter(|p| !p.is_zero());
        let change_percent = previous
            .and_then(|prev| {
                price
                    .checked_sub(prev)?
                    .checked_div(prev)?
                    .checked_mul(Decimal::ONE_HUNDRED)
            })
            .map(|change| change.round_dp(4))
            .unwrap_or(Decimal::ZERO);
        Some(QuoteData {
            price,
            change_percent,
        })
    }

    async fn quote_summary(&self, symbol: &str, modules: &str) -> Result<Value, ProviderError> {
        let path = format!("/v10/finance/quoteSummary/{symbol}");
        let envelope: Value = self.get_json(&path, &[("modules", modules)]).await?;
        let summary = envelope
            .get("quoteSummary")
            .ok_or_else(|| ProviderError::Malformed("missing quoteSummary".to_string()))?;

        if let Some(error) = summary.get("error").filter(|e| !e.is_null()) {
            let code = error.get("code").and_then(Value::as_str).unwrap_or_default();
            let detail = error
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or(code)
                .to_string();
            return Err(if code.eq_ignore_ascii_case("not found") {
                ProviderError::NotFound(detail)
            } else {
                ProviderError::Other(detail)
            });
        }

        Ok(summary
            .get("result")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
            .cloned()
            .unwrap_or(Value::Null))
    }
}

/// Yahoo wraps numbers as `{"raw": 1.0, "fmt": "1.00"}`; keep the raw value.
fn flatten_fields(object: &Map<String, Value>, skip: &[&str]) -> Map<String, Value> {
    object
        .iter()
        .filter(|(key, _)| !skip.contains(&key.as_str()))
        .map(|(key, value)| {
            let value = match value.get("raw") {
                Some(raw) => raw.clone(),
                None if value.as_object().is_some_and(|o| o.is_empty()) => Value::Null,
                None => value.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}

fn info_document(result: &Value) -> Value {
    let mut merged = Map::new();
    for module in ["assetProfile", "summaryDetail", "price"] {
        if let Some(object) = result.get(module).and_then(Value::as_object) {
            merged.extend(flatten_fields(object, &["maxAge", "companyOfficers"]));
        }
    }
    Value::Object(merged)
}

fn statement_module(kind: DatasetKind) -> Option<(&'static str, &'static str)> {
    match kind {
        DatasetKind::Info => None,
        DatasetKind::Income => Some(("incomeStatementHistory", "incomeStatementHistory")),
        DatasetKind::BalanceSheet => Some(("balanceSheetHistory", "balanceSheetStatements")),
        DatasetKind::CashFlow => Some(("cashflowStatementHistory", "cashflowStatements")),
    }
}

fn statement_periods(result: &Value, module: &str, list: &str) -> Vec<StatementPeriod> {
    let statements = result
        .get(module)
        .and_then(|m| m.get(list))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    statements
        .iter()
        .filter_map(|statement| {
            let object = statement.as_object()?;
            let end = object.get("endDate")?.get("raw")?.as_i64()?;
            let period_end = DateTime::from_timestamp(end, 0)?.date_naive();
            Some(StatementPeriod {
                period_end,
                payload: Value::Object(flatten_fields(object, &["maxAge", "endDate"])),
            })
        })
        .collect()
}

#[async_trait]
impl MarketDataProvider for YahooFinanceProvider {
    async fn get_quote(&self, symbol: &str) -> Result<Option<QuoteData>, ProviderError> {
        match self.chart(symbol, "1d", "1d").await {
            Ok(result) => Ok(Self::quote_from_meta(&result.meta)),
            Err(ProviderError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_fx(&self, pair: &FxPair) -> Result<Decimal, ProviderError> {
        let symbol = format!("{}{}=X", pair.base, pair.quote);
        let result = self.chart(&symbol, "1d", "1d").await?;
        Self::quote_from_meta(&result.meta)
            .map(|q| q.price)
            .ok_or_else(|| ProviderError::Malformed(format!("no price for {symbol}")))
    }

    async fn get_series(
        &self,
        symbol: &str,
        period: &str,
        interval: &str,
    ) -> Result<Vec<SeriesPoint>, ProviderError> {
        let result = self.chart(symbol, period, interval).await?;
        let closes = result
            .indicators
            .quote
            .first()
            .map(|q| q.close.as_slice())
            .unwrap_or_default();
        let adjusted = result
            .indicators
            .adjclose
            .first()
            .map(|a| a.adjclose.as_slice())
            .unwrap_or_default();

        Ok(result
            .timestamp
            .iter()
            .enumerate()
            .filter_map(|(i, ts)| {
                let close = to_decimal(closes.get(i).copied().flatten()?)?;
                let adjusted_close = adjusted
                    .get(i)
                    .copied()
                    .flatten()
                    .and_then(to_decimal)
                    .unwrap_or(close);
                Some(SeriesPoint {
                    timestamp: DateTime::from_timestamp(*ts, 0)?,
                    close,
                    adjusted_close,
                })
            })
            .collect())
    }

    fn fundamentals(&self, symbol: &str) -> Result<Box<dyn SymbolFundamentals>, ProviderError> {
        let symbol = symbol.trim();
        if symbol.is_empty() || symbol.contains(|c: char| c.is_whitespace() || c == '/') {
            return Err(ProviderError::InvalidSymbol(symbol.to_string()));
        }
        Ok(Box::new(YahooFundamentals {
            provider: self.clone(),
            symbol: symbol.to_string(),
        }))
    }

    fn name(&self) -> &str {
        "yahoo"
    }
}

struct YahooFundamentals {
    provider: YahooFinanceProvider,
    symbol: String,
}

#[async_trait]
impl SymbolFundamentals for YahooFundamentals {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    async fn fetch(&self, kind: DatasetKind) -> Result<Option<DatasetPayload>, ProviderError> {
        let payload = match statement_module(kind) {
            None => {
                let result = self
                    .provider
                    .quote_summary(&self.symbol, "assetProfile,summaryDetail,price")
                    .await?;
                DatasetPayload::Info(info_document(&result))
            }
            Some((module, list)) => {
                let result = self.provider.quote_summary(&self.symbol, module).await?;
                DatasetPayload::Periodic(statement_periods(&result, module, list))
            }
        };
        Ok((!payload.is_empty()).then_some(payload))
    }
}
