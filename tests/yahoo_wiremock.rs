#![cfg(feature = "providers")]

use anyhow::Result;
use chrono::NaiveDate;
use portfolio_sync::fundamentals::{DatasetKind, DatasetPayload};
use portfolio_sync::market_data::providers::YahooFinanceProvider;
use portfolio_sync::market_data::{FxPair, MarketDataProvider, ProviderError};
use rust_decimal::Decimal;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chart_body(price: f64, previous: f64) -> serde_json::Value {
    json!({
        "chart": {
            "result": [{
                "meta": {
                    "symbol": "PETR4.SA",
                    "regularMarketPrice": price,
                    "chartPreviousClose": previous
                },
                "timestamp": [1735776000, 1735862400, 1735948800],
                "indicators": {
                    "quote": [{"close": [36.5, null, 37.25]}],
                    "adjclose": [{"adjclose": [35.0, null, 36.0]}]
                }
            }],
            "error": null
        }
    })
}

#[tokio::test]
async fn quote_reads_price_and_daily_change() -> Result<()> {
    let server = MockServer::start().await;
    let provider = YahooFinanceProvider::new().with_base_url(server.uri());

    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/PETR4.SA"))
        .and(query_param("range", "1d"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chart_body(38.5, 35.0)))
        .mount(&server)
        .await;

    let quote = provider.get_quote("PETR4.SA").await?.expect("quote");
    assert_eq!(quote.price, "38.5".parse::<Decimal>()?);
    assert_eq!(quote.change_percent, Decimal::from(10));
    Ok(())
}

#[tokio::test]
async fn unknown_symbol_is_none() -> Result<()> {
    let server = MockServer::start().await;
    let provider = YahooFinanceProvider::new().with_base_url(server.uri());

    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/NOPE3.SA"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(provider.get_quote("NOPE3.SA").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn rate_limit_is_transient() {
    let server = MockServer::start().await;
    let provider = YahooFinanceProvider::new().with_base_url(server.uri());

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = provider.get_series("VALE3.SA", "1mo", "1d").await.unwrap_err();
    assert!(matches!(err, ProviderError::Transient(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn garbage_body_is_malformed() {
    let server = MockServer::start().await;
    let provider = YahooFinanceProvider::new().with_base_url(server.uri());

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = provider.get_quote("PETR4.SA").await.unwrap_err();
    assert!(matches!(err, ProviderError::Malformed(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn series_skips_missing_closes() -> Result<()> {
    let server = MockServer::start().await;
    let provider = YahooFinanceProvider::new().with_base_url(server.uri());

    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/PETR4.SA"))
        .and(query_param("range", "1mo"))
        .and(query_param("interval", "1d"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chart_body(37.25, 36.5)))
        .mount(&server)
        .await;

    let points = provider.get_series("PETR4.SA", "1mo", "1d").await?;
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].close, "36.5".parse::<Decimal>()?);
    assert_eq!(points[0].adjusted_close, Decimal::from(35));
    assert_eq!(points[1].close, "37.25".parse::<Decimal>()?);
    Ok(())
}

#[tokio::test]
async fn fx_uses_pair_symbol() -> Result<()> {
    let server = MockServer::start().await;
    let provider = YahooFinanceProvider::new().with_base_url(server.uri());

    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/USDBRL=X"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chart_body(5.1234, 5.1)))
        .mount(&server)
        .await;

    let rate = provider.get_fx(&FxPair::new("USD", "BRL")).await?;
    assert_eq!(rate, "5.1234".parse::<Decimal>()?);
    Ok(())
}

#[tokio::test]
async fn fundamentals_info_and_income() -> Result<()> {
    let server = MockServer::start().await;
    let provider = YahooFinanceProvider::new().with_base_url(server.uri());

    Mock::given(method("GET"))
        .and(path("/v10/finance/quoteSummary/PETR4.SA"))
        .and(query_param("modules", "assetProfile,summaryDetail,price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "quoteSummary": {
                "result": [{
                    "assetProfile": {"sector": "Energy", "country": "Brazil", "maxAge": 86400},
                    "summaryDetail": {"trailingPE": {"raw": 4.2, "fmt": "4.20"}, "forwardPE": {}},
                    "price": {"currency": "BRL"}
                }],
                "error": null
            }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v10/finance/quoteSummary/PETR4.SA"))
        .and(query_param("modules", "incomeStatementHistory"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "quoteSummary": {
                "result": [{
                    "incomeStatementHistory": {
                        "incomeStatementHistory": [
                            {"endDate": {"raw": 1735603200}, "netIncome": {"raw": 36600}},
                            {"endDate": {"raw": 1703980800}, "netIncome": {"raw": 124600}}
                        ]
                    }
                }],
                "error": null
            }
        })))
        .mount(&server)
        .await;

    let handle = provider.fundamentals("PETR4.SA")?;

    let Some(DatasetPayload::Info(info)) = handle.fetch(DatasetKind::Info).await? else {
        panic!("expected info payload");
    };
    assert_eq!(info["sector"], "Energy");
    assert_eq!(info["trailingPE"], 4.2);
    assert!(info["forwardPE"].is_null());
    assert!(info.get("maxAge").is_none());

    let Some(DatasetPayload::Periodic(periods)) = handle.fetch(DatasetKind::Income).await? else {
        panic!("expected income statements");
    };
    assert_eq!(periods.len(), 2);
    assert_eq!(
        periods[0].period_end,
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
    );
    assert_eq!(periods[1].payload, json!({"netIncome": 124600}));
    Ok(())
}

#[tokio::test]
async fn missing_statements_are_empty() -> Result<()> {
    let server = MockServer::start().await;
    let provider = YahooFinanceProvider::new().with_base_url(server.uri());

    Mock::given(method("GET"))
        .and(path("/v10/finance/quoteSummary/ABEV3.SA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "quoteSummary": {"result": [{}], "error": null}
        })))
        .mount(&server)
        .await;

    let handle = provider.fundamentals("ABEV3.SA")?;
    assert!(handle.fetch(DatasetKind::CashFlow).await?.is_none());
    Ok(())
}
