//! Symbol spelling rules shared by every cache key.

use crate::models::{Position, PositionCurrency};

/// Canonical spelling of a ticker: trimmed, upper-cased, with duplicated market
/// suffixes collapsed (`petr4.sa.sa` -> `PETR4.SA`).
///
/// ```
/// use portfolio_sync::market_data::normalize_symbol;
///
/// assert_eq!(normalize_symbol(" petr4.sa.SA "), "PETR4.SA");
/// assert_eq!(normalize_symbol("AAPL"), "AAPL");
/// ```
pub fn normalize_symbol(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    let mut parts: Vec<&str> = upper.split('.').collect();
    while parts.len() >= 3 && parts[parts.len() - 1] == parts[parts.len() - 2] {
        parts.pop();
    }
    parts.join(".")
}

/// Symbol the market-data provider knows a position by.
///
/// Local-currency exchange listings get the local market suffix appended when it is
/// missing; foreign-currency stocks have it stripped.
pub fn provider_symbol(position: &Position, local_market_suffix: &str) -> String {
    let code = normalize_symbol(&position.code);
    let suffix = local_market_suffix.trim().to_uppercase();
    if suffix.is_empty() {
        return code;
    }

    match position.currency {
        PositionCurrency::Local
            if position.asset_class.trades_with_market_suffix() && !code.ends_with(&suffix) =>
        {
            format!("{code}{suffix}")
        }
        PositionCurrency::Foreign if code.ends_with(&suffix) => {
            code[..code.len() - suffix.len()].to_string()
        }
        _ => code,
    }
}
