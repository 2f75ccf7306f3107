//! Pure portfolio valuation: positions + quotes + one FX rate in, figures out.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market_data::{FxRate, Quote};
use crate::models::{AssetClass, Position, PositionCurrency};

/// Figures for one position. Amounts without a `_native` suffix are in the
/// reporting currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionValuation {
    pub code: String,
    pub display_name: String,
    pub asset_class: AssetClass,
    pub currency: PositionCurrency,
    pub quantity: Decimal,
    pub avg_cost: Decimal,
    pub current_price: Decimal,
    pub cost_basis_native: Decimal,
    pub market_value_native: Decimal,
    pub cost_basis: Decimal,
    pub market_value: Decimal,
    pub pnl: Decimal,
    /// `None` when the cost basis is zero or the ratio overflows.
    pub pnl_percent: Option<Decimal>,
    pub daily_change_percent: Decimal,
    pub percent_of_portfolio: Decimal,
    pub priced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioValuation {
    pub lines: Vec<PositionValuation>,
    pub total_market_value: Decimal,
    pub total_cost_basis: Decimal,
    pub total_pnl: Decimal,
    pub total_pnl_percent: Option<Decimal>,
    /// Codes of positions with no price.
    pub unpriced: Vec<String>,
    pub fx: FxRate,
}

impl PortfolioValuation {
    pub fn line(&self, code: &str) -> Option<&PositionValuation> {
        self.lines.iter().find(|l| l.code == code)
    }
}

/// `None` when `whole` is zero or the ratio does not fit in a `Decimal`.
fn percent_of(part: Decimal, whole: Decimal) -> Option<Decimal> {
    part.checked_div(whole)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
}

fn saturating_sum(values: impl Iterator<Item = Decimal>) -> Decimal {
    values.fold(Decimal::ZERO, |acc, v| acc.saturating_add(v))
}

/// Value every position against the quote at the same index.
///
/// A missing or not-found quote values the position at zero and marks it unpriced.
/// Foreign-currency amounts are converted with `fx.rate`.
pub fn value_portfolio(positions: &[Position], quotes: &[Quote], fx: &FxRate) -> PortfolioValuation {
    let mut lines: Vec<PositionValuation> = positions
        .iter()
        .enumerate()
        .map(|(i, position)| {
            let quote = quotes.get(i).filter(|q| q.found);
            let current_price = quote.map(|q| q.price).unwrap_or(Decimal::ZERO);
            let daily_change_percent = quote
                .map(|q| q.daily_change_percent)
                .unwrap_or(Decimal::ZERO);

            let rate = match position.currency {
                PositionCurrency::Local => Decimal::ONE,
                PositionCurrency::Foreign => fx.rate,
            };
            // Amounts saturate at the Decimal bounds instead of overflowing.
            let cost_basis_native = position.cost_basis();
            let market_value_native = current_price.saturating_mul(position.quantity);
            let cost_basis = cost_basis_native.saturating_mul(rate);
            let market_value = market_value_native.saturating_mul(rate);
            let pnl = market_value.saturating_sub(cost_basis);

            PositionValuation {
                code: position.code.clone(),
                display_name: position.display_name.clone(),
                asset_class: position.asset_class,
                currency: position.currency,
                quantity: position.quantity,
                avg_cost: position.avg_cost,
                current_price,
                cost_basis_native,
                market_value_native,
                cost_basis,
                market_value,
                pnl,
                pnl_percent: percent_of(pnl, cost_basis),
                daily_change_percent,
                percent_of_portfolio: Decimal::ZERO,
                priced: quote.is_some(),
            }
        })
        .collect();

    let total_market_value = saturating_sum(lines.iter().map(|l| l.market_value));
    let total_cost_basis = saturating_sum(lines.iter().map(|l| l.cost_basis));
    for line in &mut lines {
        line.percent_of_portfolio =
            percent_of(line.market_value, total_market_value).unwrap_or(Decimal::ZERO);
    }

    let total_pnl = total_market_value.saturating_sub(total_cost_basis);
    PortfolioValuation {
        unpriced: lines
            .iter()
            .filter(|l| !l.priced)
            .map(|l| l.code.clone())
            .collect(),
        lines,
        total_market_value,
        total_cost_basis,
        total_pnl,
        total_pnl_percent: percent_of(total_pnl, total_cost_basis),
        fx: fx.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::{FxPair, FxSource, QuoteData};
    use chrono::{TimeZone, Utc};
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn fx(rate: &str) -> FxRate {
        FxRate {
            pair: FxPair::new("USD", "BRL"),
            rate: d(rate),
            fetched_at: Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
            source: FxSource::Fetched,
        }
    }

    fn quote(symbol: &str, price: &str) -> Quote {
        Quote::found(
            symbol,
            QuoteData {
                price: d(price),
                change_percent: d("1.5"),
            },
            Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn foreign_amounts_are_converted() {
        let positions = vec![Position::new(
            "AAPL",
            d("150"),
            d("2"),
            AssetClass::Stock,
            PositionCurrency::Foreign,
        )];
        let valuation = value_portfolio(&positions, &[quote("AAPL", "200")], &fx("5"));
        let line = &valuation.lines[0];

        assert_eq!(line.market_value_native, d("400"));
        assert_eq!(line.market_value, d("2000"));
        assert_eq!(line.cost_basis, d("1500"));
        assert_eq!(line.pnl, d("500"));
        assert_eq!(line.pnl_percent.map(|p| p.round_dp(4)), Some(d("33.3333")));
        assert_eq!(line.percent_of_portfolio, d("100"));
    }

    #[test]
    fn zero_cost_basis_leaves_pnl_percent_undefined() {
        let positions = vec![Position::new(
            "BONUS3",
            Decimal::ZERO,
            d("10"),
            AssetClass::Stock,
            PositionCurrency::Local,
        )];
        let valuation = value_portfolio(&positions, &[quote("BONUS3.SA", "5")], &fx("5"));
        assert_eq!(valuation.lines[0].pnl_percent, None);
        assert_eq!(valuation.total_pnl_percent, None);
    }

    #[test]
    fn all_unpriced_yields_zero_shares() {
        let positions = vec![
            Position::new("XPTO3", d("10"), d("1"), AssetClass::Stock, PositionCurrency::Local),
            Position::new("ABCD4", d("10"), d("1"), AssetClass::Stock, PositionCurrency::Local),
        ];
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let quotes = vec![Quote::not_found("XPTO3.SA", at)];
        let valuation = value_portfolio(&positions, &quotes, &fx("5"));

        assert!(valuation
            .lines
            .iter()
            .all(|l| l.percent_of_portfolio.is_zero()));
        assert_eq!(valuation.unpriced, vec!["XPTO3", "ABCD4"]);
        assert_eq!(valuation.total_market_value, Decimal::ZERO);
    }

    #[test]
    fn shares_sum_to_one_hundred() {
        let positions = vec![
            Position::new("PETR4", d("30"), d("7"), AssetClass::Stock, PositionCurrency::Local),
            Position::new("VALE3", d("60"), d("3"), AssetClass::Stock, PositionCurrency::Local),
            Position::new("AAPL", d("100"), d("1"), AssetClass::Stock, PositionCurrency::Foreign),
        ];
        let quotes = vec![
            quote("PETR4.SA", "33.33"),
            quote("VALE3.SA", "61.7"),
            quote("AAPL", "190.1"),
        ];
        let valuation = value_portfolio(&positions, &quotes, &fx("5.37"));

        let total: Decimal = valuation.lines.iter().map(|l| l.percent_of_portfolio).sum();
        assert_eq!(total.round_dp(10), Decimal::ONE_HUNDRED);
        assert!(valuation.unpriced.is_empty());
    }

    #[test]
    fn tiny_cost_basis_leaves_pnl_percent_undefined() {
        let positions = vec![Position::new(
            "DUST3",
            d("0.0000000000000000000001"),
            Decimal::ONE,
            AssetClass::Stock,
            PositionCurrency::Local,
        )];
        let valuation = value_portfolio(&positions, &[quote("DUST3.SA", "100000000")], &fx("5"));
        let line = &valuation.lines[0];

        assert_eq!(line.market_value, d("100000000"));
        assert_eq!(line.pnl_percent, None);
        assert_eq!(valuation.total_pnl_percent, None);
        assert_eq!(line.percent_of_portfolio, d("100"));
    }

    #[test]
    fn huge_amounts_saturate() {
        let positions = vec![
            Position::new("BIG3", Decimal::MAX, d("2"), AssetClass::Stock, PositionCurrency::Foreign),
            Position::new("BIG4", d("1"), d("1"), AssetClass::Stock, PositionCurrency::Local),
        ];
        let quotes = vec![quote("BIG3", "79228162514264337593543950335"), quote("BIG4.SA", "1")];
        let valuation = value_portfolio(&positions, &quotes, &fx("5"));

        assert_eq!(valuation.lines[0].cost_basis_native, Decimal::MAX);
        assert_eq!(valuation.lines[0].market_value, Decimal::MAX);
        assert_eq!(valuation.total_market_value, Decimal::MAX);
        assert_eq!(valuation.total_cost_basis, Decimal::MAX);
        assert!(valuation.total_pnl.is_zero());
    }
}
