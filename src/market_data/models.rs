use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Price and daily change returned by a provider for one symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteData {
    pub price: Decimal,
    pub change_percent: Decimal,
}

/// Live quote as served by the quote cache.
///
/// A quote is never partially updated: every fetch replaces the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: Decimal,
    pub daily_change_percent: Decimal,
    pub found: bool,
    pub fetched_at: DateTime<Utc>,
}

impl Quote {
    pub fn found(symbol: impl Into<String>, data: QuoteData, fetched_at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            price: data.price,
            daily_change_percent: data.change_percent,
            found: true,
            fetched_at,
        }
    }

    /// The typed "no price" result. Callers show it as "not priced".
    pub fn not_found(symbol: impl Into<String>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            price: Decimal::ZERO,
            daily_change_percent: Decimal::ZERO,
            found: false,
            fetched_at,
        }
    }
}

/// Currency pair, `base/quote`: one unit of `base` costs `rate` units of `quote`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FxPair {
    pub base: String,
    pub quote: String,
}

impl FxPair {
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.trim().to_uppercase(),
            quote: quote.trim().to_uppercase(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.base == self.quote
    }
}

impl fmt::Display for FxPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for FxPair {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .split_once('/')
            .ok_or_else(|| anyhow::anyhow!("FX pair must look like BASE/QUOTE, got {s:?}"))?;
        if base.trim().is_empty() || quote.trim().is_empty() {
            anyhow::bail!("FX pair must look like BASE/QUOTE, got {s:?}");
        }
        Ok(Self::new(base, quote))
    }
}

/// Where an FX rate came from. Valuation treats both the same; display does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FxSource {
    Fetched,
    Fallback,
    Identity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FxRate {
    pub pair: FxPair,
    pub rate: Decimal,
    pub fetched_at: DateTime<Utc>,
    pub source: FxSource,
}

impl FxRate {
    pub fn is_fallback(&self) -> bool {
        self.source == FxSource::Fallback
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub close: Decimal,
    pub adjusted_close: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub symbol: String,
    pub period: String,
    pub interval: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalSeries {
    pub symbol: String,
    pub period: String,
    pub interval: String,
    pub points: Vec<SeriesPoint>,
}

impl HistoricalSeries {
    pub fn empty(symbol: &str, period: &str, interval: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            period: period.to_string(),
            interval: interval.to_string(),
            points: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn key(&self) -> SeriesKey {
        SeriesKey {
            symbol: self.symbol.clone(),
            period: self.period.clone(),
            interval: self.interval.clone(),
        }
    }

    /// Adjusted closes divided by the first adjusted close, so every series starts at 1.
    ///
    /// Returns an empty vector when the series is empty or starts at zero.
    pub fn normalized(&self) -> Vec<(DateTime<Utc>, Decimal)> {
        let Some(first) = self.points.first() else {
            return Vec::new();
        };
        if first.adjusted_close.is_zero() {
            return Vec::new();
        }
        self.points
            .iter()
            .map(|p| (p.timestamp, p.adjusted_close / first.adjusted_close))
            .collect()
    }
}

/// Named chart ranges and the (period, interval) pair each one is fetched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesRange {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "5d")]
    OneWeek,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
    #[serde(rename = "5y")]
    FiveYears,
    #[serde(rename = "10y")]
    TenYears,
    #[serde(rename = "20y")]
    TwentyYears,
    Max,
}

impl SeriesRange {
    pub fn period(&self) -> &'static str {
        self.params().0
    }

    pub fn interval(&self) -> &'static str {
        self.params().1
    }

    fn params(&self) -> (&'static str, &'static str) {
        match self {
            SeriesRange::OneDay => ("1d", "5m"),
            SeriesRange::OneWeek => ("5d", "30m"),
            SeriesRange::OneMonth => ("1mo", "1d"),
            SeriesRange::OneYear => ("1y", "1d"),
            SeriesRange::TwoYears => ("2y", "1wk"),
            SeriesRange::FiveYears => ("5y", "1wk"),
            SeriesRange::TenYears => ("10y", "1mo"),
            SeriesRange::TwentyYears => ("20y", "1mo"),
            SeriesRange::Max => ("max", "1mo"),
        }
    }
}

impl FromStr for SeriesRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1d" => Ok(SeriesRange::OneDay),
            "5d" | "1w" => Ok(SeriesRange::OneWeek),
            "1mo" => Ok(SeriesRange::OneMonth),
            "1y" => Ok(SeriesRange::OneYear),
            "2y" => Ok(SeriesRange::TwoYears),
            "5y" => Ok(SeriesRange::FiveYears),
            "10y" => Ok(SeriesRange::TenYears),
            "20y" => Ok(SeriesRange::TwentyYears),
            "max" => Ok(SeriesRange::Max),
            other => anyhow::bail!("Unknown series range: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fx_pair_parses_and_normalizes() {
        let pair: FxPair = " usd/brl ".parse().unwrap();
        assert_eq!(pair, FxPair::new("USD", "BRL"));
        assert_eq!(pair.to_string(), "USD/BRL");
        assert!("USDBRL".parse::<FxPair>().is_err());
    }

    #[test]
    fn series_range_maps_to_period_and_interval() {
        let range: SeriesRange = "2y".parse().unwrap();
        assert_eq!(range.period(), "2y");
        assert_eq!(range.interval(), "1wk");
        assert_eq!(SeriesRange::OneDay.interval(), "5m");
    }

    #[test]
    fn normalized_series_starts_at_one() {
        let ts = |d| Utc.with_ymd_and_hms(2026, 1, d, 0, 0, 0).unwrap();
        let point = |d, v: i64| SeriesPoint {
            timestamp: ts(d),
            close: Decimal::from(v),
            adjusted_close: Decimal::from(v),
        };
        let series = HistoricalSeries {
            symbol: "VALE3.SA".to_string(),
            period: "1mo".to_string(),
            interval: "1d".to_string(),
            points: vec![point(2, 50), point(3, 55), point(4, 40)],
        };

        let normalized = series.normalized();
        assert_eq!(normalized[0].1, Decimal::ONE);
        assert_eq!(normalized[1].1, Decimal::new(11, 1));
        assert_eq!(normalized[2].1, Decimal::new(8, 1));
    }
}
