use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Broad instrument family of a position. Drives provider symbol derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Stock,
    Reit,
    Unit,
    Bdr,
    Etf,
    Crypto,
    FixedIncome,
    Other,
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Stock => "stock",
            AssetClass::Reit => "reit",
            AssetClass::Unit => "unit",
            AssetClass::Bdr => "bdr",
            AssetClass::Etf => "etf",
            AssetClass::Crypto => "crypto",
            AssetClass::FixedIncome => "fixed_income",
            AssetClass::Other => "other",
        }
    }

    /// Classes listed on the local exchange under a market suffix (e.g. `PETR4.SA`).
    pub fn trades_with_market_suffix(&self) -> bool {
        matches!(
            self,
            AssetClass::Stock | AssetClass::Reit | AssetClass::Unit | AssetClass::Bdr
        )
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stock" => Ok(AssetClass::Stock),
            "reit" => Ok(AssetClass::Reit),
            "unit" => Ok(AssetClass::Unit),
            "bdr" => Ok(AssetClass::Bdr),
            "etf" => Ok(AssetClass::Etf),
            "crypto" => Ok(AssetClass::Crypto),
            "fixed_income" => Ok(AssetClass::FixedIncome),
            "other" => Ok(AssetClass::Other),
            other => anyhow::bail!("Unknown asset class: {other}"),
        }
    }
}

/// Whether a position is denominated in the reporting currency or the foreign one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionCurrency {
    Local,
    Foreign,
}

impl PositionCurrency {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionCurrency::Local => "local",
            PositionCurrency::Foreign => "foreign",
        }
    }
}

impl fmt::Display for PositionCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionCurrency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(PositionCurrency::Local),
            "foreign" => Ok(PositionCurrency::Foreign),
            other => anyhow::bail!("Unknown position currency: {other}"),
        }
    }
}

/// A holding in the portfolio. Owned by the CRUD layer; read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub code: String,
    pub display_name: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub avg_cost: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    pub asset_class: AssetClass,
    pub currency: PositionCurrency,
}

impl Position {
    pub fn new(
        code: impl Into<String>,
        avg_cost: Decimal,
        quantity: Decimal,
        asset_class: AssetClass,
        currency: PositionCurrency,
    ) -> Self {
        let code = code.into();
        Self {
            display_name: code.clone(),
            code,
            avg_cost,
            quantity,
            asset_class,
            currency,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Total amount paid, in the position's own currency. Saturates at the
    /// `Decimal` bounds.
    pub fn cost_basis(&self) -> Decimal {
        self.avg_cost.saturating_mul(self.quantity)
    }

    pub fn is_foreign(&self) -> bool {
        self.currency == PositionCurrency::Foreign
    }
}
