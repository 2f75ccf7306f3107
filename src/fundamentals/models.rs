use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four independently refreshed fundamentals datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Info,
    Income,
    BalanceSheet,
    CashFlow,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 4] = [
        DatasetKind::Info,
        DatasetKind::Income,
        DatasetKind::BalanceSheet,
        DatasetKind::CashFlow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Info => "info",
            DatasetKind::Income => "income",
            DatasetKind::BalanceSheet => "balance_sheet",
            DatasetKind::CashFlow => "cash_flow",
        }
    }

    pub fn is_periodic(&self) -> bool {
        !matches!(self, DatasetKind::Info)
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reporting period of a financial statement as delivered by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementPeriod {
    pub period_end: NaiveDate,
    pub payload: Value,
}

/// What a provider returns for one dataset kind.
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetPayload {
    Info(Value),
    Periodic(Vec<StatementPeriod>),
}

impl DatasetPayload {
    /// Empty documents are treated like "no data" and never replace stored rows.
    pub fn is_empty(&self) -> bool {
        match self {
            DatasetPayload::Info(value) => match value {
                Value::Null => true,
                Value::Object(map) => map.is_empty(),
                _ => false,
            },
            DatasetPayload::Periodic(periods) => periods.is_empty(),
        }
    }
}

/// Stored `Info` snapshot: at most one per symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoSnapshot {
    pub symbol: String,
    pub payload: Value,
    pub fetched_at: DateTime<Utc>,
}

/// Stored statement row keyed by (symbol, kind, period_end).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicStatement {
    pub symbol: String,
    pub kind: DatasetKind,
    pub period_end: NaiveDate,
    pub payload: Value,
    pub fetched_at: DateTime<Utc>,
}

/// A staged full replacement of one (symbol, kind).
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetUpdate {
    pub kind: DatasetKind,
    pub payload: DatasetPayload,
    pub fetched_at: DateTime<Utc>,
}

/// Latest view of everything stored for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalsBundle {
    pub info: Option<Value>,
    pub income: Option<StatementPeriod>,
    pub balance_sheet: Option<StatementPeriod>,
    pub cash_flow: Option<StatementPeriod>,
}

impl FundamentalsBundle {
    pub fn is_empty(&self) -> bool {
        self.info.is_none()
            && self.income.is_none()
            && self.balance_sheet.is_none()
            && self.cash_flow.is_none()
    }

    /// `sector` and `country` from the info document, when present.
    pub fn sector_and_country(&self) -> (Option<String>, Option<String>) {
        let field = |name: &str| {
            self.info
                .as_ref()
                .and_then(|info| info.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        (field("sector"), field("country"))
    }
}
