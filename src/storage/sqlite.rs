//! SQLite persistence for positions, fundamentals and cached reports.
//!
//! A single connection sits behind a mutex; every call runs on the blocking pool.
//! Timestamps are stored as unix milliseconds, dates as `YYYY-MM-DD` text.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::debug;

use super::{PositionSource, StoreError};
use crate::fundamentals::{
    rows_for, DatasetKind, DatasetUpdate, FundamentalsStore, InfoSnapshot, PeriodicStatement,
};
use crate::models::{AssetClass, Position, PositionCurrency};
use crate::report_cache::{ReportCacheStore, ReportKey, ReportScope};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS positions (
    code TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    avg_cost TEXT NOT NULL,
    quantity TEXT NOT NULL,
    asset_class TEXT NOT NULL,
    currency TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS asset_info (
    symbol TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    fetched_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS asset_income_statement (
    symbol TEXT NOT NULL,
    period_end TEXT NOT NULL,
    payload TEXT NOT NULL,
    fetched_at INTEGER NOT NULL,
    PRIMARY KEY (symbol, period_end)
);
CREATE TABLE IF NOT EXISTS asset_balance_sheet (
    symbol TEXT NOT NULL,
    period_end TEXT NOT NULL,
    payload TEXT NOT NULL,
    fetched_at INTEGER NOT NULL,
    PRIMARY KEY (symbol, period_end)
);
CREATE TABLE IF NOT EXISTS asset_cash_flow (
    symbol TEXT NOT NULL,
    period_end TEXT NOT NULL,
    payload TEXT NOT NULL,
    fetched_at INTEGER NOT NULL,
    PRIMARY KEY (symbol, period_end)
);
CREATE TABLE IF NOT EXISTS report_cache_portfolio (
    generation_date TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    payload TEXT NOT NULL,
    PRIMARY KEY (generation_date, content_hash)
);
CREATE TABLE IF NOT EXISTS report_cache_asset (
    symbol TEXT NOT NULL,
    generation_date TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    payload TEXT NOT NULL,
    UNIQUE (symbol, generation_date, content_hash)
);
";

const DATE_FORMAT: &str = "%Y-%m-%d";

fn statement_table(kind: DatasetKind) -> Option<&'static str> {
    match kind {
        DatasetKind::Info => None,
        DatasetKind::Income => Some("asset_income_statement"),
        DatasetKind::BalanceSheet => Some("asset_balance_sheet"),
        DatasetKind::CashFlow => Some("asset_cash_flow"),
    }
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {ms}")))
}

fn parse_date(raw: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| StoreError::Corrupt(format!("invalid date {raw:?}: {e}")))
}

fn parse_json(raw: &str) -> Result<Value, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(format!("invalid JSON: {e}")))
}

fn to_json(value: &Value) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupt(e.to_string()))
}

#[derive(Clone)]
pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDatabase {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened sqlite database");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn call<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await?
    }

    /// Replace the whole positions table.
    pub async fn save_positions(&self, positions: &[Position]) -> Result<(), StoreError> {
        let positions = positions.to_vec();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM positions", [])?;
            for p in &positions {
                tx.execute(
                    "INSERT INTO positions (code, display_name, avg_cost, quantity, asset_class, currency)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        p.code,
                        p.display_name,
                        p.avg_cost.to_string(),
                        p.quantity.to_string(),
                        p.asset_class.as_str(),
                        p.currency.as_str()
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn report_rows(&self, scope: ReportScope) -> Result<usize, StoreError> {
        self.call(move |conn| {
            let sql = match scope {
                ReportScope::Portfolio => "SELECT COUNT(*) FROM report_cache_portfolio",
                ReportScope::Asset => "SELECT COUNT(*) FROM report_cache_asset",
            };
            let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
        .await
    }
}

#[async_trait]
impl PositionSource for SqliteDatabase {
    async fn list_positions(&self) -> Result<Vec<Position>, StoreError> {
        self.call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT code, display_name, avg_cost, quantity, asset_class, currency
                 FROM positions ORDER BY code",
            )?;
            let raw = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            raw.into_iter()
                .map(|(code, name, avg_cost, quantity, class, currency)| {
                    let corrupt = |e: &dyn std::fmt::Display| {
                        StoreError::Corrupt(format!("position {code}: {e}"))
                    };
                    Ok(Position {
                        avg_cost: avg_cost.parse().map_err(|e| corrupt(&e))?,
                        quantity: quantity.parse().map_err(|e| corrupt(&e))?,
                        asset_class: AssetClass::from_str(&class).map_err(|e| corrupt(&e))?,
                        currency: PositionCurrency::from_str(&currency)
                            .map_err(|e| corrupt(&e))?,
                        display_name: name,
                        code,
                    })
                })
                .collect()
        })
        .await
    }
}

#[async_trait]
impl FundamentalsStore for SqliteDatabase {
    async fn last_fetched(
        &self,
        symbol: &str,
        kind: DatasetKind,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let symbol = symbol.to_string();
        self.call(move |conn| {
            let ms: Option<i64> = match statement_table(kind) {
                None => conn
                    .query_row(
                        "SELECT fetched_at FROM asset_info WHERE symbol = ?1",
                        params![symbol],
                        |row| row.get(0),
                    )
                    .optional()?,
                Some(table) => conn.query_row(
                    &format!("SELECT MAX(fetched_at) FROM {table} WHERE symbol = ?1"),
                    params![symbol],
                    |row| row.get(0),
                )?,
            };
            ms.map(from_millis).transpose()
        })
        .await
    }

    async fn apply(&self, symbol: &str, updates: &[DatasetUpdate]) -> Result<(), StoreError> {
        let symbol = symbol.to_string();
        let updates = updates.to_vec();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            for update in &updates {
                let (info, rows) = rows_for(&symbol, update);
                if let Some(snapshot) = info {
                    tx.execute("DELETE FROM asset_info WHERE symbol = ?1", params![symbol])?;
                    tx.execute(
                        "INSERT INTO asset_info (symbol, payload, fetched_at) VALUES (?1, ?2, ?3)",
                        params![
                            symbol,
                            to_json(&snapshot.payload)?,
                            to_millis(snapshot.fetched_at)
                        ],
                    )?;
                    continue;
                }

                let Some(table) = statement_table(update.kind) else {
                    continue;
                };
                tx.execute(
                    &format!("DELETE FROM {table} WHERE symbol = ?1"),
                    params![symbol],
                )?;
                for row in &rows {
                    tx.execute(
                        &format!(
                            "INSERT INTO {table} (symbol, period_end, payload, fetched_at)
                             VALUES (?1, ?2, ?3, ?4)"
                        ),
                        params![
                            symbol,
                            row.period_end.format(DATE_FORMAT).to_string(),
                            to_json(&row.payload)?,
                            to_millis(row.fetched_at)
                        ],
                    )?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn info(&self, symbol: &str) -> Result<Option<InfoSnapshot>, StoreError> {
        let symbol = symbol.to_string();
        self.call(move |conn| {
            let raw: Option<(String, i64)> = conn
                .query_row(
                    "SELECT payload, fetched_at FROM asset_info WHERE symbol = ?1",
                    params![symbol],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            raw.map(|(payload, ms)| {
                Ok(InfoSnapshot {
                    symbol: symbol.clone(),
                    payload: parse_json(&payload)?,
                    fetched_at: from_millis(ms)?,
                })
            })
            .transpose()
        })
        .await
    }

    async fn statements(
        &self,
        symbol: &str,
        kind: DatasetKind,
    ) -> Result<Vec<PeriodicStatement>, StoreError> {
        let Some(table) = statement_table(kind) else {
            return Ok(Vec::new());
        };
        let symbol = symbol.to_string();
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT period_end, payload, fetched_at FROM {table}
                 WHERE symbol = ?1 ORDER BY period_end DESC"
            ))?;
            let raw = stmt
                .query_map(params![symbol], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            raw.into_iter()
                .map(|(period_end, payload, ms)| {
                    Ok(PeriodicStatement {
                        symbol: symbol.clone(),
                        kind,
                        period_end: parse_date(&period_end)?,
                        payload: parse_json(&payload)?,
                        fetched_at: from_millis(ms)?,
                    })
                })
                .collect()
        })
        .await
    }
}

#[async_trait]
impl ReportCacheStore for SqliteDatabase {
    async fn lookup(&self, key: &ReportKey) -> Result<Option<String>, StoreError> {
        let key = key.clone();
        self.call(move |conn| {
            let date = key.generation_date.format(DATE_FORMAT).to_string();
            let payload = match key.scope {
                ReportScope::Portfolio => conn
                    .query_row(
                        "SELECT payload FROM report_cache_portfolio
                         WHERE generation_date = ?1 AND content_hash = ?2",
                        params![date, key.content_hash],
                        |row| row.get(0),
                    )
                    .optional()?,
                ReportScope::Asset => conn
                    .query_row(
                        "SELECT payload FROM report_cache_asset
                         WHERE symbol = ?1 AND generation_date = ?2 AND content_hash = ?3",
                        params![key.scope_key, date, key.content_hash],
                        |row| row.get(0),
                    )
                    .optional()?,
            };
            Ok(payload)
        })
        .await
    }

    async fn store(&self, key: &ReportKey, payload: &str) -> Result<(), StoreError> {
        let key = key.clone();
        let payload = payload.to_string();
        self.call(move |conn| {
            let date = key.generation_date.format(DATE_FORMAT).to_string();
            let tx = conn.transaction()?;
            match key.scope {
                ReportScope::Portfolio => {
                    tx.execute("DELETE FROM report_cache_portfolio", [])?;
                    tx.execute(
                        "INSERT INTO report_cache_portfolio (generation_date, content_hash, payload)
                         VALUES (?1, ?2, ?3)",
                        params![date, key.content_hash, payload],
                    )?;
                }
                ReportScope::Asset => {
                    tx.execute(
                        "DELETE FROM report_cache_asset WHERE symbol = ?1",
                        params![key.scope_key],
                    )?;
                    tx.execute(
                        "INSERT INTO report_cache_asset (symbol, generation_date, content_hash, payload)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![key.scope_key, date, key.content_hash, payload],
                    )?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
