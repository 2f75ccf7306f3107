use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{
    DatasetKind, DatasetPayload, DatasetUpdate, FundamentalsBundle, InfoSnapshot,
    PeriodicStatement, StatementPeriod,
};
use crate::storage::StoreError;

/// Durable fundamentals storage.
///
/// `apply` is the only write path: every update in the slice replaces all stored rows
/// of its (symbol, kind) and the whole slice commits atomically.
#[async_trait]
pub trait FundamentalsStore: Send + Sync {
    /// Latest `fetched_at` across all stored rows of (symbol, kind).
    async fn last_fetched(
        &self,
        symbol: &str,
        kind: DatasetKind,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn apply(&self, symbol: &str, updates: &[DatasetUpdate]) -> Result<(), StoreError>;

    async fn info(&self, symbol: &str) -> Result<Option<InfoSnapshot>, StoreError>;

    /// Statements for a periodic kind, newest period first.
    async fn statements(
        &self,
        symbol: &str,
        kind: DatasetKind,
    ) -> Result<Vec<PeriodicStatement>, StoreError>;

    /// Info plus the most recent period of each statement kind.
    async fn bundle(&self, symbol: &str) -> Result<FundamentalsBundle, StoreError> {
        let latest = |rows: Vec<PeriodicStatement>| {
            rows.into_iter().next().map(|row| StatementPeriod {
                period_end: row.period_end,
                payload: row.payload,
            })
        };

        Ok(FundamentalsBundle {
            info: self.info(symbol).await?.map(|snapshot| snapshot.payload),
            income: latest(self.statements(symbol, DatasetKind::Income).await?),
            balance_sheet: latest(self.statements(symbol, DatasetKind::BalanceSheet).await?),
            cash_flow: latest(self.statements(symbol, DatasetKind::CashFlow).await?),
        })
    }
}

#[derive(Default)]
struct MemoryState {
    info: HashMap<String, InfoSnapshot>,
    statements: HashMap<(String, DatasetKind), Vec<PeriodicStatement>>,
}

/// In-memory store used by tests and dry runs.
#[derive(Default)]
pub struct MemoryFundamentalsStore {
    state: Mutex<MemoryState>,
}

impl MemoryFundamentalsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub(crate) fn rows_for(
    symbol: &str,
    update: &DatasetUpdate,
) -> (Option<InfoSnapshot>, Vec<PeriodicStatement>) {
    match &update.payload {
        DatasetPayload::Info(payload) => (
            Some(InfoSnapshot {
                symbol: symbol.to_string(),
                payload: payload.clone(),
                fetched_at: update.fetched_at,
            }),
            Vec::new(),
        ),
        DatasetPayload::Periodic(periods) => {
            let mut rows: Vec<PeriodicStatement> = periods
                .iter()
                .map(|period| PeriodicStatement {
                    symbol: symbol.to_string(),
                    kind: update.kind,
                    period_end: period.period_end,
                    payload: period.payload.clone(),
                    fetched_at: update.fetched_at,
                })
                .collect();
            rows.sort_by(|a, b| b.period_end.cmp(&a.period_end));
            rows.dedup_by(|a, b| a.period_end == b.period_end);
            (None, rows)
        }
    }
}

#[async_trait]
impl FundamentalsStore for MemoryFundamentalsStore {
    async fn last_fetched(
        &self,
        symbol: &str,
        kind: DatasetKind,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let state = self.state.lock().await;
        if kind == DatasetKind::Info {
            return Ok(state.info.get(symbol).map(|s| s.fetched_at));
        }
        Ok(state
            .statements
            .get(&(symbol.to_string(), kind))
            .and_then(|rows| rows.iter().map(|r| r.fetched_at).max()))
    }

    async fn apply(&self, symbol: &str, updates: &[DatasetUpdate]) -> Result<(), StoreError> {
        // A single lock guard covers the whole slice.
        let mut state = self.state.lock().await;
        for update in updates {
            let (info, rows) = rows_for(symbol, update);
            match info {
                Some(snapshot) => {
                    state.info.insert(symbol.to_string(), snapshot);
                }
                None => {
                    state
                        .statements
                        .insert((symbol.to_string(), update.kind), rows);
                }
            }
        }
        Ok(())
    }

    async fn info(&self, symbol: &str) -> Result<Option<InfoSnapshot>, StoreError> {
        Ok(self.state.lock().await.info.get(symbol).cloned())
    }

    async fn statements(
        &self,
        symbol: &str,
        kind: DatasetKind,
    ) -> Result<Vec<PeriodicStatement>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .statements
            .get(&(symbol.to_string(), kind))
            .cloned()
            .unwrap_or_default())
    }
}

/// Compact info document for display: drops null fields.
pub fn compact_info(payload: &Value) -> Value {
    match payload {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use serde_json::json;

    fn period(y: i32, payload: Value) -> StatementPeriod {
        StatementPeriod {
            period_end: NaiveDate::from_ymd_opt(y, 12, 31).unwrap(),
            payload,
        }
    }

    #[tokio::test]
    async fn apply_replaces_whole_dataset() {
        let store = MemoryFundamentalsStore::new();
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap();

        store
            .apply(
                "PETR4.SA",
                &[DatasetUpdate {
                    kind: DatasetKind::Income,
                    payload: DatasetPayload::Periodic(vec![
                        period(2023, json!({"netIncome": 1})),
                        period(2024, json!({"netIncome": 2})),
                    ]),
                    fetched_at: t0,
                }],
            )
            .await
            .unwrap();
        store
            .apply(
                "PETR4.SA",
                &[DatasetUpdate {
                    kind: DatasetKind::Income,
                    payload: DatasetPayload::Periodic(vec![period(2025, json!({"netIncome": 3}))]),
                    fetched_at: t1,
                }],
            )
            .await
            .unwrap();

        let rows = store
            .statements("PETR4.SA", DatasetKind::Income)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].payload, json!({"netIncome": 3}));
        assert_eq!(
            store
                .last_fetched("PETR4.SA", DatasetKind::Income)
                .await
                .unwrap(),
            Some(t1)
        );
        assert_eq!(
            store
                .last_fetched("PETR4.SA", DatasetKind::CashFlow)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn bundle_picks_latest_period() {
        let store = MemoryFundamentalsStore::new();
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        store
            .apply(
                "VALE3.SA",
                &[
                    DatasetUpdate {
                        kind: DatasetKind::Info,
                        payload: DatasetPayload::Info(json!({"sector": "Basic Materials"})),
                        fetched_at: at,
                    },
                    DatasetUpdate {
                        kind: DatasetKind::BalanceSheet,
                        payload: DatasetPayload::Periodic(vec![
                            period(2022, json!({"totalAssets": 10})),
                            period(2024, json!({"totalAssets": 30})),
                        ]),
                        fetched_at: at,
                    },
                ],
            )
            .await
            .unwrap();

        let bundle = store.bundle("VALE3.SA").await.unwrap();
        assert_eq!(bundle.info, Some(json!({"sector": "Basic Materials"})));
        assert_eq!(
            bundle.balance_sheet.map(|p| p.payload),
            Some(json!({"totalAssets": 30}))
        );
        assert!(bundle.income.is_none());
    }

    #[test]
    fn compact_info_drops_nulls() {
        let compact = compact_info(&json!({"sector": "Energy", "website": null}));
        assert_eq!(compact, json!({"sector": "Energy"}));
    }
}
