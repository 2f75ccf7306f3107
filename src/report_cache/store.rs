use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::storage::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportScope {
    Portfolio,
    Asset,
}

impl ReportScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportScope::Portfolio => "portfolio",
            ReportScope::Asset => "asset",
        }
    }
}

impl fmt::Display for ReportScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact-match key of a cached report. `scope_key` is empty for portfolio scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportKey {
    pub scope: ReportScope,
    pub scope_key: String,
    pub generation_date: NaiveDate,
    pub content_hash: String,
}

impl ReportKey {
    pub fn portfolio(generation_date: NaiveDate, content_hash: impl Into<String>) -> Self {
        Self {
            scope: ReportScope::Portfolio,
            scope_key: String::new(),
            generation_date,
            content_hash: content_hash.into(),
        }
    }

    pub fn asset(
        symbol: impl Into<String>,
        generation_date: NaiveDate,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            scope: ReportScope::Asset,
            scope_key: symbol.into(),
            generation_date,
            content_hash: content_hash.into(),
        }
    }
}

/// Content-addressed report storage.
///
/// Storing a portfolio report evicts every other portfolio report. Storing an asset
/// report evicts every other report for that symbol.
#[async_trait]
pub trait ReportCacheStore: Send + Sync {
    async fn lookup(&self, key: &ReportKey) -> Result<Option<String>, StoreError>;

    async fn store(&self, key: &ReportKey, payload: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
struct Slots {
    portfolio: Option<(ReportKey, String)>,
    assets: HashMap<String, (ReportKey, String)>,
}

#[derive(Default)]
pub struct MemoryReportCacheStore {
    slots: Mutex<Slots>,
}

impl MemoryReportCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows for a scope.
    pub async fn len(&self, scope: ReportScope) -> usize {
        let slots = self.slots.lock().await;
        match scope {
            ReportScope::Portfolio => usize::from(slots.portfolio.is_some()),
            ReportScope::Asset => slots.assets.len(),
        }
    }
}

#[async_trait]
impl ReportCacheStore for MemoryReportCacheStore {
    async fn lookup(&self, key: &ReportKey) -> Result<Option<String>, StoreError> {
        let slots = self.slots.lock().await;
        let entry = match key.scope {
            ReportScope::Portfolio => slots.portfolio.as_ref(),
            ReportScope::Asset => slots.assets.get(&key.scope_key),
        };
        Ok(entry
            .filter(|(stored, _)| stored == key)
            .map(|(_, payload)| payload.clone()))
    }

    async fn store(&self, key: &ReportKey, payload: &str) -> Result<(), StoreError> {
        let mut slots = self.slots.lock().await;
        let entry = (key.clone(), payload.to_string());
        match key.scope {
            ReportScope::Portfolio => slots.portfolio = Some(entry),
            ReportScope::Asset => {
                slots.assets.insert(key.scope_key.clone(), entry);
            }
        }
        Ok(())
    }
}
