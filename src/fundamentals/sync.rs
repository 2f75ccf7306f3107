use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{DatasetKind, DatasetUpdate, FundamentalsStore};
use crate::clock::{Clock, SystemClock};
use crate::freshness::{log_staleness, DataClass, FreshnessPolicy};
use crate::market_data::{normalize_symbol, MarketDataProvider};
use crate::storage::StoreError;

/// What one `sync_symbol` call did, per dataset kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub ok: bool,
    pub detail: String,
    pub updated: Vec<DatasetKind>,
    pub skipped: Vec<DatasetKind>,
    pub failed: Vec<DatasetKind>,
    pub empty: Vec<DatasetKind>,
}

impl SyncOutcome {
    fn rejected(detail: String) -> Self {
        Self {
            ok: false,
            detail,
            ..Default::default()
        }
    }
}

/// Refreshes the four fundamentals datasets of a symbol into a [`FundamentalsStore`].
pub struct FundamentalsSync {
    provider: Arc<dyn MarketDataProvider>,
    store: Arc<dyn FundamentalsStore>,
    policy: FreshnessPolicy,
    clock: Arc<dyn Clock>,
}

impl FundamentalsSync {
    pub fn new(provider: Arc<dyn MarketDataProvider>, store: Arc<dyn FundamentalsStore>) -> Self {
        Self {
            provider,
            store,
            policy: FreshnessPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_policy(mut self, policy: FreshnessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn FundamentalsStore> {
        &self.store
    }

    /// Fetch every stale dataset kind, then commit all replacements together.
    ///
    /// Provider failures for one kind are logged and leave that kind untouched.
    /// Store failures are returned.
    pub async fn sync_symbol(&self, symbol: &str) -> Result<SyncOutcome, StoreError> {
        let symbol = normalize_symbol(symbol);
        let handle = match self.provider.fundamentals(&symbol) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "cannot build fundamentals handle");
                return Ok(SyncOutcome::rejected(e.to_string()));
            }
        };

        let mut outcome = SyncOutcome {
            ok: true,
            ..Default::default()
        };
        let mut staged = Vec::new();

        for kind in DatasetKind::ALL {
            let last = self.store.last_fetched(&symbol, kind).await?;
            let check = self
                .policy
                .check(last, DataClass::Fundamentals, self.clock.now());
            log_staleness(DataClass::Fundamentals, &format!("{symbol}:{kind}"), &check);
            if !check.is_stale {
                outcome.skipped.push(kind);
                continue;
            }

            match handle.fetch(kind).await {
                Ok(Some(payload)) if !payload.is_empty() => {
                    staged.push(DatasetUpdate {
                        kind,
                        payload,
                        fetched_at: self.clock.now(),
                    });
                    outcome.updated.push(kind);
                }
                Ok(_) => {
                    debug!(symbol = %symbol, kind = %kind, "provider returned no data");
                    outcome.empty.push(kind);
                }
                Err(e) => {
                    warn!(symbol = %symbol, kind = %kind, error = %e, "dataset fetch failed");
                    outcome.failed.push(kind);
                }
            }
        }

        if !staged.is_empty() {
            self.store.apply(&symbol, &staged).await?;
        }

        outcome.detail = format!(
            "updated {}, skipped {}, failed {}, empty {}",
            outcome.updated.len(),
            outcome.skipped.len(),
            outcome.failed.len(),
            outcome.empty.len()
        );
        info!(symbol = %symbol, detail = %outcome.detail, "fundamentals sync finished");
        Ok(outcome)
    }
}
