use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{asset_hash, portfolio_hash, ReportCacheStore, ReportKey, ReportScope};
use crate::clock::{Clock, SystemClock};
use crate::market_data::normalize_symbol;
use crate::models::Position;
use crate::storage::StoreError;

pub const PORTFOLIO_INSTRUCTIONS: &str = "Review the portfolio state below. Assess diversification, \
concentration and currency exposure. Answer with a single JSON object inside a ```json fenced block.";

pub const ASSET_INSTRUCTIONS: &str = "Review the asset snapshot below, including its fundamentals. \
Assess valuation and risks. Answer with a single JSON object inside a ```json fenced block.";

/// Input handed to the analysis provider.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub scope: ReportScope,
    pub scope_key: String,
    pub instructions: String,
    pub state: Value,
}

/// Text-generation backend that turns a request into free text with an embedded
/// JSON document.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    Cached(String),
    Generated(String),
    Failed { error: String },
}

impl ReportOutcome {
    pub fn is_cached(&self) -> bool {
        matches!(self, ReportOutcome::Cached(_))
    }

    /// The JSON document to show. Failures become `{"error": ...}`.
    pub fn to_payload(&self) -> Value {
        match self {
            ReportOutcome::Cached(raw) | ReportOutcome::Generated(raw) => {
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
            }
            ReportOutcome::Failed { error } => json!({ "error": error }),
        }
    }
}

fn json_block() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"```json\s*(\{[\s\S]*?\})\s*```").ok())
        .as_ref()
}

/// The first fenced ```json object in `text`, or the whole trimmed text.
pub fn extract_json_payload(text: &str) -> &str {
    json_block()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or_else(|| text.trim())
}

/// Read-through cache in front of an [`AnalysisProvider`].
pub struct ReportService {
    store: Arc<dyn ReportCacheStore>,
    analyst: Arc<dyn AnalysisProvider>,
    clock: Arc<dyn Clock>,
}

impl ReportService {
    pub fn new(store: Arc<dyn ReportCacheStore>, analyst: Arc<dyn AnalysisProvider>) -> Self {
        Self {
            store,
            analyst,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Report for the whole portfolio, keyed by holdings and today's date.
    pub async fn portfolio_report(
        &self,
        positions: &[Position],
        state: &Value,
    ) -> Result<ReportOutcome, StoreError> {
        let key = ReportKey::portfolio(self.clock.today(), portfolio_hash(positions));
        let request = AnalysisRequest {
            scope: ReportScope::Portfolio,
            scope_key: String::new(),
            instructions: PORTFOLIO_INSTRUCTIONS.to_string(),
            state: state.clone(),
        };
        self.read_through(key, request).await
    }

    /// Report for one asset, keyed by its normalized symbol, snapshot content and
    /// today's date.
    pub async fn asset_report(
        &self,
        symbol: &str,
        snapshot: &Value,
    ) -> Result<ReportOutcome, StoreError> {
        let symbol = normalize_symbol(symbol);
        let key = ReportKey::asset(symbol.clone(), self.clock.today(), asset_hash(snapshot));
        let request = AnalysisRequest {
            scope: ReportScope::Asset,
            scope_key: symbol,
            instructions: ASSET_INSTRUCTIONS.to_string(),
            state: snapshot.clone(),
        };
        self.read_through(key, request).await
    }

    async fn read_through(
        &self,
        key: ReportKey,
        request: AnalysisRequest,
    ) -> Result<ReportOutcome, StoreError> {
        if let Some(payload) = self.store.lookup(&key).await? {
            if serde_json::from_str::<Value>(&payload).is_ok() {
                debug!(scope = %key.scope, scope_key = %key.scope_key, "report served from cache");
                return Ok(ReportOutcome::Cached(payload));
            }
            warn!(
                scope = %key.scope,
                scope_key = %key.scope_key,
                "cached report is not valid JSON; regenerating"
            );
        }

        let text = match self.analyst.analyze(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(scope = %key.scope, scope_key = %key.scope_key, error = %e, "analysis failed");
                return Ok(ReportOutcome::Failed {
                    error: e.to_string(),
                });
            }
        };

        let document: Value = match serde_json::from_str(extract_json_payload(&text)) {
            Ok(document) => document,
            Err(e) => {
                warn!(scope = %key.scope, scope_key = %key.scope_key, error = %e, "analysis returned no JSON document");
                return Ok(ReportOutcome::Failed {
                    error: format!("analysis response is not valid JSON: {e}"),
                });
            }
        };

        let payload = document.to_string();
        self.store.store(&key, &payload).await?;
        info!(
            scope = %key.scope,
            scope_key = %key.scope_key,
            hash = %key.content_hash,
            "report generated and cached"
        );
        Ok(ReportOutcome::Generated(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_block() {
        let text = "Here you go:\n```json\n{\"risk\": \"low\"}\n```\nThanks";
        assert_eq!(extract_json_payload(text), "{\"risk\": \"low\"}");
    }

    #[test]
    fn falls_back_to_whole_text() {
        assert_eq!(extract_json_payload("  {\"a\": 1} \n"), "{\"a\": 1}");
    }

    #[test]
    fn failure_payload_is_explicit() {
        let outcome = ReportOutcome::Failed {
            error: "quota exceeded".to_string(),
        };
        assert_eq!(outcome.to_payload(), json!({"error": "quota exceeded"}));
        assert!(!outcome.is_cached());
    }
}
