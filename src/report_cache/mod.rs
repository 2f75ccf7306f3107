//! Content-addressed cache for generated analysis reports.

mod hashing;
mod service;
mod store;

pub use hashing::{asset_hash, asset_hash_of, portfolio_hash, PERCENT_OF_PORTFOLIO_FIELD};
pub use service::{
    extract_json_payload, AnalysisProvider, AnalysisRequest, ReportOutcome, ReportService,
    ASSET_INSTRUCTIONS, PORTFOLIO_INSTRUCTIONS,
};
pub use store::{MemoryReportCacheStore, ReportCacheStore, ReportKey, ReportScope};
