pub mod clock;
pub mod config;
pub mod duration;
pub mod format;
pub mod freshness;
pub mod fundamentals;
pub mod market_data;
pub mod models;
pub mod portfolio;
pub mod report_cache;
pub mod storage;
pub mod valuation;
