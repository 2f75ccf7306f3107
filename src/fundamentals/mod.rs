//! Fundamentals datasets (company info plus three financial statements), their
//! durable store, and the per-symbol synchronization engine.

mod models;
mod store;
mod sync;

pub use models::{
    DatasetKind, DatasetPayload, DatasetUpdate, FundamentalsBundle, InfoSnapshot,
    PeriodicStatement, StatementPeriod,
};
pub(crate) use store::rows_for;
pub use store::{compact_info, FundamentalsStore, MemoryFundamentalsStore};
pub use sync::{FundamentalsSync, SyncOutcome};
