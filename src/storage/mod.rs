//! Durable storage: the error type every store shares, the read-only position source,
//! and the SQLite backend.

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::models::Position;

/// The only failure class that stops a sync or report call.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store task failed: {0}")]
    Task(String),
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Task(e.to_string())
    }
}

/// Positions are owned elsewhere; the core only reads them.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn list_positions(&self) -> Result<Vec<Position>, StoreError>;
}

#[derive(Default)]
pub struct MemoryPositionSource {
    positions: Mutex<Vec<Position>>,
}

impl MemoryPositionSource {
    pub fn new(positions: Vec<Position>) -> Self {
        Self {
            positions: Mutex::new(positions),
        }
    }
}

#[async_trait]
impl PositionSource for MemoryPositionSource {
    async fn list_positions(&self) -> Result<Vec<Position>, StoreError> {
        Ok(self.positions.lock().await.clone())
    }
}
