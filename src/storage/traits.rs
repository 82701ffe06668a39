use crate::retry::{Classify, FailureKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Durable form of one event batch.
#[derive(Debug, Clone)]
pub struct PersistedRecord {
    pub id: Uuid,
    /// Serialized event list, opaque to storage
    pub data: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn init_schema(&self) -> Result<(), StorageError>;

    /// Persist a new record wrapping `payload`. The id is generated by storage.
    async fn save_record(&self, payload: &str) -> Result<Uuid, StorageError>;

    /// All stored records, oldest first
    async fn list_records(&self) -> Result<Vec<PersistedRecord>, StorageError>;

    /// Cheap liveness check. Must not fail: any problem is reported as `false`.
    async fn probe(&self) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage error: {0}")]
    Generic(String),
}

impl From<duckdb::Error> for StorageError {
    fn from(e: duckdb::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

impl Classify for StorageError {
    fn kind(&self) -> FailureKind {
        // Access, serialization and generic runtime failures are all worth another try.
        FailureKind::Retryable
    }
}
