use crate::storage::Storage;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Answers whether storage is reachable right now. Never fails.
#[async_trait]
pub trait AvailabilityProbe: Send + Sync {
    async fn is_available(&self) -> bool;
}

/// Probe backed by the storage engine's own liveness check, bounded by a timeout.
pub struct StorageProbe {
    storage: Arc<dyn Storage>,
    timeout: Duration,
}

impl StorageProbe {
    pub fn new(storage: Arc<dyn Storage>, timeout: Duration) -> Self {
        Self { storage, timeout }
    }
}

#[async_trait]
impl AvailabilityProbe for StorageProbe {
    async fn is_available(&self) -> bool {
        match tokio::time::timeout(self.timeout, self.storage.probe()).await {
            Ok(available) => {
                debug!(available = available, "Storage probe finished");
                available
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Storage probe timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{PersistedRecord, StorageError};
    use uuid::Uuid;

    struct SlowStorage {
        delay: Duration,
        result: bool,
    }

    #[async_trait]
    impl Storage for SlowStorage {
        async fn init_schema(&self) -> Result<(), StorageError> {
            Ok(())
        }

        async fn save_record(&self, _payload: &str) -> Result<Uuid, StorageError> {
            Ok(Uuid::new_v4())
        }

        async fn list_records(&self) -> Result<Vec<PersistedRecord>, StorageError> {
            Ok(Vec::new())
        }

        async fn probe(&self) -> bool {
            tokio::time::sleep(self.delay).await;
            self.result
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_passes_through_result() {
        let probe = StorageProbe::new(
            Arc::new(SlowStorage {
                delay: Duration::from_millis(10),
                result: true,
            }),
            Duration::from_secs(1),
        );
        assert!(probe.is_available().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_reports_unavailable() {
        let probe = StorageProbe::new(
            Arc::new(SlowStorage {
                delay: Duration::from_secs(30),
                result: true,
            }),
            Duration::from_secs(2),
        );

        let start = tokio::time::Instant::now();
        assert!(!probe.is_available().await);
        assert!(start.elapsed() < Duration::from_secs(3));
    }
}
