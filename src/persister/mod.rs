use crate::event::EventBatch;
use crate::retry::{RetryError, RetryPolicy};
use crate::storage::{Storage, StorageError};
use crate::stream::{Delivery, MemoryConsumer};
use crate::watchdog::{IngestionWatchdog, TriggerOutcome};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("malformed batch payload: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("storage write failed: {0}")]
    Storage(#[from] RetryError<StorageError>),
}

/// Result of handling one delivered message
#[derive(Debug)]
pub enum PersistOutcome {
    /// Stored and acknowledged
    Persisted(Uuid),
    /// Empty payload, ignored without acknowledgment
    Skipped,
    /// Not stored, not acknowledged; the watchdog was consulted
    Failed {
        error: PersistError,
        trigger: TriggerOutcome,
    },
}

/// Writes received batches to storage and acknowledges them only once stored.
pub struct StoragePersister {
    storage: Arc<dyn Storage>,
    retry: RetryPolicy,
    watchdog: Arc<IngestionWatchdog>,
}

impl StoragePersister {
    pub fn new(
        storage: Arc<dyn Storage>,
        retry: RetryPolicy,
        watchdog: Arc<IngestionWatchdog>,
    ) -> Self {
        Self {
            storage,
            retry,
            watchdog,
        }
    }

    /// Handle one delivery end to end.
    pub async fn process(&self, delivery: Delivery) -> PersistOutcome {
        let Delivery { record, ack } = delivery;
        let key = record.key.as_deref().unwrap_or("");

        if record.value.trim().is_empty() {
            warn!(
                key = %key,
                partition = record.partition,
                offset = record.offset,
                "Received empty message, skipping"
            );
            return PersistOutcome::Skipped;
        }

        debug!(
            key = %key,
            partition = record.partition,
            offset = record.offset,
            "Message received"
        );

        match self.persist(&record.value).await {
            Ok(id) => {
                ack.acknowledge();
                info!(
                    record_id = %id,
                    partition = record.partition,
                    offset = record.offset,
                    "Batch stored, offset acknowledged"
                );
                PersistOutcome::Persisted(id)
            }
            Err(error) => {
                error!(
                    key = %key,
                    partition = record.partition,
                    offset = record.offset,
                    error = %error,
                    "Failed to store batch, message left unacknowledged"
                );
                let trigger = self.watchdog.report_failure(&error.to_string()).await;
                PersistOutcome::Failed { error, trigger }
            }
        }
    }

    /// Decode a wire payload and store its event list as a new record.
    ///
    /// Decoding failures are not retried; storage failures are, per the retry policy.
    pub async fn persist(&self, payload: &str) -> Result<Uuid, PersistError> {
        let batch = EventBatch::from_wire(payload).map_err(PersistError::Malformed)?;
        let storage = self.storage.as_ref();
        let batch = &batch;

        let id = self
            .retry
            .run("persist", move |_| async move {
                let stored = batch.to_stored_payload()?;
                storage.save_record(&stored).await
            })
            .await?;

        Ok(id)
    }
}

/// Feed deliveries to the persister one at a time until the stream closes or
/// `shutdown` fires. A slow persist delays the next delivery.
pub async fn run_consumer(
    mut consumer: MemoryConsumer,
    persister: Arc<StoragePersister>,
    shutdown: CancellationToken,
) {
    info!(consumer_id = %consumer.consumer_id(), "Consumer loop started");

    loop {
        let delivery = tokio::select! {
            _ = shutdown.cancelled() => break,
            delivery = consumer.recv() => delivery,
        };

        match delivery {
            Some(delivery) => {
                persister.process(delivery).await;
            }
            None => {
                info!("Stream closed");
                break;
            }
        }
    }

    info!(consumer_id = %consumer.consumer_id(), "Consumer loop stopped");
}
