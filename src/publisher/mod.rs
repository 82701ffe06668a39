use crate::event::EventBatch;
use crate::retry::{RetryError, RetryPolicy};
use crate::stream::{RecordMetadata, StreamError, StreamProducer};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish worker has shut down")]
    Closed,
}

/// Where and how batches are sent
#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub topic: String,
    pub key: String,
    pub retry: RetryPolicy,
}

/// Non-blocking front of the publish worker.
///
/// Clones share the same worker. The worker exits once every clone has been
/// dropped and the queued batches have been handled.
#[derive(Clone)]
pub struct BatchPublisher {
    tx: mpsc::UnboundedSender<EventBatch>,
}

impl BatchPublisher {
    /// Start the single publish worker
    pub fn spawn(
        producer: Arc<dyn StreamProducer>,
        settings: PublishSettings,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_publish_worker(rx, producer, settings));
        (Self { tx }, handle)
    }

    #[cfg(test)]
    pub(crate) fn from_sender(tx: mpsc::UnboundedSender<EventBatch>) -> Self {
        Self { tx }
    }

    /// Queue a batch for publishing and return immediately
    pub fn publish(&self, batch: EventBatch) -> Result<(), PublishError> {
        debug!(events = batch.len(), "Queueing batch for publish");
        self.tx.send(batch).map_err(|_| PublishError::Closed)
    }
}

async fn run_publish_worker(
    mut rx: mpsc::UnboundedReceiver<EventBatch>,
    producer: Arc<dyn StreamProducer>,
    settings: PublishSettings,
) {
    info!(topic = %settings.topic, "Publish worker started");

    while let Some(batch) = rx.recv().await {
        match publish_with_retry(producer.as_ref(), &settings, &batch).await {
            Ok(metadata) => {
                info!(
                    topic = %metadata.topic,
                    partition = metadata.partition,
                    offset = metadata.offset,
                    events = batch.len(),
                    "Batch published"
                );
            }
            Err(e) => {
                error!(
                    attempts = e.attempts(),
                    events = batch.len(),
                    error = %e,
                    "Failed to publish batch, dropping it"
                );
            }
        }
    }

    info!("Publish worker stopped");
}

/// Serialize and send one batch, repeating both steps on failure.
pub async fn publish_with_retry(
    producer: &dyn StreamProducer,
    settings: &PublishSettings,
    batch: &EventBatch,
) -> Result<RecordMetadata, RetryError<StreamError>> {
    settings
        .retry
        .run("publish", move |_| async move {
            let payload = batch.to_wire()?;
            producer.send(&settings.topic, &settings.key, payload).await
        })
        .await
}
