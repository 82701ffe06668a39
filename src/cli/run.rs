use crate::collector::{run_collector, EventBatcher};
use crate::config::{load_or_default, types::Config, ConfigError};
use crate::persister::{run_consumer, StoragePersister};
use crate::publisher::{BatchPublisher, PublishSettings};
use crate::storage::duckdb::DuckDbStorage;
use crate::storage::{Storage, StorageError};
use crate::stream::{ConsumptionControl, MemoryBroker, StreamError};
use crate::watchdog::{IngestionWatchdog, StorageProbe};
use crate::web::{run_server, AppState};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("web server error: {0}")]
    WebServer(String),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let (config, used_path) = load_or_default(config_path.as_deref())?;

    match used_path {
        Some(path) => info!(config_path = %path.display(), "Loaded configuration"),
        None => info!("No config file found, using built-in defaults"),
    }

    run_with_shutdown(config, async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
        }
    })
    .await
    .map_err(|e| e.into())
}

/// Start every task of the pipeline and run until `shutdown_signal` completes
/// or the web server fails.
pub async fn run_with_shutdown<S>(config: Config, shutdown_signal: S) -> Result<(), RunError>
where
    S: Future<Output = ()>,
{
    info!(path = %config.storage.path.display(), "Initializing storage");
    let storage: Arc<dyn Storage> = Arc::new(DuckDbStorage::new(&config.storage.path)?);
    storage.init_schema().await?;

    let broker = MemoryBroker::new();
    broker.create_topic(&config.stream.topic, config.stream.partitions)?;
    let consumer = broker.subscribe(
        &config.stream.topic,
        &config.stream.group_id,
        &config.stream.consumer_id,
    )?;

    let shutdown = CancellationToken::new();

    let control = Arc::new(ConsumptionControl::new(consumer.handle()));
    let probe = Arc::new(StorageProbe::new(
        Arc::clone(&storage),
        config.watchdog.probe_timeout,
    ));
    let watchdog = Arc::new(IngestionWatchdog::new(
        probe,
        control,
        config.watchdog.poll_interval,
        shutdown.child_token(),
    ));
    let persister = Arc::new(StoragePersister::new(
        Arc::clone(&storage),
        config.consumer.retry,
        Arc::clone(&watchdog),
    ));

    let (publisher, mut publish_worker) = BatchPublisher::spawn(
        Arc::new(broker.clone()),
        PublishSettings {
            topic: config.stream.topic.clone(),
            key: config.stream.key.clone(),
            retry: config.producer.retry,
        },
    );

    info!("Starting consumer");
    let consumer_handle = tokio::spawn(run_consumer(consumer, persister, shutdown.clone()));

    info!("Starting event collector");
    let collector_handle = tokio::spawn(run_collector(
        EventBatcher::new(config.batcher.threshold),
        publisher,
        config.batcher,
        shutdown.clone(),
    ));

    info!("Starting web server on {}", config.web.listen);
    let web_state = AppState {
        storage: Arc::clone(&storage),
        watchdog: Arc::clone(&watchdog),
    };
    let listen = config.web.listen.clone();
    let web_shutdown = shutdown.clone();
    let mut web_handle: JoinHandle<Result<(), RunError>> = tokio::spawn(async move {
        run_server(web_state, &listen, web_shutdown)
            .await
            .map_err(|e| RunError::WebServer(e.to_string()))
    });

    info!("Pipeline started, press Ctrl+C to shutdown");

    let mut web_result = None;
    tokio::select! {
        _ = shutdown_signal => {
            info!("Shutdown signal received");
        }
        result = &mut web_handle => {
            web_result = Some(result);
        }
    }

    // Stops the timer, the consumer loop, the recovery loop and the web server
    shutdown.cancel();

    if let Err(e) = collector_handle.await {
        error!(error = %e, "Collector task join error");
    }

    // The collector owned the last publisher handle, so the worker now drains and exits
    drain_publish_worker(&mut publish_worker, config.shutdown.publish_grace).await;

    broker.close();
    if let Err(e) = consumer_handle.await {
        error!(error = %e, "Consumer task join error");
    }

    let web_result = match web_result {
        Some(result) => result,
        None => match tokio::time::timeout(Duration::from_secs(5), &mut web_handle).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Web server did not stop in time, aborting");
                web_handle.abort();
                Ok(Ok(()))
            }
        },
    };

    info!(
        recoveries = watchdog.recoveries_started(),
        "Pipeline shutdown complete"
    );

    match web_result {
        Ok(result) => result,
        Err(e) => Err(RunError::WebServer(e.to_string())),
    }
}

async fn drain_publish_worker(worker: &mut JoinHandle<()>, grace: Duration) {
    match tokio::time::timeout(grace, &mut *worker).await {
        Ok(Ok(())) => info!("Publish worker drained"),
        Ok(Err(e)) => error!(error = %e, "Publish worker join error"),
        Err(_) => {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "Publish worker still busy after grace period, aborting"
            );
            worker.abort();
        }
    }
}
