use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use reqlog::event::{Event, EventBatch};
use reqlog::storage::duckdb::DuckDbStorage;
use reqlog::storage::Storage;
use reqlog::stream::{ConsumptionControl, MemoryBroker};
use reqlog::watchdog::{IngestionWatchdog, StorageProbe};
use reqlog::web::{create_router, AppState};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

async fn app_state() -> AppState {
    let storage: Arc<dyn Storage> = Arc::new(DuckDbStorage::in_memory().unwrap());
    storage.init_schema().await.unwrap();

    let broker = MemoryBroker::new();
    broker.create_topic("new-event-topic", 3).unwrap();
    let consumer = broker
        .subscribe("new-event-topic", "event-group", "web-test-host")
        .unwrap();

    let watchdog = Arc::new(IngestionWatchdog::new(
        Arc::new(StorageProbe::new(storage.clone(), Duration::from_secs(1))),
        Arc::new(ConsumptionControl::new(consumer.handle())),
        Duration::from_secs(5),
        CancellationToken::new(),
    ));

    AppState { storage, watchdog }
}

async fn get(state: AppState, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = create_router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_health() {
    let (status, body) = get(app_state().await, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn test_all_events_flattens_stored_batches() {
    let state = app_state().await;
    let first = EventBatch::new(vec![Event::now(), Event::now()]);
    let second = EventBatch::new(vec![Event::now(), Event::now(), Event::now()]);
    state
        .storage
        .save_record(&first.to_stored_payload().unwrap())
        .await
        .unwrap();
    state
        .storage
        .save_record(&second.to_stored_payload().unwrap())
        .await
        .unwrap();

    let (status, body) = get(state, "/all-events").await;

    assert_eq!(status, StatusCode::OK);
    let events: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
    assert_eq!(events.len(), 5);
    assert!(events.iter().all(|e| e.get("dateTime").is_some()));
}

#[tokio::test]
async fn test_all_events_empty_store() {
    let (status, body) = get(app_state().await, "/all-events").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"[]");
}

#[tokio::test]
async fn test_status_reflects_pause() {
    let state = app_state().await;

    let (status, body) = get(state.clone(), "/status").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["consumer_id"], "web-test-host");
    assert_eq!(json["paused"], false);
    assert_eq!(json["state"], "healthy");

    state.watchdog.control().pause();

    let (_, body) = get(state, "/status").await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["paused"], true);
    assert_eq!(json["recovering"], false);
    assert_eq!(json["state"], "degraded");
}
