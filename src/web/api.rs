use crate::event::{events_from_stored_payload, Event};
use crate::storage::Storage;
use crate::watchdog::{HealthState, IngestionWatchdog};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub watchdog: Arc<IngestionWatchdog>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub consumer_id: String,
    pub paused: bool,
    pub recovering: bool,
    pub state: &'static str,
    pub recoveries_started: usize,
}

pub enum ApiError {
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// GET /health
pub async fn health_check() -> &'static str {
    "OK"
}

/// GET /status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let control = state.watchdog.control();

    Json(StatusResponse {
        consumer_id: control.consumer_id().to_string(),
        paused: control.is_paused(),
        recovering: state.watchdog.is_recovering(),
        state: match state.watchdog.state() {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
        },
        recoveries_started: state.watchdog.recoveries_started(),
    })
}

/// GET /all-events
///
/// Every stored batch, flattened into one array in storage order.
pub async fn get_all_events(State(state): State<AppState>) -> Result<Json<Vec<Event>>, ApiError> {
    let records = state
        .storage
        .list_records()
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let mut events = Vec::new();
    for record in records {
        match events_from_stored_payload(&record.data) {
            Ok(batch) => events.extend(batch),
            Err(e) => {
                warn!(record_id = %record.id, error = %e, "Skipping unreadable stored batch");
            }
        }
    }

    Ok(Json(events))
}
