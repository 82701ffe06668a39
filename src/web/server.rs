use super::api::{get_all_events, get_status, health_check, AppState};
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/all-events", get(get_all_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the read API on `listen` until `shutdown` fires
pub async fn run_server(
    state: AppState,
    listen: &str,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let listener = TcpListener::bind(listen).await?;
    info!(addr = %listen, "Web server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!("Web server shutting down gracefully");
        })
        .await
}
