//! Status API for the monitor itself.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/healthz` | The monitor process is alive |
//! | GET | `/status` | Latest [`StatusSnapshot`] published by the engine |
//!
//! Handlers only read the newest snapshot from a `watch` channel; they never
//! touch engine state.

use std::net::SocketAddr;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::sync::watch;
use tracing::info;

use vigil_engine::StatusSnapshot;

/// Shared state for status handlers.
#[derive(Clone)]
pub struct StatusState {
    pub snapshot: watch::Receiver<StatusSnapshot>,
}

/// Build the status router.
pub fn build_router(snapshot: watch::Receiver<StatusSnapshot>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .with_state(StatusState { snapshot })
}

/// GET /healthz
async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /status
async fn status(State(state): State<StatusState>) -> impl IntoResponse {
    let snapshot = state.snapshot.borrow().clone();
    Json(snapshot)
}

/// Serve the status API on `listener` until `shutdown` flips to `true`.
pub async fn serve(
    listener: tokio::net::TcpListener,
    snapshot: watch::Receiver<StatusSnapshot>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    info!(?addr, "status server listening");
    axum::serve(listener, build_router(snapshot))
        .with_graceful_shutdown(async move {
            // A dropped sender also ends the server.
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}
