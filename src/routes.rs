use axum::Router;

use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the axum Router: the per-room WebSocket upgrade endpoint plus a
/// health check. Everything else about events and users lives in the
/// surrounding platform.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/{room_id}", axum::routing::get(ws_handler::ws_upgrade))
        .route("/health", axum::routing::get(health_check))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
