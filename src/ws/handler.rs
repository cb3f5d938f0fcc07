use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::auth;
use crate::relay::RoomId;
use crate::state::AppState;
use crate::ws::connection;

/// Query parameters for the WebSocket upgrade. Browser WebSocket clients
/// cannot set headers, so the token may arrive as `?token=` instead of an
/// `Authorization: Bearer` header.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// GET /ws/{room_id}
/// Authenticated WebSocket upgrade for one event room. The credential is
/// validated before the upgrade; a missing or invalid token is rejected
/// with 401 and no socket is ever established.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Query(params): Query<WsAuthQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = auth::bearer_token(&headers)
        .map(str::to_owned)
        .or(params.token);
    let Some(token) = token else {
        tracing::warn!(room_id, "websocket upgrade rejected: missing credential");
        return (StatusCode::UNAUTHORIZED, "missing credential").into_response();
    };

    match auth::validate_access_token(&state.jwt_secret, &token) {
        Ok(claims) => {
            tracing::info!(
                user_id = claims.sub,
                room_id,
                "websocket connection authenticated"
            );
            // Enforce the frame-size cap at the protocol layer so oversized
            // frames of any kind (text or binary) are rejected before they
            // are buffered; the receive error tears the connection down.
            ws.max_message_size(state.relay.max_frame_bytes)
                .on_upgrade(move |socket| connection::run(socket, state, claims.sub, room_id))
        }
        Err(err) => {
            tracing::warn!(room_id, error = %err, "websocket upgrade rejected: invalid token");
            (StatusCode::UNAUTHORIZED, "invalid token").into_response()
        }
    }
}
