//! WebSocket upgrade route
//!
//! Validates a session id, then hands the upgraded socket straight to
//! `core::connection::handle_connection`. A failed lookup rejects the
//! upgrade outright — authentication of the initial connection is an
//! external collaborator's job; the core's own concern starts
//! only once a principal is resolved.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::core::hub::HubHandle;
use crate::core::session::SessionAuthenticator;

#[derive(Clone)]
pub struct WsState {
    pub hub: HubHandle,
    pub authenticator: Arc<SessionAuthenticator>,
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    session_id: Option<String>,
}

/// `GET /ws` — upgrade to a WebSocket once the session id checks out.
pub async fn ws_upgrade(
    State(state): State<WsState>,
    Query(query): Query<WsQuery>,
    headers: axum::http::HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let session_id = query.session_id.or_else(|| {
        headers
            .get("X-Session-Id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });

    let Some(session_id) = session_id else {
        return (StatusCode::UNAUTHORIZED, "missing session id").into_response();
    };

    let principal = match state.authenticator.resolve(&session_id).await {
        Ok(principal) => principal,
        Err(e) => {
            tracing::debug!(error = %e, "rejected websocket upgrade");
            return (StatusCode::UNAUTHORIZED, "invalid or expired session").into_response();
        }
    };

    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| async move {
        crate::core::connection::handle_connection(socket, hub, principal.user_id).await;
    })
}
