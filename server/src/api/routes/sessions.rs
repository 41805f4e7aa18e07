//! Session creation endpoint
//!
//! Authenticating the initial WebSocket upgrade is treated as an
//! external collaborator's concern — the core only resolves a session id it
//! is handed. Something upstream still has to mint that id in the first
//! place, so this route is a thin, rate-limited wrapper around
//! `SessionAuthenticator::create` that lets this crate run end to end as a
//! self-contained demo without inventing a full identity provider.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::types::ApiError;
use crate::core::session::SessionAuthenticator;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub user_id: i64,
    pub username: String,
    #[serde(default)]
    pub device_fingerprint: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub user_id: i64,
    pub username: String,
    pub expires_at: String,
}

/// Create a new session
#[utoipa::path(
    post,
    path = "/api/v1/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = CreateSessionResponse),
        (status = 400, description = "Invalid request"),
    )
)]
pub async fn create_session(
    State(authenticator): State<Arc<SessionAuthenticator>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    if req.username.trim().is_empty() {
        return Err(ApiError::bad_request(
            "INVALID_USERNAME",
            "username must not be empty",
        ));
    }

    let principal = authenticator
        .create(req.user_id, &req.username, req.device_fingerprint.as_deref())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to create session");
            ApiError::internal("Failed to create session")
        })?;

    Ok(Json(CreateSessionResponse {
        session_id: principal.session_id,
        user_id: principal.user_id,
        username: principal.username,
        expires_at: principal.expires_at.to_rfc3339(),
    }))
}
