//! Read-only view of the per-chat queues.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use sb_dispatch::SessionKey;

use super::api_error;
use crate::state::AppState;

/// `GET /v1/sessions`: every known session, busiest first.
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let mut sessions = state.registry.snapshot();
    sessions.sort_by(|a, b| {
        b.pending
            .cmp(&a.pending)
            .then_with(|| a.session_key.cmp(&b.session_key))
    });
    Json(serde_json::json!({
        "count": sessions.len(),
        "duplicate_policy": state.registry.duplicate_policy(),
        "sessions": sessions,
    }))
}

/// `GET /v1/sessions/:key`
pub async fn get_session(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.registry.stats(&SessionKey::from(key)) {
        Some(stats) => Json(stats).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "session not found"),
    }
}
