//! Telegram webhook ingestion.
//!
//! `POST <webhook path>` accepts one `Update` per request, routes it into
//! the per-chat queue and acknowledges immediately.  Handling happens
//! later on the dispatcher; the provider only learns whether the update
//! was accepted.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use sb_dispatch::DispatchError;
use sb_domain::trace::TraceEvent;
use sb_telegram::Update;

use super::api_error;
use super::auth::matches_digest;
use crate::state::AppState;

/// Header the Bot API uses to echo the secret given to `setWebhook`.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

pub async fn receive(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(expected) = &state.webhook_secret_hash {
        let provided = headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !matches_digest(provided, expected) {
            tracing::warn!("webhook delivery with missing or wrong secret token");
            return api_error(StatusCode::UNAUTHORIZED, "invalid webhook secret token");
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            tracing::warn!(error = %e, bytes = body.len(), "undecodable webhook body");
            return api_error(StatusCode::BAD_REQUEST, format!("invalid update: {e}"));
        }
    };
    let update_id = update.update_id;

    match state.registry.route(update) {
        Ok(outcome) => {
            tracing::debug!(update_id, outcome = outcome.as_str(), "update accepted");
            (StatusCode::OK, Json(serde_json::json!({ "ok": true }))).into_response()
        }
        Err(e @ DispatchError::Unroutable { .. }) => {
            tracing::warn!(update_id, error = %e, "update rejected");
            TraceEvent::UpdateRejected {
                sequence_id: update_id,
                reason: e.to_string(),
            }
            .emit();
            api_error(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}
