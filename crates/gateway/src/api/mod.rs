pub mod auth;
pub mod health;
pub mod sessions;
pub mod webhook;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (no bearer token) and **protected**
/// (gated behind the `SB_API_TOKEN` middleware).  The webhook is public
/// at the HTTP level and checks the provider's secret header itself.
pub fn router(state: AppState) -> Router<AppState> {
    let webhook_path = state.config.telegram.webhook_path();

    let public = Router::new()
        .route("/health", get(health::health))
        .route(&webhook_path, post(webhook::receive));

    let protected = Router::new()
        .route("/v1/sessions", get(sessions::list_sessions))
        .route("/v1/sessions/:key", get(sessions::get_session))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public.merge(protected)
}

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}
