//! HTTP surface under `/v1`.

mod interactions;
mod voice_admin;
mod webhooks;
mod ws;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/interactions/message", post(interactions::post_message))
        .route("/v1/ws", get(ws::ws_handler))
        .route(
            "/v1/admin/voice/settings",
            get(voice_admin::get_settings).put(voice_admin::update_settings),
        )
        .route("/v1/admin/voice/calls", get(voice_admin::list_calls))
        .route("/v1/admin/voice/jobs", get(voice_admin::list_jobs))
        .route(
            "/v1/admin/voice/suppressions",
            get(voice_admin::list_suppressions).post(voice_admin::suppress_user),
        )
        .route(
            "/v1/admin/voice/suppressions/:user_id",
            delete(voice_admin::unsuppress_user),
        )
        .route("/v1/admin/voice/alerts", get(voice_admin::list_alerts))
        .route("/v1/admin/voice/stats", get(voice_admin::stats))
        .route("/v1/admin/voice/process", post(voice_admin::process_due_work))
        .route(
            "/v1/admin/activity",
            get(voice_admin::list_activity),
        )
        .route(
            "/v1/admin/activity/verify",
            get(voice_admin::verify_activity),
        )
        .route(
            "/v1/voice/superu/callback",
            post(webhooks::superu_callback),
        )
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}
