//! `POST /v1/interactions/message` — the conversational entry point.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::state::AppState;

use super::api_error;

const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    pub message: String,
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_channel")]
    pub channel: String,
}

fn default_channel() -> String {
    "web".into()
}

pub async fn post_message(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> Response {
    // Ingress rate limit keyed by user, falling back to the session.
    let rate_key = request
        .user_id
        .clone()
        .unwrap_or_else(|| format!("session:{}", request.session_id));
    let limit = if request.user_id.is_some() {
        state.config.rate_limit_authenticated_per_minute
    } else {
        state.config.rate_limit_anonymous_per_minute
    };
    let decision =
        state
            .rate_limiter
            .check(&rate_key, limit, 60, chrono::Utc::now().timestamp());
    if !decision.allowed {
        return api_error(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded");
    }

    if request.message.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "message must not be empty");
    }
    if request.message.chars().count() > MAX_MESSAGE_CHARS {
        return api_error(StatusCode::BAD_REQUEST, "message exceeds 2000 characters");
    }
    if request.session_id.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "sessionId must not be empty");
    }

    let payload = state
        .orchestrator
        .process_message(
            request.message.trim(),
            request.session_id.trim(),
            request.user_id.as_deref().filter(|id| !id.trim().is_empty()),
            &request.channel,
        )
        .await;
    Json(payload).into_response()
}
