//! Admin voice endpoints: settings, call/job/suppression/alert reads,
//! stats, manual tick, and the audit trail.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use oc_domain::JsonMap;

use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
}

pub async fn get_settings(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!(state.voice.get_settings()))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(updates): Json<JsonMap>,
) -> impl IntoResponse {
    let before = state.voice.get_settings();
    let after = state.voice.update_settings(&updates);
    state.admin_activity.record(
        "admin",
        "admin@local",
        "update",
        "voice_settings",
        "singleton",
        Some(json!(before)),
        Some(json!(after)),
        "",
        "",
    );
    Json(json!(after))
}

pub async fn list_calls(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let rows = state
        .voice
        .list_calls(query.limit.unwrap_or(100), query.status.as_deref());
    Json(json!({"calls": rows}))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let rows = state
        .voice
        .list_jobs(query.limit.unwrap_or(100), query.status.as_deref());
    Json(json!({"jobs": rows}))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuppressRequest {
    pub user_id: String,
    #[serde(default)]
    pub reason: String,
}

pub async fn suppress_user(
    State(state): State<AppState>,
    Json(request): Json<SuppressRequest>,
) -> impl IntoResponse {
    let suppression = state.voice.suppress_user(&request.user_id, &request.reason);
    state.admin_activity.record(
        "admin",
        "admin@local",
        "create",
        "voice_suppression",
        &request.user_id,
        None,
        Some(json!(suppression)),
        "",
        "",
    );
    Json(json!(suppression))
}

pub async fn unsuppress_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    state.voice.unsuppress_user(&user_id);
    state.admin_activity.record(
        "admin",
        "admin@local",
        "delete",
        "voice_suppression",
        &user_id,
        None,
        None,
        "",
        "",
    );
    Json(json!({"removed": user_id}))
}

pub async fn list_suppressions(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({"suppressions": state.voice.list_suppressions()}))
}

pub async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let rows = state
        .voice
        .list_alerts(query.limit.unwrap_or(50), query.severity.as_deref());
    Json(json!({"alerts": rows}))
}

pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.voice.stats(Utc::now()))
}

/// Manual tick for operators and tests.
pub async fn process_due_work(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.voice.process_due_work(Utc::now()).await;
    Json(json!(report))
}

pub async fn list_activity(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let rows = state.admin_activity.list_recent(query.limit.unwrap_or(100));
    Json(json!({"logs": rows}))
}

pub async fn verify_activity(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    Json(json!(state.admin_activity.verify_integrity(
        query.limit.unwrap_or(5000)
    )))
}
