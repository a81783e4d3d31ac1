use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    error::AppJsonResult,
    model::{user::UserCtrl, user_profile::UserProfileCtrl},
    realtime::AgentEvent,
    ServerState,
};

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub user_id: i32,
}

/// Current system status for one user, in the same shape as the
/// `system_status_update` realtime event.
pub async fn handler_system_status(
    State(state): State<ServerState>,
    Query(query): Query<StatusQuery>,
) -> AppJsonResult<serde_json::Value> {
    let user = UserCtrl::get_by_id(&state.conn, query.user_id).await?;
    let profile = UserProfileCtrl::get_or_create(&state.conn, query.user_id).await?;

    let active_tasks: Vec<String> = profile.autonomous_tasks.keys().cloned().collect();
    let event = AgentEvent::SystemStatusUpdate {
        is_processing: state.active_pipelines.is_running(query.user_id),
        last_email_check: user.last_sync.map(|t| t.to_rfc3339()),
        active_tasks,
        autonomous_mode: profile.agent_preferences.autonomous_mode_enabled,
        ml_training_status: state
            .model_store
            .current()
            .map(|_| "trained".to_string()),
        timestamp: Utc::now().to_rfc3339(),
    };

    // Pushed to the room as well so connected clients converge.
    state.broadcaster.emit_transient(query.user_id, &event);

    Ok(Json(serde_json::to_value(&event).unwrap_or_default()))
}
