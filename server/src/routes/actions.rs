use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    db_core::prelude::*,
    error::{AppError, AppJsonResult},
    model::action_request::ActionRequestCtrl,
    realtime::AgentEvent,
    ServerState,
};

#[derive(Debug, Deserialize)]
pub struct EnqueueActionRequest {
    pub user_id: i32,
    pub action: ActionKind,
    pub message_id: Option<String>,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// User-originated side effect: validated, queued, and picked up by the
/// action worker on its next tick.
pub async fn handler_enqueue_action(
    State(state): State<ServerState>,
    Json(body): Json<EnqueueActionRequest>,
) -> AppJsonResult<serde_json::Value> {
    match body.action {
        ActionKind::Archive | ActionKind::ApplyLabel if body.message_id.is_none() => {
            return Err(AppError::BadRequest(format!(
                "{} requires a message_id",
                body.action
            )));
        }
        _ => {}
    }

    let request = ActionRequestCtrl::enqueue(
        &state.conn,
        body.user_id,
        body.action,
        body.message_id,
        body.params,
    )
    .await?;

    state
        .broadcaster
        .emit(body.user_id, AgentEvent::action_queued(&request))
        .await;

    Ok(Json(json!({
        "request_id": request.id,
        "status": request.status,
    })))
}

/// Audit lookup: requests keep their result message after completion.
pub async fn handler_get_action(
    State(state): State<ServerState>,
    Path(request_id): Path<String>,
) -> AppJsonResult<entity::action_request::Model> {
    let request = ActionRequestCtrl::get(&state.conn, &request_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Action request not found".to_string()))?;

    Ok(Json(request))
}
