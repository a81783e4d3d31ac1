use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::{error::AppJsonResult, model::user_task::UserTaskCtrl, ServerState};

#[derive(Debug, Deserialize)]
pub struct TasksQuery {
    pub user_id: i32,
    pub limit: Option<u64>,
}

/// Open tasks, newest first: follow-ups from the autonomous tier plus
/// action items extracted from processed email.
pub async fn handler_open_tasks(
    State(state): State<ServerState>,
    Query(query): Query<TasksQuery>,
) -> AppJsonResult<Vec<entity::user_task::Model>> {
    let limit = query.limit.unwrap_or(50).min(200);
    let tasks = UserTaskCtrl::open_tasks(&state.conn, query.user_id, limit).await?;

    Ok(Json(tasks))
}
