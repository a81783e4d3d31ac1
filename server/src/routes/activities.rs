use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::{error::AppJsonResult, model::activity::ActivityCtrl, ServerState};

#[derive(Debug, Deserialize)]
pub struct ActivitiesQuery {
    pub user_id: i32,
    pub limit: Option<u64>,
}

/// Recent activity entries, newest first; the catch-up feed for UIs that
/// join after events were broadcast.
pub async fn handler_recent_activities(
    State(state): State<ServerState>,
    Query(query): Query<ActivitiesQuery>,
) -> AppJsonResult<Vec<entity::activity::Model>> {
    let limit = query.limit.unwrap_or(50).min(200);
    let entries = ActivityCtrl::recent(&state.conn, query.user_id, limit).await?;

    Ok(Json(entries))
}
