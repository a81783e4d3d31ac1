use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::{error::AppJsonResult, model::user::UserCtrl, ServerState};

const MAX_RESULTS_CEILING: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct ProcessQuery {
    pub max_results: Option<u32>,
}

/// Manual trigger for one user's pipeline run.
pub async fn handler_process_inbox(
    State(state): State<ServerState>,
    Path(user_id): Path<i32>,
    Query(query): Query<ProcessQuery>,
) -> AppJsonResult<serde_json::Value> {
    let user = UserCtrl::get_with_account_access(&state.conn, user_id).await?;
    let max_results = query.max_results.unwrap_or(20).min(MAX_RESULTS_CEILING);

    let started = state
        .active_pipelines
        .clone()
        .spawn_run(state.clone(), user, max_results)
        .await?;

    Ok(Json(json!({
        "started": started,
        "message": if started { "Processing started" } else { "A run is already active" },
    })))
}
