use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::json;

use crate::{error::AppJsonResult, memory::AgentMemory, ServerState};

#[derive(Debug, Deserialize)]
pub struct ProfileUpdateRequest {
    pub user_id: i32,
    pub updates: serde_json::Value,
}

/// Partial-merge update of the user's preferences; whole-document overwrites
/// are not offered.
pub async fn handler_update_profile(
    State(state): State<ServerState>,
    Json(body): Json<ProfileUpdateRequest>,
) -> AppJsonResult<serde_json::Value> {
    let memory = AgentMemory::new(state.conn.clone(), body.user_id);
    let profile = memory.update_preferences(body.updates).await?;
    memory.record_interaction("profile_update").await?;

    Ok(Json(json!({
        "user_id": profile.user_id,
        "agent_preferences": profile.agent_preferences,
        "email_preferences": profile.email_preferences,
    })))
}
