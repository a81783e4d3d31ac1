use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde_json::json;

use crate::{
    error::AppResult,
    model::user_profile::{Profile, UserProfileCtrl},
};

/// Per-user memory: preferences, autonomous state and interaction patterns,
/// all backed by the profile document and updated through partial merges.
pub struct AgentMemory {
    conn: DatabaseConnection,
    pub user_id: i32,
}

impl AgentMemory {
    pub fn new(conn: DatabaseConnection, user_id: i32) -> Self {
        Self { conn, user_id }
    }

    pub async fn profile(&self) -> AppResult<Profile> {
        UserProfileCtrl::get_or_create(&self.conn, self.user_id).await
    }

    pub async fn update_preferences(&self, updates: serde_json::Value) -> AppResult<Profile> {
        UserProfileCtrl::merge_update(&self.conn, self.user_id, updates).await
    }

    /// Bumps a named counter in `interaction_patterns` and stamps the last
    /// occurrence. Counters feed suggestion frequency heuristics.
    pub async fn record_interaction(&self, kind: &str) -> AppResult<()> {
        let profile = self.profile().await?;
        let count = profile
            .interaction_patterns
            .get(kind)
            .and_then(|v| v.get("count"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        UserProfileCtrl::merge_update(
            &self.conn,
            self.user_id,
            json!({
                "interaction_patterns": {
                    kind: {
                        "count": count + 1,
                        "last_at": Utc::now().to_rfc3339(),
                    }
                }
            }),
        )
        .await?;

        Ok(())
    }
}
