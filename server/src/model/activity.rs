use chrono::Utc;

use crate::{db_core::prelude::*, error::AppResult};

pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

pub struct ActivityCtrl;

impl ActivityCtrl {
    pub async fn insert(
        conn: &DatabaseConnection,
        user_id: i32,
        kind: &str,
        stage: &str,
        status: &str,
        details: serde_json::Value,
    ) -> AppResult<activity::Model> {
        let now = Utc::now();
        let model = activity::ActiveModel {
            id: ActiveValue::NotSet,
            user_id: ActiveValue::Set(user_id),
            kind: ActiveValue::Set(kind.to_string()),
            stage: ActiveValue::Set(stage.to_string()),
            status: ActiveValue::Set(status.to_string()),
            details: ActiveValue::Set(details),
            created_at: ActiveValue::Set(now.into()),
            updated_at: ActiveValue::Set(now.into()),
        }
        .insert(conn)
        .await?;

        Ok(model)
    }

    pub async fn mark(
        conn: &DatabaseConnection,
        activity_id: i64,
        status: &str,
        details: serde_json::Value,
    ) -> AppResult<()> {
        Activity::update_many()
            .col_expr(activity::Column::Status, Expr::value(status))
            .col_expr(activity::Column::Details, Expr::value(details))
            .col_expr(activity::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(activity::Column::Id.eq(activity_id))
            .exec(conn)
            .await?;

        Ok(())
    }

    /// Recent entries, newest first. Late-joining UIs reconstruct state from
    /// this log.
    pub async fn recent(
        conn: &DatabaseConnection,
        user_id: i32,
        limit: u64,
    ) -> AppResult<Vec<activity::Model>> {
        let entries = Activity::find()
            .filter(activity::Column::UserId.eq(user_id))
            .order_by_desc(activity::Column::CreatedAt)
            .limit(limit)
            .all(conn)
            .await?;

        Ok(entries)
    }
}
