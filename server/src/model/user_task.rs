use chrono::Utc;

use crate::{db_core::prelude::*, error::AppResult};

pub const TASK_FOLLOW_UP: &str = "follow_up_needed";
pub const TASK_ACTION_ITEM: &str = "action_item";

pub const CREATED_AUTONOMOUS: &str = "autonomous";

pub struct UserTaskCtrl;

impl UserTaskCtrl {
    /// Inserts unless a task of the same type already references the message.
    /// Keeps scheduled re-runs from piling up duplicate follow-ups.
    pub async fn insert_if_absent(
        conn: &DatabaseConnection,
        user_id: i32,
        task_type: &str,
        description: &str,
        deadline: Option<String>,
        stakeholders: Vec<String>,
        related_message_id: Option<String>,
        creation_method: &str,
    ) -> AppResult<Option<user_task::Model>> {
        if let Some(message_id) = related_message_id.as_deref() {
            let existing = UserTask::find()
                .filter(user_task::Column::UserId.eq(user_id))
                .filter(user_task::Column::TaskType.eq(task_type))
                .filter(user_task::Column::RelatedMessageId.eq(message_id))
                .count(conn)
                .await?;
            if existing > 0 {
                return Ok(None);
            }
        }

        let model = user_task::ActiveModel {
            id: ActiveValue::NotSet,
            user_id: ActiveValue::Set(user_id),
            task_type: ActiveValue::Set(task_type.to_string()),
            task_description: ActiveValue::Set(description.to_string()),
            deadline: ActiveValue::Set(deadline),
            stakeholders: ActiveValue::Set(serde_json::json!(stakeholders)),
            related_message_id: ActiveValue::Set(related_message_id),
            creation_method: ActiveValue::Set(creation_method.to_string()),
            status: ActiveValue::Set("open".to_string()),
            created_at: ActiveValue::Set(Utc::now().into()),
        }
        .insert(conn)
        .await?;

        Ok(Some(model))
    }

    pub async fn open_tasks(
        conn: &DatabaseConnection,
        user_id: i32,
        limit: u64,
    ) -> AppResult<Vec<user_task::Model>> {
        let tasks = UserTask::find()
            .filter(user_task::Column::UserId.eq(user_id))
            .filter(user_task::Column::Status.eq("open"))
            .order_by_desc(user_task::Column::CreatedAt)
            .limit(limit)
            .all(conn)
            .await?;

        Ok(tasks)
    }
}
