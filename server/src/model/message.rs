use chrono::Utc;
use num_traits::FromPrimitive;

use crate::{
    db_core::prelude::*,
    error::{extract_database_error_code, AppResult, DatabaseErrorCode},
};

pub struct MessageCtrl;

impl MessageCtrl {
    pub async fn is_processed(
        conn: &DatabaseConnection,
        user_id: i32,
        message_id: &str,
    ) -> AppResult<bool> {
        let count = Message::find()
            .filter(message::Column::UserId.eq(user_id))
            .filter(message::Column::Id.eq(message_id))
            .count(conn)
            .await?;

        Ok(count > 0)
    }

    /// Create-if-absent. Returns false when another run already persisted
    /// this message id for the user; the caller must treat that as a skip.
    pub async fn insert_if_absent(
        conn: &DatabaseConnection,
        active_model: message::ActiveModel,
    ) -> AppResult<bool> {
        let result = Message::insert(active_model)
            .on_conflict(
                OnConflict::columns([message::Column::Id, message::Column::UserId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec(conn)
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(DbErr::RecordNotInserted) => Ok(false),
            Err(e) => match extract_database_error_code(&e) {
                Some(code)
                    if DatabaseErrorCode::from_u32(code)
                        .map_or(false, |c| c == DatabaseErrorCode::UniqueViolation) =>
                {
                    Ok(false)
                }
                _ => Err(e.into()),
            },
        }
    }

    pub async fn get(
        conn: &DatabaseConnection,
        user_id: i32,
        message_id: &str,
    ) -> AppResult<Option<message::Model>> {
        let msg = Message::find()
            .filter(message::Column::UserId.eq(user_id))
            .filter(message::Column::Id.eq(message_id))
            .one(conn)
            .await?;

        Ok(msg)
    }

    pub async fn set_archived(
        conn: &DatabaseConnection,
        user_id: i32,
        message_id: &str,
        is_archived: bool,
    ) -> AppResult<()> {
        Message::update_many()
            .col_expr(message::Column::IsArchived, Expr::value(is_archived))
            .filter(message::Column::UserId.eq(user_id))
            .filter(message::Column::Id.eq(message_id))
            .exec(conn)
            .await?;

        Ok(())
    }

    pub async fn set_meeting_processed(
        conn: &DatabaseConnection,
        user_id: i32,
        message_id: &str,
    ) -> AppResult<()> {
        Message::update_many()
            .col_expr(message::Column::MeetingProcessed, Expr::value(true))
            .filter(message::Column::UserId.eq(user_id))
            .filter(message::Column::Id.eq(message_id))
            .exec(conn)
            .await?;

        Ok(())
    }

    /// Explicit reclassification: priority changes are always stamped.
    pub async fn reclassify(
        conn: &DatabaseConnection,
        user_id: i32,
        message_id: &str,
        priority: Priority,
        reasoning: serde_json::Value,
    ) -> AppResult<()> {
        Message::update_many()
            .col_expr(message::Column::Priority, Expr::value(priority.as_str()))
            .col_expr(message::Column::Reasoning, Expr::value(reasoning))
            .col_expr(
                message::Column::ReclassifiedAt,
                Expr::value(Utc::now()),
            )
            .filter(message::Column::UserId.eq(user_id))
            .filter(message::Column::Id.eq(message_id))
            .exec(conn)
            .await?;

        Ok(())
    }

    pub async fn update_purpose(
        conn: &DatabaseConnection,
        user_id: i32,
        message_id: &str,
        purpose: &str,
    ) -> AppResult<()> {
        Message::update_many()
            .col_expr(message::Column::Purpose, Expr::value(purpose))
            .filter(message::Column::UserId.eq(user_id))
            .filter(message::Column::Id.eq(message_id))
            .exec(conn)
            .await?;

        Ok(())
    }

    /// Old, still-in-inbox messages that qualify for autonomous archiving:
    /// LOW priority or an archivable purpose, observed before the cutoff.
    pub async fn archive_candidates(
        conn: &DatabaseConnection,
        user_id: i32,
        cutoff: chrono::DateTime<Utc>,
        purposes: &[String],
        limit: u64,
    ) -> AppResult<Vec<message::Model>> {
        let msgs = Message::find()
            .filter(message::Column::UserId.eq(user_id))
            .filter(message::Column::IsArchived.eq(false))
            .filter(message::Column::ProcessedAt.lt(cutoff))
            .filter(
                Condition::any()
                    .add(message::Column::Priority.eq(Priority::Low.as_str()))
                    .add(message::Column::Purpose.is_in(purposes.iter().cloned())),
            )
            .order_by_asc(message::Column::ProcessedAt)
            .limit(limit)
            .all(conn)
            .await?;

        Ok(msgs)
    }

    pub async fn unknown_purpose(
        conn: &DatabaseConnection,
        user_id: i32,
        limit: u64,
    ) -> AppResult<Vec<message::Model>> {
        let msgs = Message::find()
            .filter(message::Column::UserId.eq(user_id))
            .filter(
                Condition::any()
                    .add(message::Column::Purpose.is_null())
                    .add(message::Column::Purpose.eq("Unknown")),
            )
            .order_by_desc(message::Column::ProcessedAt)
            .limit(limit)
            .all(conn)
            .await?;

        Ok(msgs)
    }

    pub async fn high_priority_since(
        conn: &DatabaseConnection,
        user_id: i32,
        since: chrono::DateTime<Utc>,
    ) -> AppResult<Vec<message::Model>> {
        let msgs = Message::find()
            .filter(message::Column::UserId.eq(user_id))
            .filter(
                message::Column::Priority
                    .is_in([Priority::Critical.as_str(), Priority::High.as_str()]),
            )
            .filter(message::Column::ProcessedAt.gt(since))
            .order_by_desc(message::Column::ProcessedAt)
            .all(conn)
            .await?;

        Ok(msgs)
    }

    /// High-priority meeting-flavoured messages that meeting-prep has not
    /// visited yet.
    pub async fn meeting_candidates(
        conn: &DatabaseConnection,
        user_id: i32,
        purposes: &[&str],
        limit: u64,
    ) -> AppResult<Vec<message::Model>> {
        let msgs = Message::find()
            .filter(message::Column::UserId.eq(user_id))
            .filter(message::Column::MeetingProcessed.eq(false))
            .filter(
                message::Column::Priority
                    .is_in([Priority::Critical.as_str(), Priority::High.as_str()]),
            )
            .filter(message::Column::Purpose.is_in(purposes.iter().copied()))
            .order_by_desc(message::Column::ProcessedAt)
            .limit(limit)
            .all(conn)
            .await?;

        Ok(msgs)
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::DbBackend;

    use super::*;

    #[test]
    fn test_archive_candidates_query_shape() {
        let cutoff = chrono::DateTime::parse_from_rfc3339("2025-02-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let query = Message::find()
            .filter(message::Column::UserId.eq(7))
            .filter(message::Column::IsArchived.eq(false))
            .filter(message::Column::ProcessedAt.lt(cutoff))
            .filter(
                Condition::any()
                    .add(message::Column::Priority.eq(Priority::Low.as_str()))
                    .add(message::Column::Purpose.is_in(["promotion"])),
            )
            .build(DbBackend::Postgres)
            .to_string();

        assert!(query.contains("\"message\".\"is_archived\" = FALSE"));
        assert!(query.contains("\"message\".\"priority\" = 'LOW' OR"));
    }
}
