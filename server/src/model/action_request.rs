use chrono::Utc;
use uuid::Uuid;

use crate::{db_core::prelude::*, error::AppResult};

pub struct ActionRequestCtrl;

impl ActionRequestCtrl {
    pub async fn enqueue(
        conn: &DatabaseConnection,
        user_id: i32,
        action: ActionKind,
        message_id: Option<String>,
        params: serde_json::Value,
    ) -> AppResult<action_request::Model> {
        let model = action_request::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            user_id: ActiveValue::Set(user_id),
            message_id: ActiveValue::Set(message_id),
            action: ActiveValue::Set(action),
            params: ActiveValue::Set(params),
            status: ActiveValue::Set(ActionStatus::Pending),
            result_message: ActiveValue::Set(None),
            attempts: ActiveValue::Set(0),
            requested_at: ActiveValue::Set(Utc::now().into()),
            processed_at: ActiveValue::Set(None),
        }
        .insert(conn)
        .await?;

        Ok(model)
    }

    pub async fn pending(
        conn: &DatabaseConnection,
        limit: u64,
    ) -> AppResult<Vec<action_request::Model>> {
        let requests = ActionRequest::find()
            .filter(action_request::Column::Status.eq(ActionStatus::Pending))
            .order_by_asc(action_request::Column::RequestedAt)
            .limit(limit)
            .all(conn)
            .await?;

        Ok(requests)
    }

    /// Terminal transition, compare-and-set on `pending`. Returns false when
    /// another worker already finished the request.
    pub async fn finish(
        conn: &DatabaseConnection,
        request_id: &str,
        status: ActionStatus,
        result_message: &str,
        attempts: i32,
    ) -> AppResult<bool> {
        debug_assert!(status != ActionStatus::Pending);

        let result = ActionRequest::update_many()
            .col_expr(
                action_request::Column::Status,
                Expr::value(status.to_string()),
            )
            .col_expr(
                action_request::Column::ResultMessage,
                Expr::value(result_message),
            )
            .col_expr(action_request::Column::Attempts, Expr::value(attempts))
            .col_expr(
                action_request::Column::ProcessedAt,
                Expr::value(Utc::now()),
            )
            .filter(action_request::Column::Id.eq(request_id))
            .filter(action_request::Column::Status.eq(ActionStatus::Pending))
            .exec(conn)
            .await?;

        Ok(result.rows_affected == 1)
    }

    pub async fn get(
        conn: &DatabaseConnection,
        request_id: &str,
    ) -> AppResult<Option<action_request::Model>> {
        let request = ActionRequest::find_by_id(request_id).one(conn).await?;

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    use super::*;

    #[tokio::test]
    async fn test_finish_cas_hits_pending_row() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let done = ActionRequestCtrl::finish(&db, "req-1", ActionStatus::Completed, "ok", 1)
            .await
            .unwrap();
        assert!(done);

        let log = db.into_transaction_log();
        let statement = format!("{:?}", log[0]);
        assert!(statement.contains("UPDATE \"action_request\""));
        // The CAS guard filters on the pending status.
        assert!(statement.contains("pending"));
    }

    #[tokio::test]
    async fn test_finish_cas_misses_taken_row() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();

        let done = ActionRequestCtrl::finish(&db, "req-1", ActionStatus::Failed, "boom", 3)
            .await
            .unwrap();
        assert!(!done);
    }
}
