use std::collections::HashMap;

use crate::{db_core::prelude::*, error::AppResult};

/// Latest correction per sender key, consumed by the reasoning engine.
pub type FeedbackMap = HashMap<String, Priority>;

pub struct FeedbackCtrl;

impl FeedbackCtrl {
    pub async fn add(
        conn: &DatabaseConnection,
        active_model: feedback::ActiveModel,
    ) -> AppResult<feedback::Model> {
        let model = active_model.insert(conn).await?;

        Ok(model)
    }

    pub async fn count(conn: &DatabaseConnection, user_id: i32) -> AppResult<u64> {
        let count = Feedback::find()
            .filter(feedback::Column::UserId.eq(user_id))
            .count(conn)
            .await?;

        Ok(count)
    }

    /// Corpus-wide feedback volume; drives the retraining trigger.
    pub async fn total_count(conn: &DatabaseConnection) -> AppResult<u64> {
        let count = Feedback::find().count(conn).await?;

        Ok(count)
    }

    /// Newest correction per message across every user, for training-set
    /// assembly.
    pub async fn latest_per_message_all(
        conn: &DatabaseConnection,
    ) -> AppResult<Vec<feedback::Model>> {
        let rows = Feedback::find()
            .order_by_desc(feedback::Column::CreatedAt)
            .order_by_desc(feedback::Column::Id)
            .all(conn)
            .await?;

        let mut seen = std::collections::HashSet::new();
        let mut latest = Vec::new();
        for row in rows {
            if !seen.insert((row.user_id, row.message_id.clone())) {
                continue;
            }
            if row.corrected_priority.is_some() {
                latest.push(row);
            }
        }

        Ok(latest)
    }

    /// Newest-first scan; the first row with a corrected priority wins per
    /// sender key. Rebuilding from the same snapshot twice yields the same map.
    pub async fn feedback_map(conn: &DatabaseConnection, user_id: i32) -> AppResult<FeedbackMap> {
        let rows = Feedback::find()
            .filter(feedback::Column::UserId.eq(user_id))
            .order_by_desc(feedback::Column::CreatedAt)
            .order_by_desc(feedback::Column::Id)
            .all(conn)
            .await?;

        Ok(build_feedback_map(&rows))
    }

}

pub fn build_feedback_map(rows: &[feedback::Model]) -> FeedbackMap {
    let mut map = FeedbackMap::new();
    for row in rows {
        let Some(corrected) = row.corrected_priority else {
            continue;
        };
        map.entry(row.sender_key.clone()).or_insert(corrected);
    }
    map
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn feedback_row(
        id: i32,
        message_id: &str,
        sender_key: &str,
        corrected: Option<Priority>,
        ts: i64,
    ) -> feedback::Model {
        feedback::Model {
            id,
            message_id: message_id.to_string(),
            user_id: 1,
            original_priority: Some(Priority::Medium),
            corrected_priority: corrected,
            original_purpose: None,
            corrected_purpose: None,
            sender_key: sender_key.to_string(),
            created_at: Utc.timestamp_opt(ts, 0).unwrap().into(),
        }
    }

    #[test]
    fn test_latest_correction_wins_per_sender() {
        // Rows arrive newest-first, as the query orders them.
        let rows = vec![
            feedback_row(3, "m3", "boss@acme.com", Some(Priority::High), 300),
            feedback_row(2, "m2", "boss@acme.com", Some(Priority::Low), 200),
            feedback_row(1, "m1", "news@list.com", Some(Priority::Low), 100),
        ];

        let map = build_feedback_map(&rows);
        assert_eq!(map.get("boss@acme.com"), Some(&Priority::High));
        assert_eq!(map.get("news@list.com"), Some(&Priority::Low));
    }

    #[test]
    fn test_null_corrections_are_skipped() {
        // The newest row has no corrected priority; the older one drives the map.
        let rows = vec![
            feedback_row(2, "m2", "boss@acme.com", None, 200),
            feedback_row(1, "m1", "boss@acme.com", Some(Priority::Critical), 100),
        ];

        let map = build_feedback_map(&rows);
        assert_eq!(map.get("boss@acme.com"), Some(&Priority::Critical));
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let rows = vec![
            feedback_row(2, "m2", "a@x.com", Some(Priority::High), 200),
            feedback_row(1, "m1", "b@y.com", Some(Priority::Low), 100),
        ];

        assert_eq!(build_feedback_map(&rows), build_feedback_map(&rows));
    }
}
