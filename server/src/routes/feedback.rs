use axum::{extract::State, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    classify::features::sender_key,
    db_core::prelude::*,
    error::{AppError, AppJsonResult},
    memory::AgentMemory,
    model::{
        activity::{ActivityCtrl, STATUS_COMPLETED},
        feedback::FeedbackCtrl,
        message::MessageCtrl,
    },
    ServerState,
};

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub user_id: i32,
    pub message_id: String,
    pub corrected_priority: Option<Priority>,
    pub corrected_purpose: Option<String>,
}

/// Records a user correction. The sender key is denormalized onto the row so
/// the feedback map never needs a join; a corrected priority also
/// reclassifies the stored message with a stamped timestamp.
pub async fn handler_submit_feedback(
    State(state): State<ServerState>,
    Json(body): Json<FeedbackRequest>,
) -> AppJsonResult<serde_json::Value> {
    if body.corrected_priority.is_none() && body.corrected_purpose.is_none() {
        return Err(AppError::BadRequest(
            "Feedback must correct a priority or a purpose".to_string(),
        ));
    }

    let message = MessageCtrl::get(&state.conn, body.user_id, &body.message_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?;

    let feedback = FeedbackCtrl::add(
        &state.conn,
        feedback::ActiveModel {
            id: ActiveValue::NotSet,
            message_id: ActiveValue::Set(body.message_id.clone()),
            user_id: ActiveValue::Set(body.user_id),
            original_priority: ActiveValue::Set(message.priority),
            corrected_priority: ActiveValue::Set(body.corrected_priority),
            original_purpose: ActiveValue::Set(message.purpose.clone()),
            corrected_purpose: ActiveValue::Set(body.corrected_purpose.clone()),
            sender_key: ActiveValue::Set(sender_key(&message.sender)),
            created_at: ActiveValue::Set(Utc::now().into()),
        },
    )
    .await?;

    if let Some(corrected) = body.corrected_priority {
        MessageCtrl::reclassify(
            &state.conn,
            body.user_id,
            &body.message_id,
            corrected,
            json!({
                "decision_method": "user_feedback",
                "feedback_id": feedback.id,
            }),
        )
        .await?;
    }
    if let Some(purpose) = body.corrected_purpose.as_deref() {
        MessageCtrl::update_purpose(&state.conn, body.user_id, &body.message_id, purpose).await?;
    }

    ActivityCtrl::insert(
        &state.conn,
        body.user_id,
        "feedback_recorded",
        "feedback",
        STATUS_COMPLETED,
        json!({
            "message_id": body.message_id,
            "sender_key": feedback.sender_key,
            "corrected_priority": body.corrected_priority,
        }),
    )
    .await?;

    AgentMemory::new(state.conn.clone(), body.user_id)
        .record_interaction("feedback")
        .await?;

    Ok(Json(json!({
        "feedback_id": feedback.id,
        "sender_key": feedback.sender_key,
    })))
}
