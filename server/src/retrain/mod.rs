use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    blob::BlobStore,
    classify::{features::EmailFeatures, PriorityModel, TrainingRow},
    error::AppResult,
    model::{feedback::FeedbackCtrl, message::MessageCtrl},
    realtime::AgentEvent,
    server_config::cfg,
    ServerState,
};

const RETRAIN_STATE_PATH: &str = "state/retrain_state.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrainState {
    pub last_feedback_count: u64,
    pub last_updated_utc: Option<String>,
}

async fn read_state(state: &ServerState) -> RetrainState {
    match state.blob_store.get_bytes(RETRAIN_STATE_PATH).await {
        Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Ok(None) => RetrainState::default(),
        Err(e) => {
            tracing::error!("Could not read retrain state: {:?}", e);
            RetrainState::default()
        }
    }
}

async fn write_state(state: &ServerState, retrain_state: &RetrainState) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec(retrain_state).context("Error serializing retrain state")?;
    state.blob_store.put_bytes(RETRAIN_STATE_PATH, &bytes).await
}

async fn broadcast_all(state: &ServerState, event: AgentEvent) {
    for user_id in state.broadcaster.connected_users() {
        state.broadcaster.emit(user_id, event.clone()).await;
    }
}

/// Scheduler entry point: retrain the classifier once enough new feedback
/// has accumulated since the last fit. State only advances after a
/// successful publish, so a failed attempt retries on the next tick.
pub async fn maybe_retrain(state: ServerState) -> AppResult<()> {
    if !cfg.retraining.enabled {
        return Ok(());
    }

    let feedback_count = FeedbackCtrl::total_count(&state.conn).await?;
    let retrain_state = read_state(&state).await;

    let delta = feedback_count.saturating_sub(retrain_state.last_feedback_count);
    if delta < cfg.retraining.trigger_feedback_count {
        tracing::debug!(
            "Retrain gate closed: {} new feedbacks (need {})",
            delta,
            cfg.retraining.trigger_feedback_count
        );
        return Ok(());
    }

    tracing::info!(
        "Retraining triggered: {} feedbacks, {} at last fit",
        feedback_count,
        retrain_state.last_feedback_count
    );
    broadcast_all(&state, AgentEvent::ml_training_started()).await;
    broadcast_all(
        &state,
        AgentEvent::ml_training_progress("data_build", "Assembling training set", Some(10)),
    )
    .await;

    let rows = build_training_rows(&state).await?;
    if rows.len() < cfg.ml_settings.min_training_samples {
        let message = format!(
            "Only {} usable samples (minimum {}), skipping retrain",
            rows.len(),
            cfg.ml_settings.min_training_samples
        );
        tracing::warn!("{message}");
        broadcast_all(&state, AgentEvent::ml_training_error(&message)).await;
        return Ok(());
    }

    broadcast_all(
        &state,
        AgentEvent::ml_training_progress("fit", "Fitting classifier", Some(50)),
    )
    .await;

    // Fitting is CPU-bound; keep it off the async executors.
    let sample_count = rows.len();
    let fitted = tokio::task::spawn_blocking(move || PriorityModel::train(&rows))
        .await
        .context("Training task panicked")?;

    let model = match fitted {
        Ok(model) => model,
        Err(e) => {
            tracing::error!("Classifier training failed: {:?}", e);
            broadcast_all(&state, AgentEvent::ml_training_error(&e.to_string())).await;
            return Ok(());
        }
    };

    broadcast_all(
        &state,
        AgentEvent::ml_training_progress("publish", "Publishing artifacts", Some(90)),
    )
    .await;

    if let Err(e) = state.model_store.publish(&state.blob_store, model).await {
        tracing::error!("Could not publish classifier artifacts: {:?}", e);
        broadcast_all(&state, AgentEvent::ml_training_error(&e.to_string())).await;
        return Ok(());
    }

    let new_state = RetrainState {
        last_feedback_count: feedback_count,
        last_updated_utc: Some(Utc::now().to_rfc3339()),
    };
    if let Err(e) = write_state(&state, &new_state).await {
        // The model is live but the gate did not advance; the next tick will
        // retrain again rather than lose the update.
        tracing::error!("Could not persist retrain state: {:?}", e);
        return Ok(());
    }

    broadcast_all(
        &state,
        AgentEvent::ml_training_complete(sample_count, feedback_count),
    )
    .await;
    tracing::info!("Retraining complete: {} samples", sample_count);

    Ok(())
}

/// Joins each latest-per-message correction with its stored message. Rows
/// whose message is missing are skipped, not fatal.
async fn build_training_rows(state: &ServerState) -> AppResult<Vec<TrainingRow>> {
    let feedbacks = FeedbackCtrl::latest_per_message_all(&state.conn).await?;

    let mut rows = Vec::with_capacity(feedbacks.len());
    for feedback in feedbacks {
        let Some(corrected) = feedback.corrected_priority else {
            continue;
        };

        let message =
            match MessageCtrl::get(&state.conn, feedback.user_id, &feedback.message_id).await? {
                Some(message) => message,
                None => {
                    tracing::debug!(
                        "Feedback references missing message {}; skipping row",
                        feedback.message_id
                    );
                    continue;
                }
            };

        rows.push(TrainingRow {
            features: EmailFeatures::new(
                &message.subject,
                &message.body_text,
                &message.sender,
                message.purpose.as_deref(),
                message.urgency,
            ),
            corrected_priority: corrected.as_str().to_string(),
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrain_state_roundtrip() {
        let state = RetrainState {
            last_feedback_count: 18,
            last_updated_utc: Some("2025-02-10T08:00:00+00:00".to_string()),
        };
        let bytes = serde_json::to_vec(&state).unwrap();
        let restored: RetrainState = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored.last_feedback_count, 18);
    }

    #[test]
    fn test_empty_state_defaults_to_zero() {
        let restored: RetrainState = serde_json::from_slice(b"{}").unwrap_or_default();
        assert_eq!(restored.last_feedback_count, 0);
        assert!(restored.last_updated_utc.is_none());
    }
}
