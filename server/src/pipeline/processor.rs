use std::sync::{
    atomic::{AtomicBool, AtomicI64, Ordering::Relaxed},
    Arc,
};

use chrono::Utc;
use derive_more::Display;
use serde::Serialize;
use serde_json::json;

use crate::{
    analysis::{
        analyze_email, suggest_actions, summarize_email, EmailAnalysis, Suggestion, SummaryType,
    },
    classify::{features::sender_key, ModelStore},
    db_core::prelude::*,
    error::{AppError, AppResult},
    llm::LlmHandle,
    mail::{access_token_for, GmailClient, ParsedEmail},
    model::{
        activity::{ActivityCtrl, STATUS_COMPLETED},
        feedback::{FeedbackCtrl, FeedbackMap},
        message::MessageCtrl,
        user::UserWithAccountAccess,
        user_profile::{Profile, UserProfileCtrl},
        user_task::{UserTaskCtrl, CREATED_AUTONOMOUS, TASK_ACTION_ITEM},
    },
    reasoning::{purpose_matches, AutonomyAction, ClassificationResult, ReasoningEngine},
    realtime::{AgentEvent, Broadcaster},
    server_config::cfg,
    ServerState,
};

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[display("processed:{processed} skipped:{skipped} failed:{failed}")]
pub struct RunReport {
    pub processed: i64,
    pub skipped: i64,
    pub failed: i64,
}

enum MessageOutcome {
    Processed,
    Skipped,
}

// Processes unread messages for a single user.
pub struct EmailPipeline {
    pub user_id: i32,
    pub email_address: String,
    conn: DatabaseConnection,
    mail: GmailClient,
    llm: LlmHandle,
    broadcaster: Broadcaster,
    model_store: ModelStore,
    cancelled: Arc<AtomicBool>,
    processed_count: Arc<AtomicI64>,
    skipped_count: Arc<AtomicI64>,
    failed_count: Arc<AtomicI64>,
}

impl EmailPipeline {
    pub async fn new(state: &ServerState, user: UserWithAccountAccess) -> AppResult<Self> {
        let access_token = access_token_for(&state.conn, &state.http_client, &user).await?;
        let mail = GmailClient::new(state.http_client.clone(), access_token);

        tracing::info!("Email pipeline created for {}", user.email);

        Ok(EmailPipeline {
            user_id: user.id,
            email_address: user.email,
            conn: state.conn.clone(),
            mail,
            llm: state.llm.clone(),
            broadcaster: state.broadcaster.clone(),
            model_store: state.model_store.clone(),
            cancelled: Arc::new(AtomicBool::new(false)),
            processed_count: Arc::new(AtomicI64::new(0)),
            skipped_count: Arc::new(AtomicI64::new(0)),
            failed_count: Arc::new(AtomicI64::new(0)),
        })
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Relaxed)
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            processed: self.processed_count.load(Relaxed),
            skipped: self.skipped_count.load(Relaxed),
            failed: self.failed_count.load(Relaxed),
        }
    }

    /// One triage run: list unread ids, then handle each sequentially so the
    /// feedback map and the idempotency check never race within a user.
    pub async fn process_inbox(&self, max_results: u32) -> AppResult<RunReport> {
        tracing::info!("Starting inbox run for {}", self.email_address);

        let metas = self
            .mail
            .list_messages(&["INBOX", "UNREAD"], None, max_results)
            .await?;

        // Rebuilt once per run; never mutated while the run is in flight.
        let feedback_map = FeedbackCtrl::feedback_map(&self.conn, self.user_id).await?;
        let profile = UserProfileCtrl::get_or_create(&self.conn, self.user_id).await?;
        let model = self.model_store.current();

        for meta in metas {
            // Cancellation aborts between messages, never mid-persist.
            if self.is_cancelled() {
                break;
            }

            if MessageCtrl::is_processed(&self.conn, self.user_id, &meta.id).await? {
                self.skipped_count.fetch_add(1, Relaxed);
                continue;
            }

            match self
                .process_message(&meta.id, &feedback_map, &profile, model.as_deref())
                .await
            {
                Ok(MessageOutcome::Processed) => {
                    self.processed_count.fetch_add(1, Relaxed);
                }
                Ok(MessageOutcome::Skipped) => {
                    self.skipped_count.fetch_add(1, Relaxed);
                }
                Err(e) => {
                    tracing::error!("Error processing message {}: {:?}", meta.id, e);
                    self.failed_count.fetch_add(1, Relaxed);
                    if matches!(e, AppError::ReAuthRequired(_)) {
                        return Err(e);
                    }
                }
            }
        }

        crate::model::user::UserCtrl::update_last_sync(&self.conn, self.user_id)
            .await
            .unwrap_or_else(|e| tracing::error!("Error updating last sync: {:?}", e));

        let report = self.report();
        tracing::info!("Inbox run for {} finished: {}", self.email_address, report);

        Ok(report)
    }

    async fn process_message(
        &self,
        message_id: &str,
        feedback_map: &FeedbackMap,
        profile: &Profile,
        model: Option<&crate::classify::PriorityModel>,
    ) -> AppResult<MessageOutcome> {
        let email = self.mail.get_parsed_message(message_id).await?;

        self.broadcaster
            .emit(self.user_id, AgentEvent::email_processing_started(&email))
            .await;

        // A feedback hit decides the priority outright; the LLM is not
        // consulted for senders the user has already corrected.
        let has_feedback = feedback_map.contains_key(&sender_key(&email.sender));
        let analysis = if has_feedback || !cfg.reasoning.hybrid_llm {
            None
        } else {
            analyze_email(self.llm.as_ref(), &email).await
        };

        let classification = ReasoningEngine::new(
            feedback_map,
            &profile.email_preferences.important_senders,
            model,
        )
        .classify(
            &email.sender,
            &email.subject,
            &email.body_text,
            analysis.as_ref(),
        );

        self.broadcaster
            .emit(
                self.user_id,
                AgentEvent::classification_complete(&email.id, &classification),
            )
            .await;

        let summary = self.maybe_summarize(&email, &classification, analysis.as_ref()).await;

        if let Some(analysis) = analysis.as_ref() {
            self.broadcaster
                .emit(
                    self.user_id,
                    AgentEvent::llm_analysis_complete(
                        &email.id,
                        analysis,
                        Some(classification.priority),
                        classification.confidence,
                        summary.as_ref().map(|(text, _)| text.as_str()),
                    ),
                )
                .await;
        }

        let suggestions = self.generate_suggestions(&email, &classification, analysis.as_ref()).await;

        if profile.agent_preferences.allow_auto_categorization {
            self.maybe_enqueue_labels(&email, &classification, analysis.as_ref())
                .await;
        }

        self.maybe_auto_archive(&email, &classification, analysis.as_ref(), profile)
            .await;

        if cfg.autonomous_tasks.task_extraction.enabled
            && profile.agent_preferences.autonomous_mode_enabled
        {
            self.extract_tasks_for(&email).await;
        }

        let inserted = self
            .persist(&email, &classification, analysis.as_ref(), &summary, &suggestions)
            .await?;
        if !inserted {
            // Another run won the create-if-absent race.
            return Ok(MessageOutcome::Skipped);
        }

        if let Err(e) = ActivityCtrl::insert(
            &self.conn,
            self.user_id,
            "email_processed",
            "persist",
            STATUS_COMPLETED,
            json!({
                "email_id": email.id,
                "priority": classification.priority.as_str(),
                "decision_method": classification.decision_method,
            }),
        )
        .await
        {
            tracing::error!("Error writing persist activity: {:?}", e);
        }

        Ok(MessageOutcome::Processed)
    }

    /// Step 6: only CRITICAL/HIGH messages earn a summary; action requests
    /// get the action-focused variant.
    async fn maybe_summarize(
        &self,
        email: &ParsedEmail,
        classification: &ClassificationResult,
        analysis: Option<&EmailAnalysis>,
    ) -> Option<(String, SummaryType)> {
        if !matches!(classification.priority, Priority::Critical | Priority::High) {
            return None;
        }

        let summary_type = match analysis {
            Some(a) if purpose_matches(&a.purpose, &["action_request"]) => {
                SummaryType::ActionFocused
            }
            _ => SummaryType::Standard,
        };

        let text = summarize_email(self.llm.as_ref(), email, summary_type).await;
        Some((text, summary_type))
    }

    async fn generate_suggestions(
        &self,
        email: &ParsedEmail,
        classification: &ClassificationResult,
        analysis: Option<&EmailAnalysis>,
    ) -> Vec<Suggestion> {
        let suggestions = suggest_actions(
            self.llm.as_ref(),
            email,
            classification.priority,
            analysis,
        )
        .await;

        for suggestion in &suggestions {
            self.broadcaster
                .emit(
                    self.user_id,
                    AgentEvent::suggestion_generated(&email.id, suggestion),
                )
                .await;
        }

        suggestions
    }

    /// Step 8: queue Priority/<P> and Purpose/<purpose> labels through the
    /// action queue rather than touching the provider inline.
    async fn maybe_enqueue_labels(
        &self,
        email: &ParsedEmail,
        classification: &ClassificationResult,
        analysis: Option<&EmailAnalysis>,
    ) {
        if !classification.authorizes(
            AutonomyAction::Label,
            &cfg.reasoning.confidence_thresholds,
        ) {
            return;
        }

        let mut labels = vec![format!("Priority/{}", classification.priority)];
        if let Some(analysis) = analysis {
            labels.push(format!("Purpose/{}", sanitize_label(&analysis.purpose)));
        }

        match crate::model::action_request::ActionRequestCtrl::enqueue(
            &self.conn,
            self.user_id,
            ActionKind::ApplyLabel,
            Some(email.id.clone()),
            json!({ "labels": labels }),
        )
        .await
        {
            Ok(request) => {
                self.broadcaster
                    .emit(self.user_id, AgentEvent::action_queued(&request))
                    .await;
            }
            Err(e) => tracing::error!("Error enqueueing label action: {:?}", e),
        }
    }

    /// Step 9: high-confidence low-value mail gets an archive request. The
    /// worker performs the provider call, flags the stored record and emits
    /// the executed event.
    async fn maybe_auto_archive(
        &self,
        email: &ParsedEmail,
        classification: &ClassificationResult,
        analysis: Option<&EmailAnalysis>,
        profile: &Profile,
    ) {
        let task_cfg = &cfg.autonomous_tasks.auto_archive;
        if !task_cfg.enabled || !profile.agent_preferences.allow_auto_archiving {
            return;
        }
        if email.is_archived {
            return;
        }

        let purpose_ok = analysis
            .map(|a| {
                task_cfg
                    .purposes_to_archive
                    .iter()
                    .any(|p| purpose_matches(&a.purpose, &[p.as_str()]))
            })
            .unwrap_or(false);
        let priority_ok = matches!(classification.priority, Priority::Low | Priority::Medium);
        if !purpose_ok || !priority_ok || classification.confidence < task_cfg.confidence_threshold
        {
            return;
        }

        match crate::model::action_request::ActionRequestCtrl::enqueue(
            &self.conn,
            self.user_id,
            ActionKind::Archive,
            Some(email.id.clone()),
            json!({
                "reason": format!(
                    "auto-archive: {} at confidence {:.2}",
                    analysis.map(|a| a.purpose.as_str()).unwrap_or("unknown"),
                    classification.confidence
                ),
            }),
        )
        .await
        {
            Ok(request) => {
                self.broadcaster
                    .emit(self.user_id, AgentEvent::action_queued(&request))
                    .await;
            }
            Err(e) => tracing::error!("Error enqueueing auto-archive: {:?}", e),
        }
    }

    /// Step 10: persist extracted tasks; failures never block the record.
    async fn extract_tasks_for(&self, email: &ParsedEmail) {
        let tasks = crate::analysis::extract_tasks(
            self.llm.as_ref(),
            email,
            cfg.autonomous_tasks.task_extraction.max_per_message,
        )
        .await;

        for task in tasks {
            match UserTaskCtrl::insert_if_absent(
                &self.conn,
                self.user_id,
                TASK_ACTION_ITEM,
                &task.task_description,
                task.deadline.clone(),
                task.stakeholders.clone(),
                Some(email.id.clone()),
                CREATED_AUTONOMOUS,
            )
            .await
            {
                Ok(Some(_)) => {
                    self.broadcaster
                        .emit(
                            self.user_id,
                            AgentEvent::autonomous_action_executed(
                                &email.id,
                                "task_created",
                                &task.task_description,
                            ),
                        )
                        .await;
                }
                Ok(None) => {}
                Err(e) => tracing::error!("Error persisting extracted task: {:?}", e),
            }
        }
    }

    /// Step 11: the one terminal persist for this message id.
    async fn persist(
        &self,
        email: &ParsedEmail,
        classification: &ClassificationResult,
        analysis: Option<&EmailAnalysis>,
        summary: &Option<(String, SummaryType)>,
        suggestions: &[Suggestion],
    ) -> AppResult<bool> {
        let model = message::ActiveModel {
            id: ActiveValue::Set(email.id.clone()),
            user_id: ActiveValue::Set(self.user_id),
            thread_id: ActiveValue::Set(email.thread_id.clone()),
            sender: ActiveValue::Set(email.sender.clone()),
            subject: ActiveValue::Set(email.subject.clone()),
            received_at: ActiveValue::Set(email.received_at.map(Into::into)),
            body_text: ActiveValue::Set(email.body_text.clone()),
            body_html: ActiveValue::Set(email.body_html.clone()),
            snippet: ActiveValue::Set(email.snippet.clone()),
            labels: ActiveValue::Set(json!(email.labels)),
            is_read: ActiveValue::Set(email.is_read),
            is_starred: ActiveValue::Set(email.is_starred),
            is_archived: ActiveValue::Set(email.is_archived),
            priority: ActiveValue::Set(Some(classification.priority)),
            purpose: ActiveValue::Set(analysis.map(|a| a.purpose.clone())),
            urgency: ActiveValue::Set(analysis.map(|a| a.urgency_score)),
            response_needed: ActiveValue::Set(analysis.map(|a| a.response_needed)),
            estimated_minutes: ActiveValue::Set(analysis.map(|a| a.estimated_time)),
            summary: ActiveValue::Set(summary.as_ref().map(|(text, _)| text.clone())),
            summary_type: ActiveValue::Set(
                summary.as_ref().map(|(_, summary_type)| summary_type.to_string()),
            ),
            reasoning: ActiveValue::Set(Some(classification.to_record())),
            suggestions: ActiveValue::Set(serde_json::to_value(suggestions).unwrap_or_default()),
            meeting_processed: ActiveValue::Set(false),
            reclassified_at: ActiveValue::Set(None),
            processed_at: ActiveValue::Set(Utc::now().into()),
        };

        MessageCtrl::insert_if_absent(&self.conn, model).await
    }
}

/// Label-safe rendering of a purpose value.
fn sanitize_label(purpose: &str) -> String {
    purpose
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("action required"), "action_required");
        assert_eq!(sanitize_label("forum_digest"), "forum_digest");
        assert_eq!(sanitize_label(" promo/offer "), "promo_offer");
    }
}
