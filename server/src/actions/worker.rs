use anyhow::Context;
use lettre::message::header::ContentType;
use lib_utils::b64::b64u_encode;

use crate::{
    db_core::prelude::*,
    error::{AppError, AppResult},
    mail::{access_token_for, GmailClient, MailPort},
    model::{
        action_request::ActionRequestCtrl, message::MessageCtrl, user::UserCtrl,
    },
    realtime::AgentEvent,
    retry::{is_retryable, BACKOFF_SCHEDULE},
    ServerState,
};

use super::{ApplyLabelParams, SendDraftParams};

/// Requests claimed per tick.
const CLAIM_BATCH: u64 = 25;

/// Drains pending action requests: execute against the provider, then close
/// each request with a compare-and-set so a racing worker cannot double-
/// report. Called from its own scheduler job.
pub async fn drain_pending_actions(state: ServerState) -> AppResult<()> {
    let requests = ActionRequestCtrl::pending(&state.conn, CLAIM_BATCH).await?;
    if requests.is_empty() {
        return Ok(());
    }

    tracing::info!("Action worker claimed {} pending requests", requests.len());

    for request in requests {
        let user = match UserCtrl::get_with_account_access(&state.conn, request.user_id).await {
            Ok(user) => user,
            Err(e) => {
                tracing::error!(
                    "No account access for user {} on request {}: {:?}",
                    request.user_id,
                    request.id,
                    e
                );
                ActionRequestCtrl::finish(
                    &state.conn,
                    &request.id,
                    ActionStatus::Failed,
                    "Mail account is not connected",
                    1,
                )
                .await?;
                continue;
            }
        };

        let access_token = match access_token_for(&state.conn, &state.http_client, &user).await {
            Ok(token) => token,
            Err(e) => {
                ActionRequestCtrl::finish(
                    &state.conn,
                    &request.id,
                    ActionStatus::Failed,
                    &friendly_error(&request.action, &e),
                    1,
                )
                .await?;
                continue;
            }
        };

        let mail = GmailClient::new(state.http_client.clone(), access_token);
        run_one(&state, &mail, &user.email, request).await;
    }

    Ok(())
}

/// Executes a single request with the transient-retry schedule. Client
/// errors fail on the first attempt.
pub async fn run_one(
    state: &ServerState,
    mail: &dyn MailPort,
    user_email: &str,
    request: action_request::Model,
) {
    let mut attempts = 0;
    let mut schedule = BACKOFF_SCHEDULE.iter();

    loop {
        attempts += 1;
        match execute_action(mail, user_email, &request).await {
            Ok(result_message) => {
                if request.action == ActionKind::Archive {
                    if let Some(message_id) = request.message_id.as_deref() {
                        MessageCtrl::set_archived(&state.conn, request.user_id, message_id, true)
                            .await
                            .unwrap_or_else(|e| {
                                tracing::error!("Error flagging archived message: {:?}", e)
                            });
                    }
                }

                match ActionRequestCtrl::finish(
                    &state.conn,
                    &request.id,
                    ActionStatus::Completed,
                    &result_message,
                    attempts,
                )
                .await
                {
                    Ok(true) => {
                        state
                            .broadcaster
                            .emit(
                                request.user_id,
                                AgentEvent::autonomous_action_executed(
                                    request.message_id.as_deref().unwrap_or_default(),
                                    request.action.as_str(),
                                    &result_message,
                                ),
                            )
                            .await;
                    }
                    Ok(false) => {
                        tracing::warn!("Request {} was closed by another worker", request.id);
                    }
                    Err(e) => tracing::error!("Error closing request {}: {:?}", request.id, e),
                }
                return;
            }
            Err(e) if is_retryable(&e) => {
                if let Some(delay) = schedule.next() {
                    tracing::warn!(
                        "Action {} attempt {} failed, retrying in {:?}: {:?}",
                        request.id,
                        attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(*delay).await;
                    continue;
                }
                finish_failed(state, &request, &e, attempts).await;
                return;
            }
            Err(e) => {
                finish_failed(state, &request, &e, attempts).await;
                return;
            }
        }
    }
}

async fn finish_failed(
    state: &ServerState,
    request: &action_request::Model,
    error: &AppError,
    attempts: i32,
) {
    let message = friendly_error(&request.action, error);
    tracing::error!("Action {} failed: {}", request.id, message);

    if let Err(e) = ActionRequestCtrl::finish(
        &state.conn,
        &request.id,
        ActionStatus::Failed,
        &message,
        attempts,
    )
    .await
    {
        tracing::error!("Error closing failed request {}: {:?}", request.id, e);
    }
}

/// One provider round-trip for a request; returns the audit message.
pub async fn execute_action(
    mail: &dyn MailPort,
    user_email: &str,
    request: &action_request::Model,
) -> AppResult<String> {
    match request.action {
        ActionKind::Archive => {
            let message_id = request
                .message_id
                .as_deref()
                .context("Archive request without message_id")?;
            // Removing INBOX from an already-archived message is a no-op at
            // the provider; re-enqueued archives complete cleanly.
            mail.remove_labels(message_id, &["INBOX".to_string()]).await?;
            Ok(format!("Archived message {message_id}"))
        }
        ActionKind::SendDraft => {
            let params: SendDraftParams = serde_json::from_value(request.params.clone())
                .context("Invalid send_draft params")?;
            let raw = build_rfc822(user_email, &params)?;
            mail.send_raw(b64u_encode(raw)).await?;
            Ok(format!("Sent draft to {}", params.to))
        }
        ActionKind::ApplyLabel => {
            let message_id = request
                .message_id
                .as_deref()
                .context("Label request without message_id")?;
            let params: ApplyLabelParams = serde_json::from_value(request.params.clone())
                .context("Invalid apply_label params")?;

            let mut label_ids = Vec::new();
            for name in &params.labels {
                label_ids.push(mail.resolve_label_id(name).await?);
            }
            mail.add_labels(message_id, &label_ids).await?;
            Ok(format!("Applied labels: {}", params.labels.join(", ")))
        }
    }
}

fn build_rfc822(from: &str, params: &SendDraftParams) -> AppResult<Vec<u8>> {
    let builder = lettre::Message::builder()
        .from(
            format!("<{from}>")
                .parse()
                .context("Could not parse from address")?,
        )
        .to(format!("<{}>", params.to)
            .parse()
            .context("Could not parse to address")?)
        .subject(&params.subject);

    let message = if params.is_html {
        builder
            .header(ContentType::TEXT_HTML)
            .body(params.body.clone())
    } else {
        builder.body(params.body.clone())
    }
    .context("Could not assemble draft")?;

    Ok(message.formatted())
}

/// Renders the stored failure text users see in the audit trail.
pub fn friendly_error(action: &ActionKind, error: &AppError) -> String {
    let verb = match action {
        ActionKind::Archive => "archive the message",
        ActionKind::SendDraft => "send the draft",
        ActionKind::ApplyLabel => "apply labels",
    };

    match error {
        AppError::NotFound(_) => format!("Gmail rejected the request (404): could not {verb}, message not found"),
        AppError::BadRequest(msg) => format!("Gmail rejected the request: {msg}"),
        AppError::TooManyRequests => format!("Rate limited while trying to {verb}; it was not retried"),
        AppError::RequestTimeout => format!("Timed out trying to {verb} after retries"),
        AppError::ReAuthRequired(_) | AppError::Unauthorized(_) => {
            format!("Could not {verb}: the mail connection needs to be re-authorized")
        }
        _ => format!("Could not {verb}: an internal error occurred"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    #[derive(Default)]
    struct MockMail {
        pub removed: Mutex<Vec<(String, Vec<String>)>>,
        pub added: Mutex<Vec<(String, Vec<String>)>>,
        pub sent: Mutex<Vec<String>>,
        pub labels: Mutex<Vec<String>>,
        pub failures_before_success: Mutex<u32>,
    }

    #[async_trait]
    impl MailPort for MockMail {
        async fn remove_labels(&self, message_id: &str, label_ids: &[String]) -> AppResult<()> {
            let mut failures = self.failures_before_success.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(AppError::RequestTimeout);
            }
            self.removed
                .lock()
                .unwrap()
                .push((message_id.to_string(), label_ids.to_vec()));
            Ok(())
        }

        async fn add_labels(&self, message_id: &str, label_ids: &[String]) -> AppResult<()> {
            self.added
                .lock()
                .unwrap()
                .push((message_id.to_string(), label_ids.to_vec()));
            Ok(())
        }

        async fn send_raw(&self, raw_b64u: String) -> AppResult<()> {
            self.sent.lock().unwrap().push(raw_b64u);
            Ok(())
        }

        async fn resolve_label_id(&self, name: &str) -> AppResult<String> {
            let mut labels = self.labels.lock().unwrap();
            labels.push(name.to_string());
            Ok(format!("Label_{}", labels.len()))
        }
    }

    fn request(action: ActionKind, params: serde_json::Value) -> action_request::Model {
        action_request::Model {
            id: Uuid::new_v4().to_string(),
            user_id: 1,
            message_id: Some("m1".to_string()),
            action,
            params,
            status: ActionStatus::Pending,
            result_message: None,
            attempts: 0,
            requested_at: Utc::now().into(),
            processed_at: None,
        }
    }

    #[tokio::test]
    async fn test_archive_removes_inbox_label() {
        let mail = MockMail::default();
        let req = request(ActionKind::Archive, serde_json::json!({}));

        let msg = execute_action(&mail, "me@x.com", &req).await.unwrap();
        assert!(msg.contains("m1"));
        assert_eq!(
            mail.removed.lock().unwrap()[0],
            ("m1".to_string(), vec!["INBOX".to_string()])
        );
    }

    #[tokio::test]
    async fn test_apply_label_resolves_then_adds() {
        let mail = MockMail::default();
        let req = request(
            ActionKind::ApplyLabel,
            serde_json::json!({ "labels": ["Priority/HIGH", "Purpose/alert"] }),
        );

        execute_action(&mail, "me@x.com", &req).await.unwrap();
        assert_eq!(mail.labels.lock().unwrap().len(), 2);
        assert_eq!(mail.added.lock().unwrap()[0].1.len(), 2);
    }

    #[tokio::test]
    async fn test_send_draft_builds_base64url_mime() {
        let mail = MockMail::default();
        let req = request(
            ActionKind::SendDraft,
            serde_json::json!({
                "to": "jo@acme.com",
                "subject": "Agenda",
                "body": "Morning digest",
                "is_html": false
            }),
        );

        execute_action(&mail, "me@x.com", &req).await.unwrap();
        let sent = mail.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        // base64url: no '+' or '/'.
        assert!(!sent[0].contains('+'));
        assert!(!sent[0].contains('/'));

        let decoded = lib_utils::b64::b64u_decode(&sent[0]).unwrap();
        let text = String::from_utf8_lossy(&decoded);
        assert!(text.contains("To: <jo@acme.com>"));
        assert!(text.contains("Subject: Agenda"));
    }

    #[tokio::test]
    async fn test_archive_missing_message_id_fails() {
        let mail = MockMail::default();
        let mut req = request(ActionKind::Archive, serde_json::json!({}));
        req.message_id = None;

        assert!(execute_action(&mail, "me@x.com", &req).await.is_err());
    }

    #[test]
    fn test_friendly_error_not_found() {
        let msg = friendly_error(&ActionKind::Archive, &AppError::NotFound("gone".into()));
        assert!(msg.contains("404"));
        assert!(msg.contains("archive"));
    }

    #[test]
    fn test_friendly_error_rate_limited_mentions_no_retry() {
        let msg = friendly_error(&ActionKind::SendDraft, &AppError::TooManyRequests);
        assert!(msg.contains("not retried"));
    }
}
