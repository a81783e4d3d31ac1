use chrono::{Duration, TimeZone, Utc};
use indexmap::IndexSet;

use crate::{
    error::AppResult,
    model::user_task::{UserTaskCtrl, CREATED_AUTONOMOUS, TASK_FOLLOW_UP},
    server_config::cfg,
};

use super::{runner::TaskCtx, TaskOutcome};

const SCAN_WINDOW_EXTRA_DAYS: i64 = 15;
const MAX_SENT_TO_SCAN: u32 = 50;

/// Finds sent messages that never got a reply and records a follow-up task
/// per thread. Re-runs are deduplicated on the original message id.
pub async fn run(ctx: &TaskCtx<'_>) -> AppResult<TaskOutcome> {
    let remind_days = cfg.autonomous_tasks.follow_up.remind_days;
    let scan_days = remind_days + SCAN_WINDOW_EXTRA_DAYS;

    let sent = ctx
        .mail
        .list_sent_messages(scan_days, MAX_SENT_TO_SCAN)
        .await?;

    let mut created = 0;
    let mut threads_seen = IndexSet::new();
    for meta in sent {
        // Several sent messages can share a thread; one look per thread.
        if !threads_seen.insert(meta.thread_id.clone()) {
            continue;
        }

        let thread_messages = match ctx.mail.list_thread_messages(&meta.thread_id).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("Could not load thread {}: {:?}", meta.thread_id, e);
                continue;
            }
        };

        let Some(original) = thread_messages
            .iter()
            .find(|m| m.id.as_deref() == Some(meta.id.as_str()))
        else {
            continue;
        };
        let Some(sent_at_ms) = original.internal_date else {
            continue;
        };

        // Any message strictly after the original counts as a reply.
        let has_reply = thread_messages
            .iter()
            .filter(|m| m.id.as_deref() != Some(meta.id.as_str()))
            .any(|m| m.internal_date.unwrap_or(0) > sent_at_ms);
        if has_reply {
            continue;
        }

        let Some(sent_at) = Utc.timestamp_millis_opt(sent_at_ms).single() else {
            continue;
        };
        if Utc::now() - sent_at < Duration::days(remind_days) {
            continue;
        }

        let subject = original
            .payload
            .as_ref()
            .and_then(|p| p.headers.as_ref())
            .and_then(|headers| {
                headers
                    .iter()
                    .find(|h| h.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case("subject")))
            })
            .and_then(|h| h.value.clone())
            .unwrap_or_else(|| "(no subject)".to_string());

        let description = format!(
            "No reply to \"{}\" sent on {}; consider following up",
            subject,
            sent_at.format("%Y-%m-%d")
        );

        let inserted = UserTaskCtrl::insert_if_absent(
            &ctx.state.conn,
            ctx.user.id,
            TASK_FOLLOW_UP,
            &description,
            None,
            Vec::new(),
            Some(meta.id.clone()),
            CREATED_AUTONOMOUS,
        )
        .await?;

        if inserted.is_some() {
            created += 1;
        }
    }

    Ok(TaskOutcome::Ran(format!("created {created} follow-up tasks")))
}
