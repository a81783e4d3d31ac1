use chrono::{Duration, Timelike, Utc};
use minijinja::render;
use serde_json::json;

use crate::{
    analysis::prepare_batch_overview,
    db_core::prelude::*,
    error::AppResult,
    model::{action_request::ActionRequestCtrl, message::MessageCtrl},
    realtime::AgentEvent,
    server_config::cfg,
};

use super::{digest_template::DAILY_DIGEST_TEMPLATE, runner::TaskCtx, TaskOutcome};

/// Composes the morning digest from the last 24 hours of high-priority
/// mail and queues it as a draft to the user's own address. Fires only in
/// the configured UTC hour.
pub async fn run(ctx: &TaskCtx<'_>) -> AppResult<TaskOutcome> {
    let task_cfg = &cfg.autonomous_tasks.daily_summary;

    if Utc::now().hour() != task_cfg.hour_utc {
        return Ok(TaskOutcome::Skipped("outside configured hour"));
    }

    let since = Utc::now() - Duration::hours(24);
    let messages = MessageCtrl::high_priority_since(&ctx.state.conn, ctx.user.id, since).await?;

    if messages.is_empty() {
        return Ok(TaskOutcome::Ran("no high-priority email in window".to_string()));
    }

    let pairs: Vec<(String, String)> = messages
        .iter()
        .map(|m| (m.sender.clone(), m.subject.clone()))
        .collect();
    let overview = prepare_batch_overview(ctx.state.llm.as_ref(), &pairs).await;

    let emails: Vec<serde_json::Value> = messages
        .iter()
        .take(cfg.agenda_synthesis.max_emails)
        .map(|m| {
            json!({
                "sender": m.sender,
                "subject": m.subject,
                "summary": m.summary,
            })
        })
        .collect();

    let body = render!(DAILY_DIGEST_TEMPLATE, overview => overview, emails => emails);

    let request = ActionRequestCtrl::enqueue(
        &ctx.state.conn,
        ctx.user.id,
        ActionKind::SendDraft,
        None,
        json!({
            "to": ctx.user.email,
            "subject": format!("Your email digest for {}", Utc::now().format("%B %e, %Y")),
            "body": body,
            "is_html": true,
        }),
    )
    .await?;

    ctx.state
        .broadcaster
        .emit(ctx.user.id, AgentEvent::action_queued(&request))
        .await;

    Ok(TaskOutcome::Ran(format!(
        "digest queued covering {} messages",
        messages.len()
    )))
}
