use chrono::{Duration, Utc};
use serde_json::json;

use crate::{
    classify::features::extract_domain,
    db_core::prelude::*,
    error::AppResult,
    model::{action_request::ActionRequestCtrl, message::MessageCtrl},
    realtime::AgentEvent,
    server_config::cfg,
};

use super::{runner::TaskCtx, TaskOutcome};

/// Queues archive actions for old low-value mail. The worker performs the
/// provider call; this task only selects and enqueues.
pub async fn run(ctx: &TaskCtx<'_>) -> AppResult<TaskOutcome> {
    let task_cfg = &cfg.autonomous_tasks.auto_archive;

    if !ctx.profile.agent_preferences.allow_auto_archiving {
        return Ok(TaskOutcome::Skipped("auto-archiving not allowed"));
    }

    let cutoff = Utc::now() - Duration::days(task_cfg.archive_after_days);
    let candidates = MessageCtrl::archive_candidates(
        &ctx.state.conn,
        ctx.user.id,
        cutoff,
        &task_cfg.purposes_to_archive,
        task_cfg.max_per_run,
    )
    .await?;

    let excluded_domains: Vec<String> = task_cfg
        .excluded_domains
        .iter()
        .chain(ctx.profile.email_preferences.filtered_domains.iter())
        .map(|d| d.trim_start_matches('@').to_lowercase())
        .collect();

    let mut queued = 0;
    for message in candidates {
        let sender_lower = message.sender.to_lowercase();
        if task_cfg
            .excluded_senders
            .iter()
            .any(|s| sender_lower.contains(&s.to_lowercase()))
        {
            continue;
        }
        if excluded_domains.contains(&extract_domain(&message.sender)) {
            continue;
        }

        let request = ActionRequestCtrl::enqueue(
            &ctx.state.conn,
            ctx.user.id,
            ActionKind::Archive,
            Some(message.id.clone()),
            json!({}),
        )
        .await?;

        ctx.state
            .broadcaster
            .emit(ctx.user.id, AgentEvent::action_queued(&request))
            .await;
        queued += 1;
    }

    Ok(TaskOutcome::Ran(format!("queued {queued} archive requests")))
}
