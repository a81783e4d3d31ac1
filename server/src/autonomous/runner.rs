use chrono::Utc;
use serde_json::json;

use crate::{
    error::AppResult,
    mail::{access_token_for, GmailClient},
    model::{
        activity::{ActivityCtrl, STATUS_COMPLETED, STATUS_FAILED, STATUS_IN_PROGRESS},
        user::{UserCtrl, UserWithAccountAccess},
        user_profile::{Profile, UserProfileCtrl},
    },
    server_config::cfg,
    ServerState,
};

use super::{
    auto_archive, daily_summary, follow_up, meeting_prep, re_evaluate, task_due, TaskOutcome,
};

/// Everything one autonomous task needs for one user.
pub struct TaskCtx<'a> {
    pub state: &'a ServerState,
    pub user: &'a UserWithAccountAccess,
    pub profile: &'a Profile,
    pub mail: &'a GmailClient,
}

/// Scheduler entry point for the autonomous tier. Errors never propagate
/// past the tick; per-user failures are logged and the next user runs.
pub async fn run_autonomous_tasks(state: ServerState) -> AppResult<()> {
    let users = UserCtrl::all_connected(&state.conn).await?;

    for user in users {
        if let Err(e) = run_for_user(&state, &user).await {
            tracing::error!("Autonomous run failed for {}: {:?}", user.email, e);
        }
    }

    Ok(())
}

async fn run_for_user(state: &ServerState, user: &UserWithAccountAccess) -> AppResult<()> {
    let profile = UserProfileCtrl::get_or_create(&state.conn, user.id).await?;

    // Master switch: nothing autonomous happens without it.
    if !profile.agent_preferences.autonomous_mode_enabled {
        return Ok(());
    }

    let access_token = access_token_for(&state.conn, &state.http_client, user).await?;
    let mail = GmailClient::new(state.http_client.clone(), access_token);

    let ctx = TaskCtx {
        state,
        user,
        profile: &profile,
        mail: &mail,
    };

    let mut summary_parts: Vec<String> = Vec::new();

    run_task(
        &ctx,
        "auto_archive",
        cfg.autonomous_tasks.auto_archive.enabled,
        cfg.autonomous_tasks.auto_archive.interval_minutes,
        &mut summary_parts,
        auto_archive::run,
    )
    .await;

    run_task(
        &ctx,
        "daily_summary",
        cfg.autonomous_tasks.daily_summary.enabled
            && profile.agent_preferences.daily_summary_enabled,
        cfg.autonomous_tasks.daily_summary.interval_minutes,
        &mut summary_parts,
        daily_summary::run,
    )
    .await;

    run_task(
        &ctx,
        "follow_up",
        cfg.autonomous_tasks.follow_up.enabled,
        cfg.autonomous_tasks.follow_up.interval_minutes,
        &mut summary_parts,
        follow_up::run,
    )
    .await;

    run_task(
        &ctx,
        "re_evaluate",
        cfg.autonomous_tasks.re_evaluate.enabled,
        cfg.autonomous_tasks.re_evaluate.interval_minutes,
        &mut summary_parts,
        re_evaluate::run,
    )
    .await;

    run_task(
        &ctx,
        "meeting_prep",
        cfg.autonomous_tasks.meeting_prep.enabled,
        cfg.autonomous_tasks.meeting_prep.interval_minutes,
        &mut summary_parts,
        meeting_prep::run,
    )
    .await;

    if !summary_parts.is_empty() {
        let summary = format!(
            "Autonomous run at {}: {}",
            Utc::now().format("%Y-%m-%d %H:%M UTC"),
            summary_parts.join("; ")
        );
        UserProfileCtrl::set_last_run_summary(&state.conn, user.id, &summary).await?;
    }

    Ok(())
}

async fn run_task<'a, 'b, F, Fut>(
    ctx: &'b TaskCtx<'a>,
    name: &'static str,
    enabled: bool,
    interval_minutes: i64,
    summary_parts: &mut Vec<String>,
    task: F,
) where
    F: FnOnce(&'b TaskCtx<'a>) -> Fut,
    Fut: std::future::Future<Output = AppResult<TaskOutcome>>,
{
    if !enabled {
        return;
    }

    let now = Utc::now();
    if !task_due(ctx.profile.task_last_run(name), interval_minutes, now) {
        return;
    }

    let activity = ActivityCtrl::insert(
        &ctx.state.conn,
        ctx.user.id,
        name,
        "autonomous",
        STATUS_IN_PROGRESS,
        json!({ "started_at": now.to_rfc3339() }),
    )
    .await
    .ok();

    match task(ctx).await {
        Ok(TaskOutcome::Ran(summary)) => {
            tracing::info!("Autonomous task {} for {}: {}", name, ctx.user.email, summary);

            if let Err(e) =
                UserProfileCtrl::set_task_last_run(&ctx.state.conn, ctx.user.id, name, now).await
            {
                tracing::error!("Error stamping last run for {}: {:?}", name, e);
            }
            if let Some(activity) = activity {
                ActivityCtrl::mark(
                    &ctx.state.conn,
                    activity.id,
                    STATUS_COMPLETED,
                    json!({ "summary": summary }),
                )
                .await
                .unwrap_or_else(|e| tracing::error!("Error closing activity: {:?}", e));
            }
            summary_parts.push(format!("{name}: {summary}"));
        }
        Ok(TaskOutcome::Skipped(reason)) => {
            tracing::debug!("Autonomous task {} skipped: {}", name, reason);
            if let Some(activity) = activity {
                ActivityCtrl::mark(
                    &ctx.state.conn,
                    activity.id,
                    STATUS_COMPLETED,
                    json!({ "skipped": reason }),
                )
                .await
                .unwrap_or_else(|e| tracing::error!("Error closing activity: {:?}", e));
            }
        }
        Err(e) => {
            tracing::error!("Autonomous task {} failed for {}: {:?}", name, ctx.user.email, e);
            if let Some(activity) = activity {
                ActivityCtrl::mark(
                    &ctx.state.conn,
                    activity.id,
                    STATUS_FAILED,
                    json!({ "error": format!("{e:?}") }),
                )
                .await
                .unwrap_or_else(|e| tracing::error!("Error closing activity: {:?}", e));
            }
        }
    }
}
