use chrono::Utc;

use crate::{
    analysis::extract_meeting,
    error::AppResult,
    mail::{CalendarClient, ParsedEmail},
    model::message::MessageCtrl,
    realtime::AgentEvent,
    server_config::{cfg, AGENT_NAME},
};

use super::{runner::TaskCtx, TaskOutcome};

const MEETING_PURPOSES: [&str; 3] = ["meeting_invite", "action_required", "personal"];
const MAX_PER_RUN: u64 = 10;

/// Drafts calendar events for unprocessed high-priority meeting-flavoured
/// messages. Each candidate is marked processed whether or not an event was
/// drafted, so a low-confidence extraction is never retried forever.
pub async fn run(ctx: &TaskCtx<'_>) -> AppResult<TaskOutcome> {
    let task_cfg = &cfg.autonomous_tasks.meeting_prep;

    let candidates = MessageCtrl::meeting_candidates(
        &ctx.state.conn,
        ctx.user.id,
        &MEETING_PURPOSES,
        MAX_PER_RUN,
    )
    .await?;

    if candidates.is_empty() {
        return Ok(TaskOutcome::Ran("no meeting candidates".to_string()));
    }

    let access_token = crate::mail::access_token_for(
        &ctx.state.conn,
        &ctx.state.http_client,
        ctx.user,
    )
    .await?;
    let calendar = CalendarClient::new(ctx.state.http_client.clone(), access_token);

    let mut drafted = 0;
    for message in &candidates {
        let email = ParsedEmail {
            id: message.id.clone(),
            sender: message.sender.clone(),
            subject: message.subject.clone(),
            body_text: message.body_text.clone(),
            ..Default::default()
        };

        if let Some(meeting) = extract_meeting(ctx.state.llm.as_ref(), &email, Utc::now()).await {
            if meeting.confidence >= task_cfg.confidence_threshold {
                let summary = format!("[DRAFT by {AGENT_NAME}] {}", meeting.title);
                let description = format!(
                    "Drafted from \"{}\" ({}). Location: {}",
                    message.subject,
                    message.sender,
                    meeting.location.as_deref().unwrap_or("not specified")
                );

                match calendar
                    .create_event(&summary, &description, meeting.start_time, meeting.end_time)
                    .await
                {
                    Ok(event_id) => {
                        drafted += 1;
                        ctx.state
                            .broadcaster
                            .emit(
                                ctx.user.id,
                                AgentEvent::autonomous_action_executed(
                                    &message.id,
                                    "calendar_draft",
                                    &format!("Drafted event {event_id}: {}", meeting.title),
                                ),
                            )
                            .await;
                    }
                    Err(e) => {
                        tracing::error!("Calendar draft failed for {}: {:?}", message.id, e);
                    }
                }
            }
        }

        // Marked regardless of outcome to prevent reprocessing.
        MessageCtrl::set_meeting_processed(&ctx.state.conn, ctx.user.id, &message.id).await?;
    }

    Ok(TaskOutcome::Ran(format!(
        "inspected {}, drafted {drafted} events",
        candidates.len()
    )))
}
