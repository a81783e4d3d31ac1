use crate::{
    analysis::{analyze_email, UNKNOWN_PURPOSE},
    error::AppResult,
    mail::ParsedEmail,
    model::message::MessageCtrl,
    server_config::cfg,
};

use super::{runner::TaskCtx, TaskOutcome};

/// Re-runs the analyzer over messages whose purpose never resolved, updating
/// the stored purpose when the second pass lands somewhere useful.
pub async fn run(ctx: &TaskCtx<'_>) -> AppResult<TaskOutcome> {
    let batch_size = cfg.autonomous_tasks.re_evaluate.batch_size;
    let messages = MessageCtrl::unknown_purpose(&ctx.state.conn, ctx.user.id, batch_size).await?;

    if messages.is_empty() {
        return Ok(TaskOutcome::Ran("no unknown-purpose messages".to_string()));
    }

    let mut updated = 0;
    for message in &messages {
        let email = ParsedEmail {
            id: message.id.clone(),
            thread_id: message.thread_id.clone(),
            sender: message.sender.clone(),
            subject: message.subject.clone(),
            body_text: message.body_text.clone(),
            body_html: message.body_html.clone(),
            snippet: message.snippet.clone(),
            ..Default::default()
        };

        let Some(analysis) = analyze_email(ctx.state.llm.as_ref(), &email).await else {
            continue;
        };
        if analysis.purpose == UNKNOWN_PURPOSE {
            continue;
        }

        MessageCtrl::update_purpose(&ctx.state.conn, ctx.user.id, &message.id, &analysis.purpose)
            .await?;
        updated += 1;
    }

    Ok(TaskOutcome::Ran(format!(
        "re-evaluated {}, updated {updated}",
        messages.len()
    )))
}
