use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    llm::{json::parse_json_response, LlmClient},
    mail::{sanitize_for_prompt, ParsedEmail},
    server_config::cfg,
};

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedTask {
    pub task_description: String,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub stakeholders: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TasksReply {
    tasks: Vec<ExtractedTask>,
}

/// Pulls actionable tasks out of an email body. Empty on model failure; task
/// extraction never blocks the pipeline.
pub async fn extract_tasks(
    llm: &dyn LlmClient,
    email: &ParsedEmail,
    max_tasks: usize,
) -> Vec<ExtractedTask> {
    let system = "You extract actionable tasks from an email. Reply with a JSON object: \
                  {\"tasks\": [{\"task_description\": \"...\", \"deadline\": \"YYYY-MM-DD or null\", \
                  \"stakeholders\": [\"name or address\"]}]}. Only include tasks the reader must \
                  actually do. Reply with {\"tasks\": []} when there are none. Output only JSON.";

    let body = sanitize_for_prompt(&email.body_text);
    let truncated: String = body
        .chars()
        .take(cfg.llm_settings.analysis_max_input_chars)
        .collect();
    let user = format!(
        "From: {}\nSubject: {}\n\nEmail:\n---\n{truncated}\n---",
        email.sender, email.subject
    );

    let raw = match llm
        .complete(
            system,
            &user,
            cfg.llm_settings.analysis_max_tokens,
            cfg.llm_settings.analysis_temperature,
        )
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!("Task extraction failed for {}: {:?}", email.id, e);
            return Vec::new();
        }
    };

    match parse_json_response::<TasksReply>(&raw) {
        Some(reply) => {
            let mut tasks: Vec<ExtractedTask> = reply
                .tasks
                .into_iter()
                .filter(|t| !t.task_description.trim().is_empty())
                .collect();
            tasks.truncate(max_tasks);
            tasks
        }
        None => Vec::new(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeetingExtraction {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub location: Option<String>,
    pub confidence: f32,
}

/// Reads meeting details out of an invite-like email. None when the model
/// cannot find a concrete time slot.
pub async fn extract_meeting(
    llm: &dyn LlmClient,
    email: &ParsedEmail,
    now: DateTime<Utc>,
) -> Option<MeetingExtraction> {
    let system = "You extract meeting details from an email. Reply with a JSON object: \
                  {\"title\": \"...\", \"start_time\": \"RFC3339 UTC\", \"end_time\": \"RFC3339 UTC\", \
                  \"location\": \"... or null\", \"confidence\": 0.0-1.0}. The confidence reflects \
                  how certain the date, time and duration are. If no concrete meeting time is \
                  present, reply with {\"confidence\": 0.0} and nothing else. Output only JSON.";

    let body = sanitize_for_prompt(&email.body_text);
    let truncated: String = body
        .chars()
        .take(cfg.llm_settings.analysis_max_input_chars)
        .collect();
    let user = format!(
        "Current time: {}\nFrom: {}\nSubject: {}\n\nEmail:\n---\n{truncated}\n---",
        now.to_rfc3339(),
        email.sender,
        email.subject
    );

    let raw = llm
        .complete(
            system,
            &user,
            cfg.llm_settings.analysis_max_tokens,
            cfg.llm_settings.analysis_temperature,
        )
        .await
        .ok()?;

    let extraction: MeetingExtraction = parse_json_response(&raw)?;
    if extraction.title.trim().is_empty() || extraction.end_time <= extraction.start_time {
        return None;
    }

    Some(extraction)
}

#[cfg(test)]
mod tests {
    use crate::llm::testing::ScriptedLlm;

    use super::*;

    fn email() -> ParsedEmail {
        ParsedEmail {
            id: "m1".to_string(),
            sender: "a@b.com".to_string(),
            subject: "Sync".to_string(),
            body_text: "Can we meet Tuesday 3pm for an hour?".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_tasks_parsed_and_capped() {
        let llm = ScriptedLlm::new(vec![
            r#"{"tasks": [
                {"task_description": "Send the report", "deadline": "2025-02-14", "stakeholders": ["jo@acme.com"]},
                {"task_description": "Book the room"},
                {"task_description": "Third task"},
                {"task_description": "Fourth task"}
            ]}"#,
        ]);

        let tasks = extract_tasks(&llm, &email(), 3).await;
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].deadline.as_deref(), Some("2025-02-14"));
    }

    #[tokio::test]
    async fn test_no_tasks_reply() {
        let llm = ScriptedLlm::new(vec![r#"{"tasks": []}"#]);
        assert!(extract_tasks(&llm, &email(), 3).await.is_empty());
    }

    #[tokio::test]
    async fn test_meeting_extraction_parses_times() {
        let llm = ScriptedLlm::new(vec![
            r#"{"title": "Sync", "start_time": "2025-02-18T15:00:00Z", "end_time": "2025-02-18T16:00:00Z", "location": null, "confidence": 0.9}"#,
        ]);

        let meeting = extract_meeting(&llm, &email(), Utc::now()).await.unwrap();
        assert_eq!(meeting.title, "Sync");
        assert!(meeting.confidence > 0.8);
    }

    #[tokio::test]
    async fn test_meeting_with_inverted_times_rejected() {
        let llm = ScriptedLlm::new(vec![
            r#"{"title": "Sync", "start_time": "2025-02-18T16:00:00Z", "end_time": "2025-02-18T15:00:00Z", "confidence": 0.9}"#,
        ]);
        assert!(extract_meeting(&llm, &email(), Utc::now()).await.is_none());
    }
}
