use entity::sea_orm_active_enums::Priority;
use serde::{Deserialize, Serialize};

use crate::{
    llm::{json::parse_json_response, LlmClient},
    mail::{sanitize_for_prompt, ParsedEmail},
    server_config::cfg,
};

use super::EmailAnalysis;

pub const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    #[serde(rename = "type")]
    pub suggestion_type: String,
}

#[derive(Debug, Deserialize)]
struct SuggestionsReply {
    suggestions: Vec<Suggestion>,
}

/// Up to [`MAX_SUGGESTIONS`] next-step suggestions for one email. Falls back
/// to rule-derived suggestions when the model is unavailable.
pub async fn suggest_actions(
    llm: &dyn LlmClient,
    email: &ParsedEmail,
    priority: Priority,
    analysis: Option<&EmailAnalysis>,
) -> Vec<Suggestion> {
    let system = "You suggest concrete next actions for handling an email. Reply with a JSON \
                  object: {\"suggestions\": [{\"text\": \"...\", \"type\": \"...\"}]}. Types: \
                  reply, archive, schedule, delegate, task, read_later. At most three, most \
                  useful first. Output only the JSON object.";

    let body = sanitize_for_prompt(&email.body_text);
    let truncated: String = body
        .chars()
        .take(cfg.llm_settings.analysis_max_input_chars)
        .collect();
    let user = format!(
        "Priority: {priority}\nPurpose: {}\nFrom: {}\nSubject: {}\n\nEmail:\n---\n{truncated}\n---",
        analysis.map(|a| a.purpose.as_str()).unwrap_or("unknown"),
        email.sender,
        email.subject,
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
            tracing::warn!("Suggestion generation failed for {}: {:?}", email.id, e);
            return basic_suggestions(priority, analysis);
        }
    };

    match parse_json_response::<SuggestionsReply>(&raw) {
        Some(reply) => {
            let mut suggestions: Vec<Suggestion> = reply
                .suggestions
                .into_iter()
                .filter(|s| !s.text.trim().is_empty())
                .collect();
            suggestions.truncate(MAX_SUGGESTIONS);
            if suggestions.is_empty() {
                basic_suggestions(priority, analysis)
            } else {
                suggestions
            }
        }
        None => basic_suggestions(priority, analysis),
    }
}

/// Rule-derived fallbacks keyed on priority and purpose.
pub fn basic_suggestions(priority: Priority, analysis: Option<&EmailAnalysis>) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();

    match priority {
        Priority::Critical | Priority::High => suggestions.push(Suggestion {
            text: "Respond to this email promptly".to_string(),
            suggestion_type: "reply".to_string(),
        }),
        Priority::Medium => suggestions.push(Suggestion {
            text: "Review when you have a moment".to_string(),
            suggestion_type: "read_later".to_string(),
        }),
        Priority::Low => suggestions.push(Suggestion {
            text: "Archive if not relevant".to_string(),
            suggestion_type: "archive".to_string(),
        }),
    }

    if let Some(analysis) = analysis {
        if analysis.response_needed && priority != Priority::Low {
            suggestions.push(Suggestion {
                text: "A response appears to be expected".to_string(),
                suggestion_type: "reply".to_string(),
            });
        }
        if analysis.purpose == "promotion" {
            suggestions.push(Suggestion {
                text: "Unsubscribe or filter this sender".to_string(),
                suggestion_type: "archive".to_string(),
            });
        }
    }

    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}

/// Agenda-style overview of a batch of high-priority messages, used by the
/// daily digest. None when there is nothing to summarize or the model fails.
pub async fn prepare_batch_overview(
    llm: &dyn LlmClient,
    emails: &[(String, String)],
) -> Option<String> {
    if emails.is_empty() {
        return None;
    }

    let max = cfg.agenda_synthesis.max_emails;
    let listing = emails
        .iter()
        .take(max)
        .enumerate()
        .map(|(i, (sender, subject))| format!("{}. From {sender}: {subject}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    let system = format!(
        "You write a {} morning agenda from a list of important emails. Group related \
         items, call out anything needing a same-day response, and keep it under 150 words. \
         Reply with plain text only.",
        cfg.agenda_synthesis.tone
    );
    let user = format!("Important emails from the last 24 hours:\n{listing}");

    match llm
        .complete(
            &system,
            &user,
            cfg.llm_settings.summary_max_tokens,
            cfg.llm_settings.summary_temperature,
        )
        .await
    {
        Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("Batch overview generation failed: {:?}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::llm::testing::ScriptedLlm;

    use super::*;

    fn email() -> ParsedEmail {
        ParsedEmail {
            id: "m1".to_string(),
            sender: "a@b.com".to_string(),
            subject: "subject".to_string(),
            body_text: "body".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_suggestions_parsed_and_capped() {
        let llm = ScriptedLlm::new(vec![
            r#"{"suggestions": [
                {"text": "Reply today", "type": "reply"},
                {"text": "Add to calendar", "type": "schedule"},
                {"text": "Make a task", "type": "task"},
                {"text": "One too many", "type": "task"}
            ]}"#,
        ]);

        let suggestions = suggest_actions(&llm, &email(), Priority::High, None).await;
        assert_eq!(suggestions.len(), MAX_SUGGESTIONS);
        assert_eq!(suggestions[0].text, "Reply today");
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_basic() {
        let llm = ScriptedLlm::new(vec![]);
        let suggestions = suggest_actions(&llm, &email(), Priority::Low, None).await;

        assert!(!suggestions.is_empty());
        assert_eq!(suggestions[0].suggestion_type, "archive");
    }

    #[test]
    fn test_basic_suggestions_promotion() {
        let analysis = EmailAnalysis {
            urgency_score: 1,
            purpose: "promotion".to_string(),
            response_needed: false,
            estimated_time: 1,
        };
        let suggestions = basic_suggestions(Priority::Low, Some(&analysis));
        assert!(suggestions
            .iter()
            .any(|s| s.text.contains("Unsubscribe")));
    }

    #[tokio::test]
    async fn test_batch_overview_empty_input() {
        let llm = ScriptedLlm::new(vec![]);
        assert!(prepare_batch_overview(&llm, &[]).await.is_none());
    }
}
