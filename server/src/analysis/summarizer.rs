use strum::{Display, EnumString};

use crate::{
    llm::LlmClient,
    mail::{sanitize_for_prompt, ParsedEmail},
    server_config::cfg,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SummaryType {
    Standard,
    Brief,
    Detailed,
    ActionFocused,
}

impl SummaryType {
    fn instruction(&self) -> &'static str {
        match self {
            SummaryType::Standard => {
                "Summarize this email in 2-3 sentences covering the key points."
            }
            SummaryType::Brief => "Summarize this email in one short sentence.",
            SummaryType::Detailed => {
                "Summarize this email thoroughly, covering every point, request and deadline."
            }
            SummaryType::ActionFocused => {
                "Summarize this email focusing on the concrete actions requested of the reader, \
                 who must do them, and by when."
            }
        }
    }
}

const LEADING_PHRASES: [&str; 6] = [
    "here is the summary:",
    "here's the summary:",
    "here is a summary:",
    "here's a summary:",
    "here is a concise summary:",
    "summary:",
];

/// Produces the requested summary, or an `"Error: ..."` sentinel on final
/// failure. The pipeline stores the sentinel and moves on.
pub async fn summarize_email(
    llm: &dyn LlmClient,
    email: &ParsedEmail,
    summary_type: SummaryType,
) -> String {
    let body = sanitize_for_prompt(&email.body_text);
    let truncated: String = body
        .chars()
        .take(cfg.llm_settings.summary_max_input_chars)
        .collect();

    let system = "You summarize emails for a busy professional. Reply with the summary text \
                  only: no preamble, no markdown, no bullet points unless asked.";
    let user = format!(
        "{}\n\nFrom: {}\nSubject: {}\n\nEmail:\n---\n{}\n---",
        summary_type.instruction(),
        email.sender,
        email.subject,
        truncated
    );

    match llm
        .complete(
            system,
            &user,
            cfg.llm_settings.summary_max_tokens,
            cfg.llm_settings.summary_temperature,
        )
        .await
    {
        Ok(raw) => clean_summary(&raw),
        Err(e) => {
            tracing::warn!("Summary failed for {}: {:?}", email.id, e);
            format!("Error: could not generate summary ({e:?})")
        }
    }
}

/// Strips boilerplate lead-ins and list markers the model sneaks in.
pub fn clean_summary(raw: &str) -> String {
    let mut text = raw.trim().to_string();

    let lowered = text.to_lowercase();
    for phrase in LEADING_PHRASES {
        if lowered.starts_with(phrase) {
            text = text[phrase.len()..].trim_start().to_string();
            break;
        }
    }

    for marker in ["- ", "* ", "• "] {
        if let Some(stripped) = text.strip_prefix(marker) {
            text = stripped.to_string();
            break;
        }
    }

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use crate::llm::testing::ScriptedLlm;

    use super::*;

    #[test]
    fn test_clean_summary_strips_leading_phrase() {
        assert_eq!(
            clean_summary("Here is the summary: The server is down."),
            "The server is down."
        );
        assert_eq!(
            clean_summary("Summary: Review the attached contract."),
            "Review the attached contract."
        );
    }

    #[test]
    fn test_clean_summary_strips_list_marker() {
        assert_eq!(clean_summary("- First point about the email"), "First point about the email");
    }

    #[test]
    fn test_clean_summary_passthrough() {
        assert_eq!(clean_summary("Plain summary text."), "Plain summary text.");
    }

    #[tokio::test]
    async fn test_summarize_returns_error_sentinel_on_failure() {
        // An exhausted script stands in for a dead provider.
        let llm = ScriptedLlm::new(vec![]);
        let email = ParsedEmail {
            id: "m1".to_string(),
            body_text: "body".to_string(),
            ..Default::default()
        };

        let summary = summarize_email(&llm, &email, SummaryType::Standard).await;
        assert!(summary.starts_with("Error:"));
    }

    #[test]
    fn test_summary_type_display() {
        assert_eq!(SummaryType::ActionFocused.to_string(), "action_focused");
        assert_eq!(SummaryType::Standard.to_string(), "standard");
    }
}
