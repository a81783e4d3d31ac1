use indoc::indoc;
use serde::{Deserialize, Serialize};

use crate::{
    llm::{json::parse_json_response, LlmClient},
    mail::{sanitize_for_prompt, ParsedEmail},
    server_config::cfg,
};

pub const PURPOSES: [&str; 8] = [
    "promotion",
    "transactional",
    "social",
    "alert",
    "personal",
    "forum_digest",
    "action_required",
    "information",
];

pub const UNKNOWN_PURPOSE: &str = "Unknown";

/// Structured LLM read of one email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailAnalysis {
    pub urgency_score: i32,
    pub purpose: String,
    pub response_needed: bool,
    pub estimated_time: i32,
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    urgency_score: Option<i32>,
    purpose: Option<String>,
    response_needed: Option<bool>,
    estimated_time: Option<i32>,
}

const ANALYSIS_SYSTEM_PROMPT: &str = indoc! {r#"
    You are an email analysis agent that helps a user triage their inbox.

    Analyze the provided email and output a single, valid JSON object with these fields:
    1. "urgency_score": an integer from 1 (very low) to 5 (very high).
    2. "purpose": exactly one of: "promotion", "transactional", "social", "alert",
       "personal", "forum_digest", "action_required", "information".
    3. "response_needed": a boolean, true if the email likely requires a response.
    4. "estimated_time": an integer, the estimated minutes needed to properly address this email.

    Category guide:
    - promotion: marketing, newsletters, sales offers, product announcements.
      An invoice is NOT a promotion (transactional); a security notice is NOT a promotion (alert).
    - transactional: automated receipts, invoices, shipping notices, purchase confirmations.
    - social: notifications from social platforms. A direct personal message from a person is "personal".
    - alert: security warnings, account activity, system alerts.
    - personal: direct person-to-person conversation unrelated to automated systems.
    - forum_digest: digests from forums, mailing lists or groups.
    - action_required: the user must perform a specific action, often with a deadline. High signal.
    - information: informational content that fits nowhere else and needs no action.

    Weigh the sender, explicit requests, questions, and deadlines when scoring urgency.
    Output ONLY the JSON object with no introductory or explanatory text."#};

/// Asks the model for urgency/purpose/response/time. Returns None when the
/// body is empty, the model is unreachable, or the reply never parses; the
/// pipeline continues without analysis in all of these cases.
pub async fn analyze_email(llm: &dyn LlmClient, email: &ParsedEmail) -> Option<EmailAnalysis> {
    if email.body_text.trim().is_empty() {
        tracing::debug!("Email {} body is empty, skipping analysis", email.id);
        return None;
    }

    let body = sanitize_for_prompt(&email.body_text);
    let truncated: String = body
        .chars()
        .take(cfg.llm_settings.analysis_max_input_chars)
        .collect();

    let user_prompt = format!(
        "Analyze the following email based on the system instructions.\n\n\
         Email Information:\n- From: {}\n- Subject: {}\n\n\
         Email Content:\n---\n{}\n---\n\nOutput ONLY the JSON object. JSON Output:",
        email.sender, email.subject, truncated
    );

    // One retry on a reply that refuses to parse as JSON.
    for attempt in 0..2 {
        let raw = match llm
            .complete(
                ANALYSIS_SYSTEM_PROMPT,
                &user_prompt,
                cfg.llm_settings.analysis_max_tokens,
                cfg.llm_settings.analysis_temperature,
            )
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("LLM analysis failed for {}: {:?}", email.id, e);
                return None;
            }
        };

        match parse_json_response::<RawAnalysis>(&raw) {
            Some(parsed) => return validate_analysis(parsed),
            None if attempt == 0 => {
                tracing::warn!("Analysis reply for {} was not valid JSON, retrying", email.id);
            }
            None => {
                tracing::warn!("Analysis reply for {} was not valid JSON", email.id);
            }
        }
    }

    None
}

/// Full fields are required; a reply carrying only urgency and purpose is
/// salvaged with conservative defaults.
fn validate_analysis(raw: RawAnalysis) -> Option<EmailAnalysis> {
    let urgency_score = raw.urgency_score?;
    let purpose = raw.purpose?;
    if !(1..=5).contains(&urgency_score) || purpose.trim().is_empty() {
        return None;
    }

    Some(EmailAnalysis {
        urgency_score,
        purpose,
        response_needed: raw.response_needed.unwrap_or(false),
        estimated_time: raw.estimated_time.unwrap_or(5),
    })
}

#[cfg(test)]
mod tests {
    use crate::llm::testing::ScriptedLlm;

    use super::*;

    fn email_with_body(body: &str) -> ParsedEmail {
        ParsedEmail {
            id: "m1".to_string(),
            sender: "a@b.com".to_string(),
            subject: "subject".to_string(),
            body_text: body.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_valid_json_is_parsed() {
        let llm = ScriptedLlm::new(vec![
            r#"{"urgency_score": 4, "purpose": "action_required", "response_needed": true, "estimated_time": 15}"#,
        ]);

        let analysis = analyze_email(&llm, &email_with_body("please review the doc"))
            .await
            .unwrap();
        assert_eq!(analysis.urgency_score, 4);
        assert_eq!(analysis.purpose, "action_required");
        assert!(analysis.response_needed);
    }

    #[tokio::test]
    async fn test_fenced_json_is_accepted() {
        let llm = ScriptedLlm::new(vec![
            "```json\n{\"urgency_score\": 2, \"purpose\": \"promotion\", \"response_needed\": false, \"estimated_time\": 1}\n```",
        ]);

        let analysis = analyze_email(&llm, &email_with_body("big sale")).await.unwrap();
        assert_eq!(analysis.purpose, "promotion");
    }

    #[tokio::test]
    async fn test_partial_reply_is_salvaged() {
        let llm = ScriptedLlm::new(vec![r#"{"urgency_score": 3, "purpose": "information"}"#]);

        let analysis = analyze_email(&llm, &email_with_body("fyi")).await.unwrap();
        assert!(!analysis.response_needed);
        assert_eq!(analysis.estimated_time, 5);
    }

    #[tokio::test]
    async fn test_unparseable_reply_retries_once() {
        let llm = ScriptedLlm::new(vec![
            "I think this email is quite urgent.",
            r#"{"urgency_score": 5, "purpose": "alert", "response_needed": true, "estimated_time": 10}"#,
        ]);

        let analysis = analyze_email(&llm, &email_with_body("server down")).await.unwrap();
        assert_eq!(analysis.urgency_score, 5);
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_body_skips_llm() {
        let llm = ScriptedLlm::new(vec![]);
        assert!(analyze_email(&llm, &email_with_body("   ")).await.is_none());
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_urgency_is_rejected() {
        let llm = ScriptedLlm::new(vec![
            r#"{"urgency_score": 9, "purpose": "alert", "response_needed": false, "estimated_time": 5}"#,
            r#"{"urgency_score": 9, "purpose": "alert", "response_needed": false, "estimated_time": 5}"#,
        ]);
        assert!(analyze_email(&llm, &email_with_body("hm")).await.is_none());
    }
}
