use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

static RE_FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").unwrap());

/// Models wrap JSON in markdown fences no matter how firmly the prompt says
/// not to. Strip a full-text fence before parsing.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("```") && trimmed.ends_with("```") {
        let lines: Vec<&str> = trimmed.lines().collect();
        if lines.len() > 2 {
            return lines[1..lines.len() - 1].join("\n").trim().to_string();
        }
        if let Some(caps) = RE_FENCED_JSON.captures(trimmed) {
            return caps[1].trim().to_string();
        }
        return trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
            .to_string();
    }
    trimmed.to_string()
}

/// Strict JSON parse with fence stripping. A second pass salvages a JSON
/// object embedded in surrounding prose.
pub fn parse_json_response<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let cleaned = strip_code_fences(raw);
    if let Ok(value) = serde_json::from_str::<T>(&cleaned) {
        return Some(value);
    }

    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if start < end {
        serde_json::from_str::<T>(&cleaned[start..=end]).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        urgency_score: i32,
        purpose: String,
    }

    #[test]
    fn test_bare_json_parses() {
        let parsed: Sample =
            parse_json_response(r#"{"urgency_score": 4, "purpose": "alert"}"#).unwrap();
        assert_eq!(parsed.urgency_score, 4);
    }

    #[test]
    fn test_fenced_json_parses() {
        let raw = "```json\n{\"urgency_score\": 2, \"purpose\": \"promotion\"}\n```";
        let parsed: Sample = parse_json_response(raw).unwrap();
        assert_eq!(parsed.purpose, "promotion");
    }

    #[test]
    fn test_json_with_prose_salvaged() {
        let raw = "Sure! Here you go: {\"urgency_score\": 1, \"purpose\": \"social\"} Hope that helps.";
        let parsed: Sample = parse_json_response(raw).unwrap();
        assert_eq!(parsed.purpose, "social");
    }

    #[test]
    fn test_garbage_is_none() {
        assert!(parse_json_response::<Sample>("not json at all").is_none());
    }

    #[test]
    fn test_strip_fences_without_language_tag() {
        let raw = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(raw), "{\"a\": 1}");
    }
}
