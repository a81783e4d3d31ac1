use once_cell::sync::Lazy;
use regex::Regex;

static RE_BRACKET_DOMAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<.+@([\w.-]+)>").unwrap());
static RE_AT_DOMAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"@([\w.-]+)").unwrap());
static RE_ANGLE_ADDR: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(.+?)>").unwrap());
static RE_BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<.*?>").unwrap());
static RE_NON_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s.-]").unwrap());

/// Domain of the sender address, or a cleaned fallback when no address is
/// recognizable.
pub fn extract_domain(sender: &str) -> String {
    if let Some(caps) = RE_BRACKET_DOMAIN.captures(sender) {
        return caps[1].to_lowercase();
    }
    if let Some(caps) = RE_AT_DOMAIN.captures(sender) {
        return caps[1].to_lowercase();
    }
    let cleaned = RE_BRACKETS.replace_all(sender, "").trim().to_lowercase();
    if cleaned.is_empty() {
        "unknown_sender".to_string()
    } else {
        cleaned
    }
}

/// Canonical key for a sender header: the address inside `<...>` when
/// present, else the local part of a bare address, else the cleaned string.
/// Feedback rows and the reasoning engine must agree on this exactly.
pub fn sender_key(sender: &str) -> String {
    let sender = sender.to_lowercase();
    if let Some(caps) = RE_ANGLE_ADDR.captures(&sender) {
        return caps[1].to_lowercase();
    }
    let key = match sender.split_once('@') {
        Some((local, _)) => local.to_string(),
        None => sender,
    };
    RE_NON_KEY.replace_all(&key, "").trim().to_string()
}

/// Inputs to the trained classifier for one email.
#[derive(Debug, Clone)]
pub struct EmailFeatures {
    pub text_features: String,
    pub llm_purpose: String,
    pub sender_domain: String,
    pub llm_urgency: f64,
}

impl EmailFeatures {
    pub fn new(
        subject: &str,
        body_text: &str,
        sender: &str,
        llm_purpose: Option<&str>,
        llm_urgency: Option<i32>,
    ) -> Self {
        Self {
            text_features: format!("{subject} {body_text}").to_lowercase(),
            llm_purpose: llm_purpose.unwrap_or("Unknown").to_string(),
            sender_domain: extract_domain(sender),
            llm_urgency: llm_urgency.unwrap_or(0) as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain_from_brackets() {
        assert_eq!(extract_domain("Acme Boss <boss@acme.com>"), "acme.com");
    }

    #[test]
    fn test_extract_domain_bare_address() {
        assert_eq!(extract_domain("news@updates.example.org"), "updates.example.org");
    }

    #[test]
    fn test_extract_domain_no_address() {
        assert_eq!(extract_domain("Mailer Daemon"), "mailer daemon");
        assert_eq!(extract_domain(""), "unknown_sender");
    }

    #[test]
    fn test_sender_key_from_display_header() {
        assert_eq!(sender_key("\"Acme Boss\" <Boss@Acme.com>"), "boss@acme.com");
    }

    #[test]
    fn test_sender_key_bare_address_uses_local_part() {
        assert_eq!(sender_key("newsletter@list.example.com"), "newsletter");
    }

    #[test]
    fn test_sender_key_plain_name() {
        assert_eq!(sender_key("Some Person!"), "some person");
    }
}
