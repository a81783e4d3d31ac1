extern crate google_gmail1 as gmail1;

use chrono::{DateTime, TimeZone, Utc};
use gmail1::api::{Message, MessagePart};
use mail_parser::MessageParser;
use once_cell::sync::Lazy;
use regex::Regex;

/// Stored in place of a body that defeated every decode attempt. The record
/// still persists; only the text is lost.
pub const HTML_PARSE_SENTINEL: &str = "[Could not parse HTML content]";

const HTML_RENDER_WIDTH: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct ParsedEmail {
    pub id: String,
    pub thread_id: String,
    pub sender: String,
    pub subject: String,
    pub received_at: Option<DateTime<Utc>>,
    pub snippet: String,
    pub body_text: String,
    pub body_html: String,
    pub labels: Vec<String>,
    pub is_read: bool,
    pub is_starred: bool,
    pub is_archived: bool,
}

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\r\t\n]+").unwrap());
static RE_NON_UNICODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\x00-\x80]").unwrap());
static RE_HTTP_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://(www\.)?[-a-zA-Z0-9@:%._\+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b([-a-zA-Z0-9()@:%_\+.~#?&//=]*)").unwrap()
});

/// Collapses whitespace runs and non-ASCII noise out of header-ish strings.
pub fn sanitize_line(s: &str) -> String {
    let s = RE_WHITESPACE.replace_all(s, " ");
    let s = RE_NON_UNICODE.replace_all(&s, "");
    s.trim().to_string()
}

/// Body text as fed to the LLM: links add nothing but tokens.
pub fn sanitize_for_prompt(body: &str) -> String {
    let b = RE_WHITESPACE.replace_all(body, " ");
    let b = RE_HTTP_LINK.replace_all(&b, "[LINK]");
    b.trim().to_string()
}

/// Parses a Gmail message into a [`ParsedEmail`]. Decoding failures degrade
/// to sentinels rather than dropping the record; only a message without an
/// id is unusable.
pub fn parse_message(msg: &Message) -> Option<ParsedEmail> {
    let id = msg.id.clone()?;
    let labels = msg.label_ids.clone().unwrap_or_default();

    let mut email = ParsedEmail {
        id,
        thread_id: msg.thread_id.clone().unwrap_or_default(),
        snippet: sanitize_line(msg.snippet.as_deref().unwrap_or_default()),
        received_at: msg
            .internal_date
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        is_read: !labels.iter().any(|l| l == "UNREAD"),
        is_starred: labels.iter().any(|l| l == "STARRED"),
        is_archived: !labels.iter().any(|l| l == "INBOX"),
        labels,
        ..Default::default()
    };

    if let Some(payload) = msg.payload.as_ref() {
        for header in payload.headers.iter().flatten() {
            let value = header.value.as_deref().unwrap_or_default();
            match header.name.as_deref().map(|n| n.to_ascii_lowercase()) {
                Some(name) if name == "subject" => email.subject = sanitize_line(value),
                Some(name) if name == "from" => email.sender = value.trim().to_string(),
                _ => {}
            }
        }

        collect_part(payload, &mut email);
    } else if let Some(raw) = msg.raw.as_ref() {
        // Raw-format fetches skip the structured payload entirely.
        if let Some(parsed) = MessageParser::default().parse(raw) {
            email.subject = parsed.subject().map(sanitize_line).unwrap_or_default();
            email.body_text = parsed.body_text(0).map(|b| b.to_string()).unwrap_or_default();
            email.body_html = parsed.body_html(0).map(|b| b.to_string()).unwrap_or_default();
        }
        email.sender = raw_from_header(raw).unwrap_or_default();
    }

    if email.body_text.trim().is_empty() && !email.body_html.trim().is_empty() {
        email.body_text = html_to_text(&email.body_html);
    }

    email.body_text = email.body_text.trim().to_string();
    email.body_html = email.body_html.trim().to_string();

    Some(email)
}

/// The From header line out of a raw RFC 822 message.
fn raw_from_header(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    text.lines()
        .take_while(|line| !line.trim().is_empty())
        .find(|line| line.len() > 5 && line[..5].eq_ignore_ascii_case("from:"))
        .map(|line| line[5..].trim().to_string())
}

fn collect_part(part: &MessagePart, email: &mut ParsedEmail) {
    if let Some(parts) = part.parts.as_ref() {
        for sub in parts {
            collect_part(sub, email);
        }
        return;
    }

    let data = part.body.as_ref().and_then(|b| b.data.as_ref());
    let Some(data) = data else {
        return;
    };

    let text = decode_body_bytes(data);
    match part.mime_type.as_deref() {
        Some("text/plain") => {
            email.body_text.push_str(&text);
            email.body_text.push('\n');
        }
        Some("text/html") => {
            email.body_html.push_str(&text);
            email.body_html.push('\n');
        }
        _ => {}
    }
}

/// UTF-8 first, latin-1 as the fallback; replacement characters only when
/// both readings fail.
pub fn decode_body_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            if bytes.iter().all(|b| *b < 0x80 || *b >= 0xa0) {
                bytes.iter().map(|b| *b as char).collect()
            } else {
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}

pub fn html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return HTML_PARSE_SENTINEL.to_string();
    }

    let text = html2text::from_read(html.as_bytes(), HTML_RENDER_WIDTH);
    if text.trim().is_empty() {
        HTML_PARSE_SENTINEL.to_string()
    } else {
        text.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use gmail1::api::{MessagePart, MessagePartBody, MessagePartHeader};

    use super::*;

    fn header(name: &str, value: &str) -> MessagePartHeader {
        MessagePartHeader {
            name: Some(name.to_string()),
            value: Some(value.to_string()),
        }
    }

    fn part(mime: &str, data: &[u8]) -> MessagePart {
        MessagePart {
            mime_type: Some(mime.to_string()),
            body: Some(MessagePartBody {
                data: Some(data.to_vec()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn base_message() -> Message {
        Message {
            id: Some("m1".to_string()),
            thread_id: Some("t1".to_string()),
            snippet: Some("hello\nthere".to_string()),
            label_ids: Some(vec!["INBOX".to_string(), "UNREAD".to_string()]),
            internal_date: Some(1_739_000_000_000),
            ..Default::default()
        }
    }

    #[test]
    fn test_plain_text_preferred() {
        let mut msg = base_message();
        msg.payload = Some(MessagePart {
            headers: Some(vec![
                header("Subject", "Quarterly sync"),
                header("From", "Jo <jo@acme.com>"),
            ]),
            parts: Some(vec![
                part("text/plain", b"plain body"),
                part("text/html", b"<p>html body</p>"),
            ]),
            ..Default::default()
        });

        let parsed = parse_message(&msg).unwrap();
        assert_eq!(parsed.subject, "Quarterly sync");
        assert_eq!(parsed.sender, "Jo <jo@acme.com>");
        assert_eq!(parsed.body_text, "plain body");
        assert!(parsed.body_html.contains("html body"));
        assert!(!parsed.is_read);
        assert!(!parsed.is_archived);
    }

    #[test]
    fn test_html_only_falls_back_to_stripped_text() {
        let mut msg = base_message();
        msg.payload = Some(MessagePart {
            headers: Some(vec![header("Subject", "Offer")]),
            parts: Some(vec![part("text/html", b"<p>Only <b>html</b> here</p>")]),
            ..Default::default()
        });

        let parsed = parse_message(&msg).unwrap();
        assert!(parsed.body_text.contains("Only"));
        assert!(parsed.body_text.contains("html"));
    }

    #[test]
    fn test_empty_html_yields_sentinel() {
        assert_eq!(html_to_text("   "), HTML_PARSE_SENTINEL);
    }

    #[test]
    fn test_latin1_body_decodes() {
        // 0xe9 is 'é' in latin-1 and invalid standalone UTF-8.
        let decoded = decode_body_bytes(b"caf\xe9");
        assert_eq!(decoded, "café");
    }

    #[test]
    fn test_label_booleans() {
        let mut msg = base_message();
        msg.label_ids = Some(vec!["STARRED".to_string()]);
        msg.payload = Some(MessagePart::default());

        let parsed = parse_message(&msg).unwrap();
        assert!(parsed.is_read);
        assert!(parsed.is_starred);
        assert!(parsed.is_archived);
    }

    #[test]
    fn test_sanitize_for_prompt_replaces_links() {
        let body = "see\nhttps://example.com/offer?id=1 now";
        let cleaned = sanitize_for_prompt(body);
        assert_eq!(cleaned, "see [LINK] now");
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let msg = Message::default();
        assert!(parse_message(&msg).is_none());
    }

    #[test]
    fn test_parse_preserves_serialized_message() {
        let mime = lettre::Message::builder()
            .from("Jo Doe <jo@acme.com>".parse().unwrap())
            .to("Me <me@example.com>".parse().unwrap())
            .subject("Budget review")
            .body("Please review the budget by Friday.".to_string())
            .unwrap();

        let msg = Message {
            id: Some("m9".to_string()),
            raw: Some(mime.formatted()),
            ..Default::default()
        };

        let parsed = parse_message(&msg).unwrap();
        assert_eq!(parsed.id, "m9");
        assert_eq!(parsed.subject, "Budget review");
        assert!(parsed.sender.contains("jo@acme.com"));
        assert_eq!(
            parsed.body_text.trim(),
            "Please review the budget by Friday."
        );
    }
}
