use std::collections::HashSet;
use std::{fmt, str::FromStr};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub const GMAIL_CATEGORY_LABELS: [&str; 4] = [
    "CATEGORY_PERSONAL",
    "CATEGORY_SOCIAL",
    "CATEGORY_PROMOTIONS",
    "CATEGORY_UPDATES",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessScopes {
    AllGmail,
    Compose,
    Insert,
    Labels,
    Metadata,
    Modify,
    Readonly,
    Send,
    CalendarEvents,
    CalendarEventsReadonly,
}

impl AccessScopes {
    pub fn as_url(&self) -> &'static str {
        match self {
            AccessScopes::AllGmail => "https://mail.google.com/",
            AccessScopes::Compose => "https://www.googleapis.com/auth/gmail.compose",
            AccessScopes::Insert => "https://www.googleapis.com/auth/gmail.insert",
            AccessScopes::Labels => "https://www.googleapis.com/auth/gmail.labels",
            AccessScopes::Metadata => "https://www.googleapis.com/auth/gmail.metadata",
            AccessScopes::Modify => "https://www.googleapis.com/auth/gmail.modify",
            AccessScopes::Readonly => "https://www.googleapis.com/auth/gmail.readonly",
            AccessScopes::Send => "https://www.googleapis.com/auth/gmail.send",
            AccessScopes::CalendarEvents => "https://www.googleapis.com/auth/calendar.events",
            AccessScopes::CalendarEventsReadonly => {
                "https://www.googleapis.com/auth/calendar.events.readonly"
            }
        }
    }
}

impl FromStr for AccessScopes {
    type Err = AccessScopesParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "https://mail.google.com/" => Ok(AccessScopes::AllGmail),
            "https://www.googleapis.com/auth/gmail.compose" => Ok(AccessScopes::Compose),
            "https://www.googleapis.com/auth/gmail.insert" => Ok(AccessScopes::Insert),
            "https://www.googleapis.com/auth/gmail.labels" => Ok(AccessScopes::Labels),
            "https://www.googleapis.com/auth/gmail.metadata" => Ok(AccessScopes::Metadata),
            "https://www.googleapis.com/auth/gmail.modify" => Ok(AccessScopes::Modify),
            "https://www.googleapis.com/auth/gmail.readonly" => Ok(AccessScopes::Readonly),
            "https://www.googleapis.com/auth/gmail.send" => Ok(AccessScopes::Send),
            "https://www.googleapis.com/auth/calendar.events" => Ok(AccessScopes::CalendarEvents),
            "https://www.googleapis.com/auth/calendar.events.readonly" => {
                Ok(AccessScopes::CalendarEventsReadonly)
            }
            _ => Err(AccessScopesParseError),
        }
    }
}

impl fmt::Display for AccessScopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_url())
    }
}

#[derive(Debug)]
pub struct AccessScopesParseError;

impl fmt::Display for AccessScopesParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid access scope")
    }
}

impl std::error::Error for AccessScopesParseError {}

/// Scopes the agent cannot operate without: mail modify (covers list, get,
/// label and archive operations) plus calendar event access for drafts.
pub static REQUIRED_SCOPES: Lazy<HashSet<AccessScopes>> = Lazy::new(|| {
    HashSet::from([
        AccessScopes::Modify,
        AccessScopes::Send,
        AccessScopes::CalendarEvents,
    ])
});

/// True when the persisted grant still covers every required scope. A grant
/// that fails this check must be discarded and re-consented.
pub fn scopes_satisfy_required(granted: &[String]) -> bool {
    let granted = granted
        .iter()
        .filter_map(|s| AccessScopes::from_str(s).ok())
        .collect::<HashSet<_>>();

    if granted.contains(&AccessScopes::AllGmail) {
        return granted.contains(&AccessScopes::CalendarEvents);
    }

    REQUIRED_SCOPES.iter().all(|s| granted.contains(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_parse_roundtrip() {
        let scope = AccessScopes::from_str("https://www.googleapis.com/auth/gmail.modify").unwrap();
        assert_eq!(scope, AccessScopes::Modify);
        assert_eq!(scope.as_url(), "https://www.googleapis.com/auth/gmail.modify");
    }

    #[test]
    fn test_scopes_satisfy_required() {
        let granted = vec![
            "https://www.googleapis.com/auth/gmail.modify".to_string(),
            "https://www.googleapis.com/auth/gmail.send".to_string(),
            "https://www.googleapis.com/auth/calendar.events".to_string(),
        ];
        assert!(scopes_satisfy_required(&granted));
    }

    #[test]
    fn test_scope_drift_detected() {
        // A grant downgraded to readonly no longer satisfies the agent.
        let granted = vec![
            "https://www.googleapis.com/auth/gmail.readonly".to_string(),
            "https://www.googleapis.com/auth/calendar.events".to_string(),
        ];
        assert!(!scopes_satisfy_required(&granted));
    }

    #[test]
    fn test_all_gmail_covers_mail_scopes() {
        let granted = vec![
            "https://mail.google.com/".to_string(),
            "https://www.googleapis.com/auth/calendar.events".to_string(),
        ];
        assert!(scopes_satisfy_required(&granted));
    }
}
