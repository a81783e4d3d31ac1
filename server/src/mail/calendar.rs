use chrono::{DateTime, Utc};
use serde_json::json;

use crate::error::{AppError, AppResult};

use super::MAIL_DEADLINE;

const CALENDAR_ENDPOINT: &str =
    "https://www.googleapis.com/calendar/v3/calendars/primary/events";

pub struct CalendarClient {
    http_client: reqwest::Client,
    access_token: String,
}

impl CalendarClient {
    pub fn new(http_client: reqwest::Client, access_token: String) -> Self {
        Self {
            http_client,
            access_token,
        }
    }

    pub async fn create_event(
        &self,
        summary: &str,
        description: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<String> {
        let body = json!({
            "summary": summary,
            "description": description,
            "start": { "dateTime": start.to_rfc3339() },
            "end": { "dateTime": end.to_rfc3339() },
        });

        let data = self
            .http_client
            .post(CALENDAR_ENDPOINT)
            .bearer_auth(&self.access_token)
            .timeout(MAIL_DEADLINE)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;

        if data.get("error").is_some() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Error creating calendar event: {:?}",
                data
            )));
        }

        Ok(data
            .get("id")
            .and_then(|id| id.as_str())
            .unwrap_or_default()
            .to_string())
    }
}
