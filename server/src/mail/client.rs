extern crate google_gmail1 as gmail1;

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use gmail1::api::{Label, ListLabelsResponse, ListMessagesResponse, Message, Profile, Thread};
use leaky_bucket::RateLimiter;
use serde_json::json;

use crate::{
    error::{AppError, AppResult},
    retry::with_backoff,
};

use super::{parse::parse_message, MailPort, ParsedEmail, MAIL_DEADLINE};

macro_rules! gmail_url {
    ($($params:expr),*) => {
        {
            const GMAIL_ENDPOINT: &str = "https://www.googleapis.com/gmail/v1/users/me";
            let list_params = vec![$($params),*];
            let path = list_params.join("/");
            format!("{}/{}", GMAIL_ENDPOINT, path)
        }
    };
}

// Gmail measures API usage in quota units per method.
const QUOTA_PER_SECOND: usize = 250;
const QUOTA_MESSAGES_LIST: usize = 5;
const QUOTA_MESSAGES_GET: usize = 5;
const QUOTA_MESSAGES_MODIFY: usize = 5;
const QUOTA_MESSAGES_SEND: usize = 100;
const QUOTA_THREADS_GET: usize = 10;
const QUOTA_LABELS_LIST: usize = 1;
const QUOTA_LABELS_CREATE: usize = 5;
const QUOTA_GET_PROFILE: usize = 1;

#[derive(Debug, Clone)]
pub struct MessageMeta {
    pub id: String,
    pub thread_id: String,
}

pub struct GmailClient {
    http_client: reqwest::Client,
    access_token: String,
    rate_limiter: RateLimiter,
}

impl GmailClient {
    pub fn new(http_client: reqwest::Client, access_token: String) -> GmailClient {
        let rate_limiter = RateLimiter::builder()
            .initial(QUOTA_PER_SECOND)
            .interval(Duration::from_secs(1))
            .refill(QUOTA_PER_SECOND)
            .build();

        GmailClient {
            http_client,
            access_token,
            rate_limiter,
        }
    }

    /// Lists message ids matching the label set and optional search query,
    /// paging until `max_results` ids are collected.
    pub async fn list_messages(
        &self,
        label_ids: &[&str],
        query: Option<&str>,
        max_results: u32,
    ) -> AppResult<Vec<MessageMeta>> {
        let mut collected = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            self.rate_limiter.acquire(QUOTA_MESSAGES_LIST).await;

            let mut params: Vec<(String, String)> = label_ids
                .iter()
                .map(|l| ("labelIds".to_string(), l.to_string()))
                .collect();
            params.push((
                "maxResults".to_string(),
                max_results.min(500).to_string(),
            ));
            if let Some(q) = query {
                params.push(("q".to_string(), q.to_string()));
            }
            if let Some(token) = page_token.as_ref() {
                params.push(("pageToken".to_string(), token.clone()));
            }

            let resp = with_backoff("gmail messages.list", || async {
                let resp = self
                    .http_client
                    .get(gmail_url!("messages"))
                    .query(&params)
                    .bearer_auth(&self.access_token)
                    .timeout(MAIL_DEADLINE)
                    .send()
                    .await?
                    .error_for_status()?;

                Ok(resp.json::<ListMessagesResponse>().await?)
            })
            .await?;

            page_token = resp.next_page_token.clone();
            for msg in resp.messages.unwrap_or_default() {
                if collected.len() >= max_results as usize {
                    break;
                }
                if let Some(id) = msg.id {
                    collected.push(MessageMeta {
                        id,
                        thread_id: msg.thread_id.unwrap_or_default(),
                    });
                }
            }

            if page_token.is_none() || collected.len() >= max_results as usize {
                break;
            }
        }

        Ok(collected)
    }

    pub async fn get_message(&self, message_id: &str) -> AppResult<Message> {
        self.rate_limiter.acquire(QUOTA_MESSAGES_GET).await;

        let msg = with_backoff("gmail messages.get", || async {
            let resp = self
                .http_client
                .get(gmail_url!("messages", message_id))
                .query(&[("format", "full")])
                .bearer_auth(&self.access_token)
                .timeout(MAIL_DEADLINE)
                .send()
                .await?
                .error_for_status()?;

            Ok(resp.json::<Message>().await?)
        })
        .await?;

        Ok(msg)
    }

    pub async fn get_parsed_message(&self, message_id: &str) -> AppResult<ParsedEmail> {
        let msg = self.get_message(message_id).await?;
        parse_message(&msg)
            .context("Message has no id")
            .map_err(AppError::Internal)
    }

    pub async fn modify_labels(
        &self,
        message_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> AppResult<()> {
        self.rate_limiter.acquire(QUOTA_MESSAGES_MODIFY).await;

        let body = json!({
            "addLabelIds": add_label_ids,
            "removeLabelIds": remove_label_ids,
        });

        let data = self
            .http_client
            .post(gmail_url!("messages", message_id, "modify"))
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
                "Error modifying labels: {:?}",
                data
            )));
        }

        Ok(())
    }

    pub async fn send_message(&self, raw_b64u: String) -> AppResult<()> {
        self.rate_limiter.acquire(QUOTA_MESSAGES_SEND).await;

        let data = self
            .http_client
            .post(gmail_url!("messages", "send"))
            .bearer_auth(&self.access_token)
            .timeout(MAIL_DEADLINE)
            .json(&json!({ "raw": raw_b64u }))
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;

        if data.get("error").is_some() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Error sending message: {:?}",
                data
            )));
        }

        Ok(())
    }

    /// Metadata for every message in a thread, oldest first.
    pub async fn list_thread_messages(&self, thread_id: &str) -> AppResult<Vec<Message>> {
        self.rate_limiter.acquire(QUOTA_THREADS_GET).await;

        let thread = with_backoff("gmail threads.get", || async {
            let resp = self
                .http_client
                .get(gmail_url!("threads", thread_id))
                .query(&[("format", "metadata")])
                .bearer_auth(&self.access_token)
                .timeout(MAIL_DEADLINE)
                .send()
                .await?
                .error_for_status()?;

            Ok(resp.json::<Thread>().await?)
        })
        .await?;

        Ok(thread.messages.unwrap_or_default())
    }

    pub async fn list_sent_messages(
        &self,
        newer_than_days: i64,
        max_results: u32,
    ) -> AppResult<Vec<MessageMeta>> {
        let query = format!("newer_than:{newer_than_days}d");
        self.list_messages(&["SENT"], Some(&query), max_results)
            .await
    }

    pub async fn get_labels(&self) -> AppResult<Vec<Label>> {
        self.rate_limiter.acquire(QUOTA_LABELS_LIST).await;

        let resp = self
            .http_client
            .get(gmail_url!("labels"))
            .bearer_auth(&self.access_token)
            .timeout(MAIL_DEADLINE)
            .send()
            .await?
            .error_for_status()?;
        let data = resp.json::<ListLabelsResponse>().await?;

        Ok(data.labels.unwrap_or_default())
    }

    pub async fn create_label(&self, name: &str) -> AppResult<Label> {
        self.rate_limiter.acquire(QUOTA_LABELS_CREATE).await;

        let label = Label {
            name: Some(name.to_string()),
            type_: Some("user".to_string()),
            message_list_visibility: Some("show".to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            ..Default::default()
        };

        let data = self
            .http_client
            .post(gmail_url!("labels"))
            .bearer_auth(&self.access_token)
            .timeout(MAIL_DEADLINE)
            .json(&label)
            .send()
            .await?
            .json::<serde_json::Value>()
            .await?;

        if data.get("error").is_some() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Error creating label: {:?}",
                data
            )));
        }

        Ok(serde_json::from_value(data).context("Unexpected label response")?)
    }

    pub async fn get_profile(&self) -> AppResult<Profile> {
        self.rate_limiter.acquire(QUOTA_GET_PROFILE).await;

        let resp = self
            .http_client
            .get("https://www.googleapis.com/gmail/v1/users/me/profile")
            .bearer_auth(&self.access_token)
            .timeout(MAIL_DEADLINE)
            .send()
            .await?
            .error_for_status()?;

        Ok(resp.json::<Profile>().await?)
    }
}

#[async_trait]
impl MailPort for GmailClient {
    async fn remove_labels(&self, message_id: &str, label_ids: &[String]) -> AppResult<()> {
        self.modify_labels(message_id, &[], label_ids).await
    }

    async fn add_labels(&self, message_id: &str, label_ids: &[String]) -> AppResult<()> {
        self.modify_labels(message_id, label_ids, &[]).await
    }

    async fn send_raw(&self, raw_b64u: String) -> AppResult<()> {
        self.send_message(raw_b64u).await
    }

    async fn resolve_label_id(&self, name: &str) -> AppResult<String> {
        let existing = self.get_labels().await?;
        if let Some(label) = existing.iter().find(|l| l.name.as_deref() == Some(name)) {
            return Ok(label.id.clone().unwrap_or_default());
        }

        // Nested names need each parent in place before the leaf.
        let mut created_id = String::new();
        for prefix in label_path_prefixes(name) {
            let known = existing
                .iter()
                .any(|l| l.name.as_deref() == Some(prefix.as_str()));
            if known {
                continue;
            }
            let label = self.create_label(&prefix).await?;
            created_id = label.id.unwrap_or_default();
        }

        Ok(created_id)
    }
}

/// `Priority/High` -> `["Priority", "Priority/High"]`
pub fn label_path_prefixes(name: &str) -> Vec<String> {
    let mut prefixes = Vec::new();
    let mut current = String::new();
    for segment in name.split('/').filter(|s| !s.is_empty()) {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);
        prefixes.push(current.clone());
    }
    prefixes
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_gmail_url() {
        let url = gmail_url!("messages");
        assert_eq!(url, "https://www.googleapis.com/gmail/v1/users/me/messages");
        let url = gmail_url!("messages", "123", "modify");
        assert_eq!(
            url,
            "https://www.googleapis.com/gmail/v1/users/me/messages/123/modify"
        );
    }

    #[test]
    fn test_label_path_prefixes() {
        assert_eq!(
            super::label_path_prefixes("Priority/High"),
            vec!["Priority".to_string(), "Priority/High".to_string()]
        );
        assert_eq!(
            super::label_path_prefixes("Simple"),
            vec!["Simple".to_string()]
        );
    }
}
