use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    error::{AppError, AppResult},
    rate_limiters::RateLimiters,
    server_config::cfg,
    HttpClient,
};

use super::{LlmClient, LLM_DEADLINE};

const AI_ENDPOINT: &str = "https://api.mistral.ai/v1/chat/completions";

const MAX_RETRIES: usize = 3;
const RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

pub struct MistralClient {
    http_client: HttpClient,
    rate_limiters: RateLimiters,
}

impl MistralClient {
    pub fn new(http_client: HttpClient, rate_limiters: RateLimiters) -> Self {
        Self {
            http_client,
            rate_limiters,
        }
    }

    async fn send_prompt(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> AppResult<String> {
        self.rate_limiters.acquire_one().await;

        let resp = self
            .http_client
            .post(AI_ENDPOINT)
            .bearer_auth(&cfg.api.key)
            .timeout(LLM_DEADLINE)
            .json(&json!(
              {
                "model": &cfg.llm_settings.model,
                "temperature": temperature,
                "max_tokens": max_tokens,
                "messages": [
                  {
                    "role": "system",
                    "content": system
                  },
                  {
                    "role": "user",
                    "content": user
                  }
                ]
              }
            ))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.json::<serde_json::Value>().await.map_err(|e| {
            if let Some(status) = e.status() {
                match status {
                    StatusCode::BAD_REQUEST => AppError::BadRequest(e.to_string()),
                    StatusCode::REQUEST_TIMEOUT => AppError::RequestTimeout,
                    StatusCode::TOO_MANY_REQUESTS => AppError::TooManyRequests,
                    _ => AppError::Internal(e.into()),
                }
            } else {
                AppError::Internal(e.into())
            }
        })?;

        let parsed = serde_json::from_value::<ChatApiResponseOrError>(body.clone())
            .context(format!("Could not parse chat response: {}", body))?;

        let parsed = match parsed {
            ChatApiResponseOrError::Error(error) => {
                if status == StatusCode::TOO_MANY_REQUESTS
                    || error.message == "Requests rate limit exceeded"
                {
                    self.rate_limiters.trigger_backoff();
                    return Err(AppError::TooManyRequests);
                }
                if status.is_server_error() {
                    return Err(AppError::Internal(anyhow!(
                        "Chat API server error: {:?}",
                        error
                    )));
                }
                return Err(AppError::BadRequest(format!("Chat API error: {:?}", error)));
            }
            ChatApiResponseOrError::Response(parsed) => parsed,
        };

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .context("No choices in response")?;

        Ok(choice.message.content)
    }
}

#[async_trait]
impl LlmClient for MistralClient {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> AppResult<String> {
        let mut last_err = None;
        for attempt in 0..MAX_RETRIES {
            match self.send_prompt(system, user, max_tokens, temperature).await {
                Ok(text) => return Ok(text),
                Err(AppError::TooManyRequests) => return Err(AppError::TooManyRequests),
                Err(e @ (AppError::BadRequest(_) | AppError::Unauthorized(_))) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        "LLM completion attempt {}/{} failed: {:?}",
                        attempt + 1,
                        MAX_RETRIES,
                        e
                    );
                    last_err = Some(e);
                    if attempt + 1 < MAX_RETRIES {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| AppError::Internal(anyhow!("LLM completion failed"))))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ModelLength,
    Error,
    ToolCalls,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: i32,
    pub message: ChatMessage,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiResponse {
    pub choices: Vec<ChatChoice>,
    pub usage: PromptUsage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiError {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatApiResponseOrError {
    Response(ChatApiResponse),
    Error(ChatApiError),
}
