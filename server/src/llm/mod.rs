use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppResult;

mod client;
pub mod json;

pub use client::*;

/// Deadline applied to every completion call.
pub const LLM_DEADLINE: Duration = Duration::from_secs(45);

/// Prompt/response seam over the language model provider. The production
/// implementation speaks the Mistral chat-completions API; tests plug in
/// scripted doubles.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> AppResult<String>;
}

pub type LlmHandle = Arc<dyn LlmClient>;

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{AppError, AppResult};

    /// Returns canned responses in order; errors once the script runs dry.
    pub struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        pub fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().rev().map(String::from).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(
            &self,
            _system: &str,
            user: &str,
            _max_tokens: u32,
            _temperature: f32,
        ) -> AppResult<String> {
            self.calls.lock().unwrap().push(user.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Scripted LLM exhausted")))
        }
    }
}
