use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::models::{ChatRequest, ChatResponse, Message};

/// A text-in, text-out language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Base URL of an OpenAI-compatible API (LiteLLM, vLLM, ...).
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000".to_string(),
            model: "gemini-2.0-flash".to_string(),
            temperature: 0.0,
            max_output_tokens: 10000,
            api_key: None,
        }
    }
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionsClient {
    client: Client,
    settings: LlmSettings,
}

impl ChatCompletionsClient {
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health/liveliness", self.settings.base_url.trim_end_matches('/'));

        let response = self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| RagError::Generation(format!("health check failed: {e}")))?;

        Ok(response.status().is_success())
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: Some(self.settings.temperature),
            max_tokens: Some(self.settings.max_output_tokens),
            stream: Some(false),
        };

        let mut req = self.client.post(&url).json(&request);
        if let Some(ref key) = self.settings.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| RagError::Generation(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!("LLM request failed: {status} - {error_text}")));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| RagError::Generation(format!("failed to parse response: {e}")))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| RagError::Generation("response contained no choices".to_string()))
    }
}
