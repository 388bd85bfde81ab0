//! Groq's OpenAI-compatible chat completions endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ExtractError, Result};
use crate::llm::{LlmClient, build_http_client, classify_request_error, classify_status};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.1-70b-versatile";
pub const DEFAULT_TEMPERATURE: f32 = 0.5;

#[derive(Clone)]
pub struct GroqClient {
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl GroqClient {
    /// The API key is passed in explicitly; nothing is read from the
    /// environment here.
    pub fn new(
        base_url: String,
        model: String,
        api_key: String,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(ExtractError::Config("Groq API key is empty".to_string()));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            temperature,
            client: build_http_client(timeout)?,
        })
    }
}

#[async_trait]
impl LlmClient for GroqClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let chat: ChatResponse = response.json().await.map_err(classify_request_error)?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ExtractError::SchemaValidation("completion had no content".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
