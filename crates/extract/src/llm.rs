use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ExtractError, Result};

/// A text-completion model endpoint.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one rendered prompt, return the raw completion text.
    async fn complete(&self, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Map an unsuccessful HTTP status onto the retry taxonomy.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> ExtractError {
    let msg = format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>());
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        ExtractError::Transport(msg)
    } else {
        ExtractError::Fatal(msg)
    }
}

/// Map a reqwest failure onto the retry taxonomy.
pub(crate) fn classify_request_error(e: reqwest::Error) -> ExtractError {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode() {
        ExtractError::Transport(e.to_string())
    } else {
        ExtractError::Fatal(e.to_string())
    }
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ExtractError::Config(format!("failed to build HTTP client: {}", e)))
}

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str, // "json" for structured output
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClient {
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:11434";

    pub fn new(base_url: String, model: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client: build_http_client(timeout)?,
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json", // Force JSON output
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let ollama_response: OllamaResponse =
            response.json().await.map_err(classify_request_error)?;

        Ok(ollama_response.response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
