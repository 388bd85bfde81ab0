//! Scripted model client for tests and offline runs.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ExtractError, Result};
use crate::llm::LlmClient;

#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Transport(String),
    Fatal(String),
    /// Never answers; exercises timeouts and cancellation
    Hang,
}

impl MockReply {
    pub fn text(body: impl Into<String>) -> Self {
        MockReply::Text(body.into())
    }
}

/// Returns queued replies for prompts containing a marker string, and a
/// default reply otherwise. Clones share the script and the call log.
#[derive(Debug, Clone)]
pub struct MockLlmClient {
    default_reply: MockReply,
    scripts: Arc<Mutex<Vec<(String, VecDeque<MockReply>)>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockLlmClient {
    pub fn new(default_response: impl Into<String>) -> Self {
        Self::with_default(MockReply::Text(default_response.into()))
    }

    pub fn with_default(default_reply: MockReply) -> Self {
        Self {
            default_reply,
            scripts: Arc::new(Mutex::new(Vec::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue `replies` for prompts that contain `marker`. Once the queue is
    /// drained those prompts get the default reply.
    pub fn script(&self, marker: impl Into<String>, replies: Vec<MockReply>) -> &Self {
        lock(&self.scripts).push((marker.into(), replies.into()));
        self
    }

    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }

    pub fn calls_containing(&self, marker: &str) -> usize {
        lock(&self.prompts)
            .iter()
            .filter(|p| p.contains(marker))
            .count()
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    fn next_reply(&self, prompt: &str) -> MockReply {
        lock(&self.prompts).push(prompt.to_string());

        let mut scripts = lock(&self.scripts);
        scripts
            .iter_mut()
            .filter(|(marker, _)| prompt.contains(marker.as_str()))
            .find_map(|(_, queue)| queue.pop_front())
            .unwrap_or_else(|| self.default_reply.clone())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        match self.next_reply(prompt) {
            MockReply::Text(body) => Ok(body),
            MockReply::Transport(msg) => Err(ExtractError::Transport(msg)),
            MockReply::Fatal(msg) => Err(ExtractError::Fatal(msg)),
            MockReply::Hang => std::future::pending().await,
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
