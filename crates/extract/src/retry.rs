use ingest::TextChunk;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{info, trace, warn};

use crate::client::SchemaClient;
use crate::error::{ExtractError, Result};
use crate::llm::LlmClient;
use crate::schema::{ChunkStatus, ExtractionResult, Relation};

/// Bounded attempts with linear backoff: the wait after the n-th failure
/// is `n * base_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        self.base_delay * failed_attempts
    }

    /// Sum of every backoff a chunk can sleep through before giving up.
    pub fn worst_case_wait(&self) -> Duration {
        (1..self.max_attempts).map(|n| self.backoff(n)).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Attempting(u32),
    Succeeded,
    ExhaustedFailed,
}

#[derive(Debug)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { error: ExtractError, attempts: u32 },
}

impl<T> RetryOutcome<T> {
    pub fn state(&self) -> RetryState {
        match self {
            RetryOutcome::Succeeded { .. } => RetryState::Succeeded,
            RetryOutcome::Exhausted { .. } => RetryState::ExhaustedFailed,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// What one chunk produced, with an explicit flag for the fallback case.
#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    pub chunk: TextChunk,
    pub result: ExtractionResult,
    pub status: ChunkStatus,
    pub attempts: u32,
    pub dropped_relations: Vec<Relation>,
    pub error: Option<String>,
}

impl ChunkOutcome {
    pub fn is_fallback(&self) -> bool {
        self.status != ChunkStatus::Succeeded
    }
}

#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
    deadline: Option<Instant>,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            deadline: None,
        }
    }

    /// Give up instead of sleeping past `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Drive `f` until it succeeds, fails fatally, or runs out of attempts.
    /// `f` receives the attempt number and, after a schema failure, the
    /// validation message to re-prompt with.
    pub async fn retry<F, Fut, T>(&self, operation_name: &str, mut f: F) -> RetryOutcome<T>
    where
        F: FnMut(u32, Option<String>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut state = RetryState::Idle;
        let mut reprompt = None;
        let mut attempt = 0;

        loop {
            attempt += 1;
            trace!(operation = operation_name, from = ?state, "Entering attempt {}", attempt);
            state = RetryState::Attempting(attempt);

            let error = match f(attempt, reprompt.take()).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            operation = operation_name,
                            attempts = attempt,
                            "Operation succeeded after retries"
                        );
                    }
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                    };
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %error,
                    "Operation failed with a non-retryable error"
                );
                return RetryOutcome::Exhausted {
                    error,
                    attempts: attempt,
                };
            }

            if attempt >= self.policy.max_attempts {
                warn!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %error,
                    "Operation failed after max attempts"
                );
                return RetryOutcome::Exhausted {
                    error,
                    attempts: attempt,
                };
            }

            let backoff = self.policy.backoff(attempt);
            if let Some(deadline) = self.deadline {
                if Instant::now() + backoff > deadline {
                    warn!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %error,
                        "Backoff would pass the deadline, giving up"
                    );
                    return RetryOutcome::Exhausted {
                        error,
                        attempts: attempt,
                    };
                }
            }

            warn!(
                operation = operation_name,
                attempt = attempt,
                max_attempts = self.policy.max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                error = %error,
                "Operation failed, retrying"
            );

            if let ExtractError::SchemaValidation(msg) = &error {
                reprompt = Some(msg.clone());
            }

            sleep(backoff).await;
        }
    }

    /// Run one chunk through `client`. Never fails: exhaustion yields the
    /// fallback result flagged [`ChunkStatus::Exhausted`].
    pub async fn extract<C>(&self, client: &SchemaClient<C>, chunk: TextChunk) -> ChunkOutcome
    where
        C: LlmClient + ?Sized,
    {
        let operation = format!("extract chunk {}", chunk.index);
        let outcome = self
            .retry(&operation, |_, reprompt| {
                let text = chunk.text.as_str();
                async move { client.extract(text, reprompt.as_deref()).await }
            })
            .await;

        match outcome {
            RetryOutcome::Succeeded { value, attempts } => ChunkOutcome {
                chunk,
                result: value.result,
                status: ChunkStatus::Succeeded,
                attempts,
                dropped_relations: value.dropped_relations,
                error: None,
            },
            RetryOutcome::Exhausted { error, attempts } => ChunkOutcome {
                chunk,
                result: ExtractionResult::fallback(),
                status: ChunkStatus::Exhausted,
                attempts,
                dropped_relations: Vec::new(),
                error: Some(error.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockLlmClient, MockReply};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    const RESPONSE: &str = r#"{"summary": "fine", "bankruptcy_level": {"level": 0.2},
        "entities": [], "relations": []}"#;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    fn chunk(text: &str) -> TextChunk {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        TextChunk::new("doc".into(), 0, &tokens, (0, tokens.len()))
    }

    #[test]
    fn test_backoff_is_linear_and_bounded() {
        let policy = RetryPolicy::new(5, Duration::from_secs(2));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert!(policy.backoff(3) > policy.backoff(2));
        // 2 + 4 + 6 + 8
        assert_eq!(policy.worst_case_wait(), Duration::from_secs(20));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_always_retryable_stops_at_max_attempts() {
        let controller = RetryController::new(fast_policy(5));
        let calls = AtomicU32::new(0);

        let outcome: RetryOutcome<()> = controller
            .retry("test", |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ExtractError::Transport("connection reset".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(outcome.attempts(), 5);
        assert_eq!(outcome.state(), RetryState::ExhaustedFailed);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let controller = RetryController::new(fast_policy(5));
        let calls = AtomicU32::new(0);

        let outcome: RetryOutcome<()> = controller
            .retry("test", |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ExtractError::Fatal("401 unauthorized".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(outcome, RetryOutcome::Exhausted { error: ExtractError::Fatal(_), .. }));
    }

    #[tokio::test]
    async fn test_deadline_cuts_backoff_short() {
        let controller = RetryController::new(RetryPolicy::new(5, Duration::from_secs(60)))
            .with_deadline(Instant::now() + Duration::from_secs(1));

        let outcome: RetryOutcome<()> = controller
            .retry("test", |_, _| async { Err(ExtractError::Transport("503".into())) })
            .await;

        assert_eq!(outcome.attempts(), 1);
    }

    #[tokio::test]
    async fn test_extract_recovers_after_transient_failures() {
        let llm = Arc::new(MockLlmClient::new(RESPONSE));
        llm.script(
            "quarterly",
            vec![
                MockReply::Transport("429".into()),
                MockReply::Transport("502".into()),
            ],
        );
        let client = SchemaClient::new(llm.clone(), Duration::from_secs(5));
        let controller = RetryController::new(fast_policy(5));

        let outcome = controller.extract(&client, chunk("quarterly losses widened")).await;

        assert_eq!(outcome.status, ChunkStatus::Succeeded);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.summary, "fine");
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_extract_exhaustion_returns_flagged_fallback() {
        let llm = Arc::new(MockLlmClient::with_default(MockReply::Transport("down".into())));
        let client = SchemaClient::new(llm.clone(), Duration::from_secs(5));
        let controller = RetryController::new(fast_policy(5));

        let outcome = controller.extract(&client, chunk("anything")).await;

        assert!(outcome.is_fallback());
        assert_eq!(outcome.status, ChunkStatus::Exhausted);
        assert_eq!(outcome.attempts, 5);
        assert_eq!(outcome.result, ExtractionResult::fallback());
        assert!(outcome.error.unwrap().contains("down"));
        assert_eq!(llm.call_count(), 5);
    }

    #[tokio::test]
    async fn test_schema_failure_triggers_reprompt() {
        let llm = Arc::new(MockLlmClient::new(RESPONSE));
        llm.script("ledger", vec![MockReply::text("not json at all")]);
        let client = SchemaClient::new(llm.clone(), Duration::from_secs(5));
        let controller = RetryController::new(fast_policy(3));

        let outcome = controller.extract(&client, chunk("ledger entries")).await;

        assert_eq!(outcome.status, ChunkStatus::Succeeded);
        let prompts = llm.prompts();
        assert!(!prompts[0].starts_with("Your previous answer"));
        assert!(prompts[1].starts_with("Your previous answer could not be used"));
    }
}
