use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::llm::provider::LLMProvider;
use crate::models::{ModelRequest, ModelResponse};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound for a single attempt.
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based): base, 2x base, 4x base...
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

/// Wraps a provider with per-attempt timeouts, bounded exponential backoff
/// and cancellation. Never returns an error: failures become failed
/// responses so sibling batches keep going.
#[derive(Clone)]
pub struct InferenceClient {
    provider: Arc<dyn LLMProvider>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl InferenceClient {
    pub fn new(provider: Arc<dyn LLMProvider>, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            provider,
            policy,
            cancel,
        }
    }

    pub fn provider(&self) -> &Arc<dyn LLMProvider> {
        &self.provider
    }

    pub async fn generate(&self, request: &ModelRequest) -> ModelResponse {
        let batch = request.batch_index;
        let max_attempts = self.policy.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return ModelResponse::failure(batch, attempt, Error::Cancelled.to_string());
                }
                result = tokio::time::timeout(self.policy.timeout, self.provider.generate(request)) => result,
            };

            let err = match result {
                Ok(Ok(text)) => {
                    tracing::debug!("Batch {} generated on attempt {}", batch + 1, attempt);
                    return ModelResponse::success(batch, attempt, text);
                }
                Ok(Err(e)) => e,
                Err(_) => Error::Timeout(self.policy.timeout),
            };

            if !err.is_retryable() {
                tracing::warn!("Batch {} failed without retry: {}", batch + 1, err);
                return ModelResponse::failure(batch, attempt, err.to_string());
            }

            if attempt >= max_attempts {
                tracing::warn!("Batch {} gave up after {} attempts: {}", batch + 1, attempt, err);
                return ModelResponse::failure(
                    batch,
                    attempt,
                    format!("retries exhausted: {}", err),
                );
            }

            let delay = self.policy.backoff_for(attempt);
            tracing::warn!(
                "Batch {} attempt {}/{} failed: {}; retrying in {:?}",
                batch + 1,
                attempt,
                max_attempts,
                err,
                delay
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return ModelResponse::failure(batch, attempt, Error::Cancelled.to_string());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
