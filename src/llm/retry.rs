//! Bounded retry with exponential backoff for LLM calls.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::error::LlmError;

use super::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// How often and how patiently to retry a provider call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
    /// Deadline for each individual attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `attempt` (1-based) failed, before jitter.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }

    fn jittered(&self, base: Duration) -> Duration {
        let quarter = base.as_millis() as u64 / 4;
        if quarter == 0 {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0..=quarter);
        (base + Duration::from_millis(extra)).min(self.max_backoff)
    }
}

/// Wraps a provider and retries transient failures according to a `RetryPolicy`.
pub struct RetryProvider {
    inner: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl LlmProvider for RetryProvider {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result =
                match tokio::time::timeout(self.policy.attempt_timeout, self.inner.complete(request.clone()))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(LlmError::Timeout {
                        provider: self.inner.model_name().to_string(),
                        timeout: self.policy.attempt_timeout,
                    }),
                };

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    // Server hints are capped like computed backoff.
                    let delay = match e.retry_after() {
                        Some(hint) => hint.min(self.policy.max_backoff),
                        None => self.policy.jittered(self.policy.backoff_for(attempt)),
                    };
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "LLM call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::llm::provider::{ChatMessage, FinishReason};

    /// Fails `failures` times with `error()`, then succeeds.
    struct Flaky {
        calls: AtomicU32,
        failures: u32,
        error: fn() -> LlmError,
    }

    fn reset() -> LlmError {
        LlmError::RequestFailed {
            provider: "flaky".into(),
            reason: "connection reset".into(),
        }
    }

    fn auth() -> LlmError {
        LlmError::AuthFailed {
            provider: "flaky".into(),
        }
    }

    #[async_trait]
    impl LlmProvider for Flaky {
        fn model_name(&self) -> &str {
            "flaky"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err((self.error)());
            }
            Ok(CompletionResponse {
                content: "ok".into(),
                input_tokens: 1,
                output_tokens: 1,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            attempt_timeout: Duration::from_secs(5),
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![ChatMessage::user("hi")])
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(350));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let inner = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures: 2,
            error: reset,
        });
        let provider = RetryProvider::new(inner.clone(), fast_policy(3));
        let response = provider.complete(request()).await.unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let inner = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures: 10,
            error: reset,
        });
        let provider = RetryProvider::new(inner.clone(), fast_policy(2));
        assert!(provider.complete(request()).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_auth_failures() {
        let inner = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures: 1,
            error: auth,
        });
        let provider = RetryProvider::new(inner.clone(), fast_policy(5));
        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::AuthFailed { .. }));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn does_not_retry_rejected_requests() {
        let inner = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures: 1,
            error: || LlmError::Rejected {
                provider: "flaky".into(),
                status: 422,
                reason: "unknown model".into(),
            },
        });
        let provider = RetryProvider::new(inner.clone(), fast_policy(5));
        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Rejected { status: 422, .. }));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_retry_hint_is_capped_by_max_backoff() {
        let inner = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            failures: 1,
            error: || LlmError::RateLimited {
                provider: "flaky".into(),
                retry_after: Some(Duration::from_secs(3600)),
            },
        });
        let provider = RetryProvider::new(inner.clone(), fast_policy(2));
        let response = tokio::time::timeout(Duration::from_secs(5), provider.complete(request()))
            .await
            .expect("retry hint was not capped")
            .unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
