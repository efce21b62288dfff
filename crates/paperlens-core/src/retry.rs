//! Retry with exponential backoff for transient completion failures.
//!
//! Only errors for which [`CompletionError::is_transient`] holds are retried.
//! A reply that arrives but does not parse is never retried here; parsing
//! happens after this layer returns.

use std::time::Duration;

use crate::completion::{CompletionClient, CompletionError, CompletionRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first. `0` means a single call.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Wait before retry number `attempt` (1-based).
    ///
    /// A server-provided `Retry-After` wins over the computed backoff, capped
    /// at `max_delay` either way.
    pub fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = self
            .base_delay
            .checked_mul(1u32 << attempt.saturating_sub(1).min(16))
            .unwrap_or(self.max_delay);
        retry_after.unwrap_or(computed).min(self.max_delay)
    }
}

/// Submit `request`, retrying transient failures according to `policy`.
pub async fn complete_with_retry(
    client: &dyn CompletionClient,
    request: &CompletionRequest,
    policy: &RetryPolicy,
) -> Result<String, CompletionError> {
    let mut attempt = 0;
    loop {
        match client.complete(request).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                let wait = policy.backoff(attempt, e.retry_after());
                tracing::warn!(
                    provider = client.name(),
                    attempt,
                    wait_secs = wait.as_secs_f64(),
                    error = %e,
                    "completion failed, retrying"
                );
                tokio::time::sleep(wait).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::mock::{MockCompletion, MockReply};

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "m".into(),
            temperature: 0.1,
            prompt: "p".into(),
            json_mode: true,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(policy.backoff(1, None), Duration::from_secs(1));
        assert_eq!(policy.backoff(2, None), Duration::from_secs(2));
        assert_eq!(policy.backoff(3, None), Duration::from_secs(4));
        assert_eq!(policy.backoff(4, None), Duration::from_secs(5));
        assert_eq!(
            policy.backoff(1, Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
        assert_eq!(
            policy.backoff(1, Some(Duration::from_secs(60))),
            Duration::from_secs(5)
        );
    }

    #[tokio::test]
    async fn default_policy_makes_a_single_call() {
        let mock = MockCompletion::new(MockReply::Fail(CompletionError::RateLimited {
            retry_after: None,
        }));
        let err = complete_with_retry(&mock, &request(), &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::RateLimited { .. }));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let mock = MockCompletion::with_sequence(vec![
            MockReply::Fail(CompletionError::RateLimited {
                retry_after: Some(Duration::from_secs(2)),
            }),
            MockReply::Fail(CompletionError::Status {
                status: 502,
                body: "bad gateway".into(),
            }),
            MockReply::text("{}"),
        ]);
        let text = complete_with_retry(&mock, &request(), &RetryPolicy::with_max_retries(3))
            .await
            .unwrap();
        assert_eq!(text, "{}");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let mock = MockCompletion::new(MockReply::Fail(CompletionError::Transport(
            "connection reset".into(),
        )));
        let err = complete_with_retry(&mock, &request(), &RetryPolicy::with_max_retries(2))
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Transport(_)));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let mock = MockCompletion::new(MockReply::Fail(CompletionError::Status {
            status: 401,
            body: "invalid key".into(),
        }));
        complete_with_retry(&mock, &request(), &RetryPolicy::with_max_retries(3))
            .await
            .unwrap_err();
        assert_eq!(mock.call_count(), 1);
    }
}
