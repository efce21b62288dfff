//! Language-model completion collaborator.

pub mod mock;
pub mod openai;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

pub use openai::OpenAiClient;

/// A single prompt submitted to the completion service.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub temperature: f32,
    pub prompt: String,
    /// Ask the provider to constrain its answer to a JSON object.
    pub json_mode: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// Server returned 429 Too Many Requests.
    #[error("rate limited (429){}", retry_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
    #[error("missing API key (set OPENAI_API_KEY or [api] api_key)")]
    MissingApiKey,
}

impl CompletionError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CompletionError::RateLimited { .. } | CompletionError::Transport(_) => true,
            CompletionError::Status { status, .. } => *status >= 500,
            CompletionError::InvalidResponse(_) | CompletionError::MissingApiKey => false,
        }
    }

    /// Server-requested wait before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CompletionError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

fn retry_suffix(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(", retry after {:.1}s", d.as_secs_f64()))
        .unwrap_or_default()
}

/// A service that turns a prompt into completion text.
pub trait CompletionClient: Send + Sync {
    /// Provider name used in logs (e.g. "OpenAI").
    fn name(&self) -> &str;

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>>;
}

/// Parse a Retry-After header value (seconds or HTTP-date).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    // HTTP-date form: wait a fixed 5s.
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors() {
        assert!(CompletionError::RateLimited { retry_after: None }.is_transient());
        assert!(CompletionError::Transport("reset".into()).is_transient());
        assert!(
            CompletionError::Status {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !CompletionError::Status {
                status: 401,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!CompletionError::InvalidResponse("no choices".into()).is_transient());
    }

    #[test]
    fn retry_after_parsing() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after(" 10 "), Some(Duration::from_secs(10)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::from_secs(5))
        );
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn rate_limited_display_includes_wait() {
        let err = CompletionError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(err.to_string(), "rate limited (429), retry after 2.0s");
        let err = CompletionError::RateLimited { retry_after: None };
        assert_eq!(err.to_string(), "rate limited (429)");
    }
}
