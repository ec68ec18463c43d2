use std::time::Duration;

use thiserror::Error;

/// Classified failure from an LLM or wiki HTTP provider.
///
/// The class decides retry behavior: transient classes are retried per the
/// policy table in [`crate::retry`], semantic classes (`NotFound`,
/// `ContentFilter`) are surfaced to the caller as "no data" for that input.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited by provider: {0}")]
    RateLimit(String),

    #[error("provider overloaded: {0}")]
    ServerBusy(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("provider refused the request (content filter): {0}")]
    ContentFilter(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("provider {0} is not configured (missing credentials)")]
    Unavailable(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("provider error: {0}")]
    Unknown(String),
}

/// Retry-relevant error class shared by LLM and wiki HTTP calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Timeout,
    RateLimit,
    ServerBusy,
    NotFound,
    Network,
    ContentFilter,
    BadRequest,
    Unknown,
}

impl LlmError {
    pub fn class(&self) -> ErrorClass {
        match self {
            LlmError::Timeout(_) => ErrorClass::Timeout,
            LlmError::RateLimit(_) => ErrorClass::RateLimit,
            LlmError::ServerBusy(_) => ErrorClass::ServerBusy,
            LlmError::NotFound(_) => ErrorClass::NotFound,
            LlmError::Network(_) => ErrorClass::Network,
            LlmError::ContentFilter(_) => ErrorClass::ContentFilter,
            LlmError::BadRequest(_) | LlmError::Unavailable(_) => ErrorClass::BadRequest,
            LlmError::Malformed(_) | LlmError::Unknown(_) => ErrorClass::Unknown,
        }
    }

    /// Classify an HTTP status + response body into an error.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            408 => LlmError::Timeout(Duration::from_secs(0)),
            429 => LlmError::RateLimit(truncated(body)),
            404 => LlmError::NotFound(truncated(body)),
            400 if looks_like_content_filter(body) => LlmError::ContentFilter(truncated(body)),
            400..=499 => LlmError::BadRequest(truncated(body)),
            500 | 502 | 503 | 504 | 529 => LlmError::ServerBusy(format!("{status}: {}", truncated(body))),
            _ => LlmError::Unknown(format!("{status}: {}", truncated(body))),
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(Duration::from_secs(0))
        } else if err.is_connect() || err.is_request() {
            LlmError::Network(err.to_string())
        } else {
            LlmError::Unknown(err.to_string())
        }
    }
}

/// Providers signal refusals inconsistently; match the markers the OpenAI,
/// Gemini and Ollama APIs actually emit.
fn looks_like_content_filter(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("content_filter")
        || lower.contains("content management policy")
        || lower.contains("safety")
        || lower.contains("prohibited_content")
        || lower.contains("blocked")
}

fn truncated(body: &str) -> String {
    let mut end = body.len().min(300);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_is_rate_limit() {
        assert_eq!(LlmError::from_status(429, "slow down").class(), ErrorClass::RateLimit);
    }

    #[test]
    fn status_503_is_server_busy() {
        assert_eq!(LlmError::from_status(503, "overloaded").class(), ErrorClass::ServerBusy);
    }

    #[test]
    fn status_529_is_server_busy() {
        assert_eq!(LlmError::from_status(529, "overloaded").class(), ErrorClass::ServerBusy);
    }

    #[test]
    fn status_404_is_not_found() {
        assert_eq!(LlmError::from_status(404, "missing").class(), ErrorClass::NotFound);
    }

    #[test]
    fn status_400_with_filter_marker_is_content_filter() {
        let e = LlmError::from_status(400, r#"{"error":{"code":"content_filter"}}"#);
        assert_eq!(e.class(), ErrorClass::ContentFilter);
    }

    #[test]
    fn status_400_plain_is_bad_request() {
        let e = LlmError::from_status(400, r#"{"error":"invalid model"}"#);
        assert_eq!(e.class(), ErrorClass::BadRequest);
    }

    #[test]
    fn truncated_respects_char_boundaries() {
        let body = "é".repeat(400);
        // Must not panic on a non-boundary cut.
        let _ = LlmError::from_status(500, &body);
    }
}
