use std::time::Duration;

use llm_client::ErrorClass;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum WikiError {
    #[error("wiki request timed out after {0:?}")]
    Timeout(Duration),

    #[error("wiki API rate limited: {0}")]
    RateLimit(String),

    #[error("wiki API overloaded: {0}")]
    ServerBusy(String),

    #[error("page not found: {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed wiki response: {0}")]
    Malformed(String),

    #[error("wiki error: {0}")]
    Unknown(String),
}

impl WikiError {
    pub fn class(&self) -> ErrorClass {
        match self {
            WikiError::Timeout(_) => ErrorClass::Timeout,
            WikiError::RateLimit(_) => ErrorClass::RateLimit,
            WikiError::ServerBusy(_) => ErrorClass::ServerBusy,
            WikiError::NotFound(_) => ErrorClass::NotFound,
            WikiError::Network(_) => ErrorClass::Network,
            WikiError::Malformed(_) | WikiError::Unknown(_) => ErrorClass::Unknown,
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let summary: String = body.chars().take(200).collect();
        match status {
            408 => WikiError::Timeout(Duration::from_secs(0)),
            429 => WikiError::RateLimit(summary),
            404 => WikiError::NotFound(summary),
            500 | 502 | 503 | 504 => WikiError::ServerBusy(format!("{status}: {summary}")),
            _ => WikiError::Unknown(format!("{status}: {summary}")),
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WikiError::Timeout(Duration::from_secs(0))
        } else if err.is_connect() || err.is_request() {
            WikiError::Network(err.to_string())
        } else {
            WikiError::Unknown(err.to_string())
        }
    }
}
