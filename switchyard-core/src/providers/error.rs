//! Provider error types and classification

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Suggested wait before calling a rate-limited provider again
pub const RATE_LIMIT_DELAY_MS: u64 = 60_000;

const TRANSIENT_STATUS: &[u16] = &[408, 500, 502, 503, 504];
const PERMANENT_STATUS: &[u16] = &[400, 401, 403, 404, 409, 422];

static RATE_LIMIT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(rate[\s_-]?limit|too many requests|quota exceeded)").unwrap()
});

static TRANSIENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(timeout|timed out|connection|network|econnreset|econnrefused|socket hang up)")
        .unwrap()
});

/// Errors returned by a vendor call
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Vendor answered with a non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Request timed out
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Network or connection error
    #[error("Network error: {0}")]
    Network(String),

    /// Response parsing error
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Provider is misconfigured (missing key, unknown provider, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Build an error from an HTTP status and an optional response body.
    ///
    /// Understands the `{"error": {"message": ...}}` shape shared by most vendors.
    pub fn from_status(status: u16, body: Option<&str>) -> Self {
        let details = body
            .and_then(|b| serde_json::from_str::<Value>(b).ok())
            .and_then(|v| extract_error_details(&v));

        let message = details
            .as_ref()
            .map(|d| d.message.clone())
            .or_else(|| body.map(str::to_string))
            .unwrap_or_else(|| format!("HTTP error {}", status));

        Self::Http {
            status,
            message,
            retry_after: details
                .and_then(|d| d.retry_after_seconds)
                .map(Duration::from_secs),
        }
    }

    /// HTTP status code, when the vendor returned one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Vendor-supplied retry hint
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_connect() {
            ProviderError::Network(format!("Connection failed: {}", err))
        } else if let Some(status) = err.status() {
            ProviderError::Http {
                status: status.as_u16(),
                message: err.to_string(),
                retry_after: None,
            }
        } else if err.is_decode() {
            ProviderError::ParseError(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::ParseError(err.to_string())
    }
}

/// Error details extracted from a JSON error body
struct ErrorDetails {
    message: String,
    retry_after_seconds: Option<u64>,
}

fn extract_error_details(json: &Value) -> Option<ErrorDetails> {
    // OpenAI / Anthropic / Gemini: { "error": { "message": "..." } }
    if let Some(error) = json.get("error") {
        if let Some(message) = error.get("message").and_then(|v| v.as_str()) {
            return Some(ErrorDetails {
                message: message.to_string(),
                retry_after_seconds: error.get("retry_after").and_then(|v| v.as_u64()),
            });
        }
        if let Some(message) = error.as_str() {
            return Some(ErrorDetails {
                message: message.to_string(),
                retry_after_seconds: None,
            });
        }
    }

    // Generic format: { "message": "..." }
    json.get("message").and_then(|v| v.as_str()).map(|message| ErrorDetails {
        message: message.to_string(),
        retry_after_seconds: json.get("retry_after").and_then(|v| v.as_u64()),
    })
}

/// Error taxonomy used for retry and fallback decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    RateLimit,
    Retryable,
    Unrecoverable,
    Unknown,
}

/// A provider error with its classification
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub error: ProviderError,
    pub category: ErrorCategory,
    pub should_retry: bool,
    pub suggested_delay_ms: Option<u64>,
}

impl ClassifiedError {
    pub(crate) fn new(error: &ProviderError, category: ErrorCategory, should_retry: bool) -> Self {
        Self {
            error: error.clone(),
            category,
            should_retry,
            suggested_delay_ms: None,
        }
    }

    fn rate_limited(error: &ProviderError) -> Self {
        let delay = error
            .retry_after()
            .map(|d| d.as_millis() as u64)
            .unwrap_or(RATE_LIMIT_DELAY_MS);
        Self {
            suggested_delay_ms: Some(delay),
            ..Self::new(error, ErrorCategory::RateLimit, false)
        }
    }
}

/// Maps vendor errors onto [`ErrorCategory`]
///
/// Checked in order: status 429, transient statuses, permanent statuses, then
/// message keywords. Anything unmatched is `Unknown` and retryable.
/// Rate limits are surfaced rather than retried.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn classify(error: &ProviderError) -> ClassifiedError {
        if let Some(status) = error.status() {
            if status == 429 {
                return ClassifiedError::rate_limited(error);
            }
            if TRANSIENT_STATUS.contains(&status) {
                return ClassifiedError::new(error, ErrorCategory::Retryable, true);
            }
            if PERMANENT_STATUS.contains(&status) {
                return ClassifiedError::new(error, ErrorCategory::Unrecoverable, false);
            }
        }

        let message = error.to_string();
        if RATE_LIMIT_PATTERN.is_match(&message) {
            return ClassifiedError::rate_limited(error);
        }
        if matches!(error, ProviderError::Timeout(_) | ProviderError::Network(_))
            || TRANSIENT_PATTERN.is_match(&message)
        {
            return ClassifiedError::new(error, ErrorCategory::Retryable, true);
        }
        if matches!(error, ProviderError::Configuration(_)) {
            return ClassifiedError::new(error, ErrorCategory::Unrecoverable, false);
        }

        ClassifiedError::new(error, ErrorCategory::Unknown, true)
    }
}
