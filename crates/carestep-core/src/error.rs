//! Error types.
//!
//! `TransportError` covers every way a remote judge can fail to answer.

use thiserror::Error;

/// Failures reaching a remote judge. Every variant triggers local grading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No API credential is configured for the backend.
    #[error("missing API credential for {0}")]
    MissingCredential(String),

    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The API returned a non-success status.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request did not complete within the time budget.
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The backend answered without any text.
    #[error("empty response from {0}")]
    EmptyResponse(String),
}

/// Errors building a rubric scorer from configuration.
#[derive(Debug, Error)]
pub enum RubricError {
    /// A vocabulary term is not a valid pattern.
    #[error("invalid {topic} pattern: {source}")]
    InvalidPattern {
        topic: String,
        #[source]
        source: regex::Error,
    },
}

/// A `[calendar]` section whose days cannot describe a monthly cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    #[error("{field} = {day} is not a day of the month (1-31)")]
    DayOutOfRange { field: &'static str, day: u32 },

    #[error(
        "calendar days out of order: expected input_end < evaluation_start <= evaluation_end < input_start"
    )]
    OutOfOrder,
}
