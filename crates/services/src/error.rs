//! Shared error types for the services crate.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use lms_core::GateError;
use lms_core::model::ContentId;
use storage::StorageError;

/// User-facing classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No response reached the client.
    Network,
    Timeout,
    /// 4xx other than 429.
    Validation,
    /// 429.
    RateLimited,
    /// 5xx.
    Server,
    Unknown,
}

impl ErrorKind {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Timeout => "TIMEOUT_ERROR",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::RateLimited => "RATE_LIMIT_EXCEEDED",
            ErrorKind::Server => "SERVER_ERROR",
            ErrorKind::Unknown => "UNKNOWN_ERROR",
        }
    }

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            ErrorKind::Network => "Connection Problem",
            ErrorKind::Timeout => "Request Timed Out",
            ErrorKind::Validation => "Progress Not Saved",
            ErrorKind::RateLimited => "Too Many Requests",
            ErrorKind::Server => "Server Error",
            ErrorKind::Unknown => "Something Went Wrong",
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            ErrorKind::Network => {
                "We couldn't reach the server. Check your internet connection and try again."
            }
            ErrorKind::Timeout => {
                "The server took too long to respond. Your progress was not saved, please try again."
            }
            ErrorKind::Validation => {
                "The server rejected this progress update. Refresh the page and try again."
            }
            ErrorKind::RateLimited => {
                "You're sending updates too quickly. Wait a moment, then try again."
            }
            ErrorKind::Server => {
                "The server ran into a problem saving your progress. Please try again shortly."
            }
            ErrorKind::Unknown => "An unexpected error occurred while saving your progress.",
        }
    }

    /// Whether the mutation retries this class on its own.
    ///
    /// Rate limits and validation failures only ever get a manual retry.
    #[must_use]
    pub fn is_auto_retryable(self) -> bool {
        // Unknown (undecodable bodies, client build failures) is manual-only, like 429.
        matches!(
            self,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Server
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors emitted by the progress API boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("request rejected with status {status}: {message}")]
    Validation { status: u16, message: String },
    #[error("rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error with status {status}")]
    Server { status: u16 },
    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl ApiError {
    /// Classify a non-success HTTP status.
    #[must_use]
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> Self {
        match status {
            429 => ApiError::RateLimited { retry_after },
            400..=499 => ApiError::Validation { status, message },
            500..=599 => ApiError::Server { status },
            _ => ApiError::Unknown(format!("unexpected status {status}: {message}")),
        }
    }

    /// Classify a transport failure; `limit` is the timeout the request ran under.
    #[must_use]
    pub fn from_transport(err: &reqwest::Error, limit: Duration) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(limit)
        } else if let Some(status) = err.status() {
            ApiError::from_status(status.as_u16(), err.to_string(), None)
        } else if err.is_decode() {
            ApiError::Unknown(err.to_string())
        } else if err.is_connect() || err.is_request() || err.is_body() {
            ApiError::Network(err.to_string())
        } else {
            ApiError::Unknown(err.to_string())
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network(_) => ErrorKind::Network,
            ApiError::Timeout(_) => ErrorKind::Timeout,
            ApiError::Validation { .. } => ErrorKind::Validation,
            ApiError::RateLimited { .. } => ErrorKind::RateLimited,
            ApiError::Server { .. } => ErrorKind::Server,
            ApiError::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("a progress update for content {0} is already in flight")]
    InFlight(ContentId),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProgressError {
    /// Classification of the underlying API failure, if any.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ProgressError::Api(err) => Some(err.kind()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(
            ApiError::from_status(429, String::new(), None).kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            ApiError::from_status(422, "bad".into(), None).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ApiError::from_status(503, String::new(), None).kind(),
            ErrorKind::Server
        );
        assert_eq!(
            ApiError::from_status(302, String::new(), None).kind(),
            ErrorKind::Unknown
        );
    }

    #[test]
    fn only_transient_classes_auto_retry() {
        assert!(ErrorKind::Network.is_auto_retryable());
        assert!(ErrorKind::Timeout.is_auto_retryable());
        assert!(ErrorKind::Server.is_auto_retryable());
        assert!(!ErrorKind::RateLimited.is_auto_retryable());
        assert!(!ErrorKind::Validation.is_auto_retryable());
        assert!(!ErrorKind::Unknown.is_auto_retryable());
    }

    #[test]
    fn every_kind_has_distinct_copy() {
        let kinds = [
            ErrorKind::Network,
            ErrorKind::Timeout,
            ErrorKind::Validation,
            ErrorKind::RateLimited,
            ErrorKind::Server,
            ErrorKind::Unknown,
        ];
        let titles: std::collections::HashSet<_> = kinds.iter().map(|k| k.title()).collect();
        let codes: std::collections::HashSet<_> = kinds.iter().map(|k| k.code()).collect();
        assert_eq!(titles.len(), kinds.len());
        assert_eq!(codes.len(), kinds.len());
        assert_eq!(ErrorKind::Timeout.title(), "Request Timed Out");
    }

    #[test]
    fn timeout_message_names_the_bound() {
        let err = ApiError::Timeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "request timed out after 10000ms");
    }
}
