//! Error types for webhook delivery.
//!
//! Every failure an attempt can hit is a [`DeliveryError`] variant, and
//! [`DeliveryError::is_retryable`] is the single place that decides whether
//! the dispatcher may try again. Only construction-time problems
//! (`InvalidRequest`, `ConfigurationError`) are ever returned as `Err` to
//! callers; the rest travel inside a `DeliveryOutcome`.

use std::fmt;

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Failure of a delivery attempt or of delivery setup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Connection refused, DNS failure, reset, or any other transport failure.
    #[error("network connection failed: {message}")]
    NetworkError {
        /// Transport error description
        message: String,
    },

    /// The attempt did not complete within the per-attempt timeout.
    #[error("request timeout after {timeout_ms}ms")]
    Timeout {
        /// Timeout that was exceeded, in milliseconds
        timeout_ms: u64,
    },

    /// The endpoint rejected the request (4xx).
    #[error("client error: HTTP {status_code}")]
    ClientError {
        /// HTTP status code (4xx)
        status_code: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// The endpoint failed transiently (5xx).
    #[error("server error: HTTP {status_code}")]
    ServerError {
        /// HTTP status code (5xx)
        status_code: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// The endpoint answered with an informational or redirect status that the
    /// client did not resolve.
    #[error("unexpected status: HTTP {status_code}")]
    UnexpectedStatus {
        /// HTTP status code (1xx or 3xx)
        status_code: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// A 2xx response whose body is not valid JSON.
    #[error("malformed success response (HTTP {status_code}): {message}")]
    MalformedResponse {
        /// HTTP status code (2xx)
        status_code: u16,
        /// JSON parse error
        message: String,
    },

    /// The delivery request could not be built.
    #[error("invalid delivery request: {message}")]
    InvalidRequest {
        /// What was wrong with the request
        message: String,
    },

    /// Retry policy or client configuration is unusable.
    #[error("invalid delivery configuration: {message}")]
    ConfigurationError {
        /// What was wrong with the configuration
        message: String,
    },

    /// The caller cancelled the dispatch.
    #[error("delivery cancelled")]
    Cancelled,
}

impl DeliveryError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Creates a client error from a 4xx response.
    pub fn client_error(status_code: u16, body: impl Into<String>) -> Self {
        Self::ClientError { status_code, body: body.into() }
    }

    /// Creates a server error from a 5xx response.
    pub fn server_error(status_code: u16, body: impl Into<String>) -> Self {
        Self::ServerError { status_code, body: body.into() }
    }

    /// Creates an unexpected-status error from a 1xx or 3xx response.
    pub fn unexpected_status(status_code: u16, body: impl Into<String>) -> Self {
        Self::UnexpectedStatus { status_code, body: body.into() }
    }

    /// Creates a malformed-response error.
    pub fn malformed_response(status_code: u16, message: impl Into<String>) -> Self {
        Self::MalformedResponse { status_code, message: message.into() }
    }

    /// Creates an invalid-request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// Maps a non-2xx HTTP status to its error.
    ///
    /// 500 and above is a server error, 4xx a client error, anything else
    /// unexpected.
    pub fn from_status(status_code: u16, body: impl Into<String>) -> Self {
        match status_code {
            500.. => Self::server_error(status_code, body),
            400..=499 => Self::client_error(status_code, body),
            _ => Self::unexpected_status(status_code, body),
        }
    }

    /// Whether another attempt could succeed.
    ///
    /// Network errors, timeouts and 5xx responses are retryable. Client
    /// errors, unexpected statuses, malformed success bodies, bad requests,
    /// bad configuration and cancellation are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkError { .. } | Self::Timeout { .. } | Self::ServerError { .. } => true,

            Self::ClientError { .. }
            | Self::UnexpectedStatus { .. }
            | Self::MalformedResponse { .. }
            | Self::InvalidRequest { .. }
            | Self::ConfigurationError { .. }
            | Self::Cancelled => false,
        }
    }

    /// HTTP status carried by the error, if the endpoint answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ClientError { status_code, .. }
            | Self::ServerError { status_code, .. }
            | Self::UnexpectedStatus { status_code, .. }
            | Self::MalformedResponse { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Response body carried by the error, if any.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::ClientError { body, .. }
            | Self::ServerError { body, .. }
            | Self::UnexpectedStatus { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Coarse error category for metrics labels and alert routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connectivity and timeouts.
    Network,
    /// 4xx and other statuses a retry cannot fix.
    Client,
    /// 5xx.
    Server,
    /// 2xx with an unusable body.
    Response,
    /// Bad request or configuration.
    Configuration,
    /// Caller cancellation.
    Cancelled,
}

impl From<&DeliveryError> for ErrorCategory {
    fn from(error: &DeliveryError) -> Self {
        match error {
            DeliveryError::NetworkError { .. } | DeliveryError::Timeout { .. } => Self::Network,
            DeliveryError::ClientError { .. } | DeliveryError::UnexpectedStatus { .. } => {
                Self::Client
            },
            DeliveryError::ServerError { .. } => Self::Server,
            DeliveryError::MalformedResponse { .. } => Self::Response,
            DeliveryError::InvalidRequest { .. } | DeliveryError::ConfigurationError { .. } => {
                Self::Configuration
            },
            DeliveryError::Cancelled => Self::Cancelled,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Client => write!(f, "client"),
            Self::Server => write!(f, "server"),
            Self::Response => write!(f, "response"),
            Self::Configuration => write!(f, "configuration"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(DeliveryError::network("connection refused").is_retryable());
        assert!(DeliveryError::timeout(30_000).is_retryable());
        assert!(DeliveryError::server_error(503, "unavailable").is_retryable());

        assert!(!DeliveryError::client_error(404, "not found").is_retryable());
        assert!(!DeliveryError::client_error(429, "slow down").is_retryable());
        assert!(!DeliveryError::unexpected_status(302, "").is_retryable());
        assert!(!DeliveryError::malformed_response(200, "expected value").is_retryable());
        assert!(!DeliveryError::invalid_request("bad url").is_retryable());
        assert!(!DeliveryError::configuration("zero attempts").is_retryable());
        assert!(!DeliveryError::Cancelled.is_retryable());
    }

    #[test]
    fn status_mapping_splits_on_class() {
        assert_eq!(DeliveryError::from_status(500, "x"), DeliveryError::server_error(500, "x"));
        assert_eq!(DeliveryError::from_status(599, ""), DeliveryError::server_error(599, ""));
        assert_eq!(DeliveryError::from_status(600, ""), DeliveryError::server_error(600, ""));
        assert!(DeliveryError::from_status(700, "").is_retryable());
        assert_eq!(DeliveryError::from_status(400, ""), DeliveryError::client_error(400, ""));
        assert_eq!(DeliveryError::from_status(499, ""), DeliveryError::client_error(499, ""));
        assert_eq!(DeliveryError::from_status(301, ""), DeliveryError::unexpected_status(301, ""));
        assert_eq!(DeliveryError::from_status(101, ""), DeliveryError::unexpected_status(101, ""));
    }

    #[test]
    fn status_and_body_accessors() {
        let error = DeliveryError::client_error(422, "missing project_id");
        assert_eq!(error.status_code(), Some(422));
        assert_eq!(error.response_body(), Some("missing project_id"));

        assert_eq!(DeliveryError::network("reset").status_code(), None);
        assert_eq!(DeliveryError::timeout(10).response_body(), None);
    }

    #[test]
    fn categories_and_display() {
        assert_eq!(ErrorCategory::from(&DeliveryError::timeout(5)), ErrorCategory::Network);
        assert_eq!(ErrorCategory::from(&DeliveryError::client_error(401, "")), ErrorCategory::Client);
        assert_eq!(ErrorCategory::from(&DeliveryError::server_error(502, "")), ErrorCategory::Server);
        assert_eq!(ErrorCategory::Response.to_string(), "response");

        assert_eq!(DeliveryError::timeout(30_000).to_string(), "request timeout after 30000ms");
        assert_eq!(DeliveryError::server_error(503, "").to_string(), "server error: HTTP 503");
    }
}
