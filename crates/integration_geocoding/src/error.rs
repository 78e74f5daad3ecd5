//! Geocoding error types

use thiserror::Error;

use crate::ProviderKind;

/// Errors raised by an [`HttpAdapter`](crate::HttpAdapter)
///
/// Providers never inspect these; they reach the caller unchanged inside
/// [`GeocoderError::Http`].
#[derive(Debug, Error)]
pub enum HttpError {
    /// Connection to the remote service failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// HTTP request failed before a response was received
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The remote service answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status {
        /// Status code returned by the service
        status: u16,
        /// Response body, as text
        body: String,
    },

    /// The response body is not valid JSON
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The adapter refused to send the request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request timeout
    #[error("Request timed out after {timeout_secs} seconds")]
    Timeout {
        /// The timeout duration in seconds
        timeout_secs: u64,
    },
}

impl HttpError {
    /// Returns true if repeating the request may succeed
    ///
    /// Nothing in this crate retries; the flag is for callers.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionFailed(_) | Self::RequestFailed(_) | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::ParseError(_) | Self::InvalidRequest(_) => false,
        }
    }
}

/// Errors that can occur while geocoding
#[derive(Debug, Error)]
pub enum GeocoderError {
    /// The provider was constructed with missing or unusable settings
    #[error("{message}")]
    Configuration {
        /// Display name of the provider
        provider: &'static str,
        /// What is wrong, naming the provider
        message: String,
    },

    /// The provider identifier is not one of the supported ones
    #[error("Unknown geocoder provider: {0}")]
    UnknownProvider(String),

    /// The provider cannot serve this query
    #[error("{message}")]
    InvalidQuery {
        /// Display name of the provider
        provider: &'static str,
        /// What is unsupported, naming the provider
        message: String,
    },

    /// Transport failure, passed through from the HTTP adapter
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The provider declined the request in its response payload
    #[error("{provider} returned an error: {message}")]
    Provider {
        /// Display name of the provider
        provider: &'static str,
        /// Error message reported by the provider
        message: String,
    },

    /// The provider payload does not have the expected shape
    #[error("{provider} returned an unexpected response: {message}")]
    MalformedResponse {
        /// Display name of the provider
        provider: &'static str,
        /// Deserialization failure
        message: String,
    },

    /// The provider affirmatively found nothing
    #[error("{provider} found no results for: {query}")]
    NoResults {
        /// Display name of the provider
        provider: &'static str,
        /// The query that matched nothing
        query: String,
    },
}

impl GeocoderError {
    /// `"<Provider> needs <requirement>"`
    #[must_use]
    pub fn needs(kind: ProviderKind, requirement: &str) -> Self {
        let provider = kind.display_name();
        Self::Configuration {
            provider,
            message: format!("{provider} needs {requirement}"),
        }
    }

    /// `"<Provider> does not support <what>"`
    #[must_use]
    pub fn unsupported(kind: ProviderKind, what: &str) -> Self {
        let provider = kind.display_name();
        Self::InvalidQuery {
            provider,
            message: format!("{provider} does not support {what}"),
        }
    }

    /// Decline reported inside a provider payload
    #[must_use]
    pub fn provider(kind: ProviderKind, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: kind.display_name(),
            message: message.into(),
        }
    }

    /// Payload that could not be mapped
    #[must_use]
    pub fn malformed(kind: ProviderKind, error: &impl std::fmt::Display) -> Self {
        Self::MalformedResponse {
            provider: kind.display_name(),
            message: error.to_string(),
        }
    }

    /// Returns true if the caller may retry the same request
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_retryable(),
            _ => false,
        }
    }
}
