//! Error types for the DNS pool
//!
//! Every error maps onto one of four kinds (collection, probe, provider,
//! configuration) so that callers can count and route failures without
//! matching on individual variants.

use thiserror::Error;

/// Result type alias for DNS pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Candidate source unreachable or unparseable
    Collection,
    /// Latency measurement failed (timeout, transport, unparseable body)
    Probe,
    /// Record store read or write failed
    Provider,
    /// Missing or invalid configuration
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Collection => "collection",
            ErrorKind::Probe => "probe",
            ErrorKind::Provider => "provider",
            ErrorKind::Config => "config",
        };
        f.write_str(name)
    }
}

/// Core error type for the DNS pool
#[derive(Error, Debug)]
pub enum Error {
    /// Candidate source errors
    #[error("Candidate source error: {0}")]
    Collection(String),

    /// Latency measurement errors
    #[error("Probe error: {0}")]
    Probe(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Record store specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a candidate source error
    pub fn collection(msg: impl Into<String>) -> Self {
        Self::Collection(msg.into())
    }

    /// Create a probe error
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Classify this error
    ///
    /// Transport-level variants (`Http`, `Network`, `Json`, ...) are raised by
    /// record store clients, so they count as provider errors unless the
    /// adapter wrapped them in a more specific variant.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Collection(_) => ErrorKind::Collection,
            Error::Probe(_) => ErrorKind::Probe,
            Error::Config(_) => ErrorKind::Config,
            Error::Authentication(_)
            | Error::Provider { .. }
            | Error::RateLimited(_)
            | Error::NotFound(_)
            | Error::Http(_)
            | Error::Network(_)
            | Error::Json(_)
            | Error::InvalidInput(_)
            | Error::Other(_) => ErrorKind::Provider,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
