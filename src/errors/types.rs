//! Error type definitions for the m3u-slim application

use thiserror::Error;

/// Top-level application error type
///
/// Uses `thiserror` to provide automatic error trait implementations and
/// proper error chaining.
#[derive(Error, Debug)]
pub enum AppError {
    /// Source handling errors (fetching/parsing playlist or guide data)
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Object-storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// A download exceeded the byte ceiling enforced during streaming
    #[error("Size limit exceeded: {url} is larger than {limit} bytes")]
    SizeLimit { url: String, limit: u64 },

    /// External service errors
    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem errors while writing local artifacts
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source handling specific errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// Parsing errors for source data
    #[error("Parse error: {source_type} - {message}")]
    ParseError {
        source_type: String,
        message: String,
    },

    /// HTTP errors from external sources
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// Payload could not be decoded as UTF-8 text
    #[error("Decode error: {message}")]
    Decode { message: String },
}

/// Object-storage specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Credentials were not present in the environment
    #[error("Missing credentials: {variable} is not set")]
    MissingCredentials { variable: String },

    /// The configured endpoint does not use HTTPS
    #[error("Insecure endpoint: {endpoint} (HTTPS required)")]
    InsecureEndpoint { endpoint: String },

    /// Upload payload exceeds the sanity size limit
    #[error("Payload too large: {size} bytes (max: {max_size})")]
    PayloadTooLarge { size: usize, max_size: usize },

    /// Request signing failures
    #[error("Request signing failed: {message}")]
    Signing { message: String },

    /// Provider-side errors, propagated unchanged
    #[error("Provider error: {status} - {message}")]
    Provider { status: u16, message: String },

    /// Transport errors while talking to the provider
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an external service error
    pub fn external_service<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl SourceError {
    /// Create a parse error for a given source type
    pub fn parse<S: Into<String>, M: Into<String>>(source_type: S, message: M) -> Self {
        Self::ParseError {
            source_type: source_type.into(),
            message: message.into(),
        }
    }
}
