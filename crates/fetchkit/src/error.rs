//! Error types for fetching and verifying content.

use std::fmt;

/// Result type alias for fetch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of fetch errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection, DNS or timeout problems.
    Network,
    /// The server answered with an error status.
    Status,
    /// The caller asked for something unsupported.
    InvalidInput,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Status => "Server returned an error",
            Self::InvalidInput => "Invalid request",
            Self::Other => "Unexpected error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while fetching.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed before a usable response arrived.
    #[error("HTTP request for {url} failed: {message}")]
    Http {
        /// Requested URL.
        url: String,
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// Reading the response body failed.
    #[error("failed to read body of {url}: {message}")]
    Body {
        /// Requested URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// Hash algorithm name not recognised.
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

impl Error {
    /// Build an error from a ureq failure for a URL.
    pub fn from_ureq(url: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                url: url.to_string(),
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            other => Self::Http {
                url: url.to_string(),
                message: other.to_string(),
                status: None,
            },
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Http {
                status: Some(_), ..
            } => ErrorCategory::Status,
            Error::Http { .. } | Error::Body { .. } => ErrorCategory::Network,
            Error::UnsupportedAlgorithm(_) => ErrorCategory::InvalidInput,
        }
    }

    /// HTTP status code, when the server sent one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => *status,
            _ => None,
        }
    }
}
