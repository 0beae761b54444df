//! Error types for reconciliation.
//!
//! Every error aborts the run. Nothing is retried and composite operations
//! are not rolled back; re-running picks up from the current state.

use std::io;
use std::path::PathBuf;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while converging a host.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A non-directory sits where a directory is required, or a directory
    /// sits where a file is required.
    #[error("path conflict at {path}: {message}")]
    PathConflict {
        /// Offending path.
        path: PathBuf,
        /// What was found there.
        message: String,
    },

    /// A user or group name could not be resolved.
    #[error("unknown {kind}: {name}")]
    UnknownAccount {
        /// "user" or "group".
        kind: &'static str,
        /// The name that failed to resolve.
        name: String,
    },

    /// Arguments were missing, contradictory or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A path that must already exist does not.
    #[error("not found: {}", path.display())]
    NotFound {
        /// Missing path.
        path: PathBuf,
    },

    /// Downloaded bytes did not match an expected digest.
    #[error("checksum mismatch for {}: {algorithm} expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        /// Destination file.
        path: PathBuf,
        /// Algorithm name.
        algorithm: String,
        /// Digest that was asked for.
        expected: String,
        /// Digest of what was written.
        actual: String,
    },

    /// An external program exited nonzero or could not be started.
    #[error("command failed: {command}: {message}")]
    ExternalCommandFailure {
        /// The command line.
        command: String,
        /// Stderr or the spawn error.
        message: String,
    },

    /// A template could not be rendered.
    #[error("template render failed: {0}")]
    Render(String),

    /// Fetching a URL failed.
    #[error(transparent)]
    Fetch(#[from] fetchkit::Error),

    /// IO error with path context.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a path-conflict error.
    pub fn conflict(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::PathConflict {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Unknown user.
    pub fn unknown_user(name: impl Into<String>) -> Self {
        Self::UnknownAccount {
            kind: "user",
            name: name.into(),
        }
    }

    /// Unknown group.
    pub fn unknown_group(name: impl Into<String>) -> Self {
        Self::UnknownAccount {
            kind: "group",
            name: name.into(),
        }
    }

    /// External command failure.
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalCommandFailure {
            command: command.into(),
            message: message.into(),
        }
    }
}

impl From<pkgkit::Error> for Error {
    fn from(err: pkgkit::Error) -> Self {
        match err {
            pkgkit::Error::InvalidConstraint { .. } => Self::InvalidArgument(err.to_string()),
            pkgkit::Error::CommandFailed { command, stderr } => {
                Self::ExternalCommandFailure {
                    command,
                    message: stderr,
                }
            }
            pkgkit::Error::Io(source) => Self::Io {
                path: PathBuf::new(),
                source,
            },
            other => Self::ExternalCommandFailure {
                command: "package manager".to_string(),
                message: format!("{} ({})", other, other.category().advice()),
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}
