//! Error types for package manager operations.
//!
//! Errors carry a category so callers can give actionable feedback. The
//! reconciliation layer never retries on its own; a failed install aborts
//! the run and the next run picks up where this one stopped.

use thiserror::Error;

/// Categories of package manager errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Repository or mirror could not be reached
    Network,
    /// Package or version not known to the manager
    NotFound,
    /// Not running with enough privileges, or the manager lock is held
    Permission,
    /// The constraint string could not be parsed
    InvalidInput,
    /// The package manager executable is missing
    ManagerNotFound,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::NotFound => "Package not found",
            Self::Permission => "Permission denied",
            Self::InvalidInput => "Invalid package constraint",
            Self::ManagerNotFound => "Package manager not installed",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check the package mirrors and try again",
            Self::NotFound => "Refresh the package index or check the package name and version",
            Self::Permission => "Run as root and make sure no other package manager is running",
            Self::InvalidInput => "Use name, name=version, name==version or name>=version",
            Self::ManagerNotFound => "Install the package manager or select another backend",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur during package manager operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The package manager executable could not be found
    #[error("package manager not found: {manager}")]
    ManagerNotFound {
        /// Name of the missing executable
        manager: String,
    },

    /// A constraint string could not be parsed
    #[error("invalid package constraint '{constraint}': {message}")]
    InvalidConstraint {
        /// The constraint as written
        constraint: String,
        /// Why it was rejected
        message: String,
    },

    /// Network-related failure reported by the manager
    #[error("network error: {message}")]
    Network {
        /// Output of the failed command
        message: String,
    },

    /// The manager does not know the requested package or version
    #[error("package not found: {message}")]
    NotFound {
        /// Output of the failed command
        message: String,
    },

    /// Permission denied or lock held
    #[error("permission denied: {message}")]
    Permission {
        /// Output of the failed command
        message: String,
    },

    /// Command execution failed
    #[error("command failed: {command}: {stderr}")]
    CommandFailed {
        /// The command line that failed
        command: String,
        /// Standard error output from the failed command
        stderr: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ManagerNotFound { .. } => ErrorCategory::ManagerNotFound,
            Error::InvalidConstraint { .. } => ErrorCategory::InvalidInput,
            Error::Network { .. } => ErrorCategory::Network,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Permission { .. } => ErrorCategory::Permission,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error came from a package manager process exiting nonzero.
    pub fn is_command_failure(&self) -> bool {
        matches!(
            self,
            Error::Network { .. }
                | Error::NotFound { .. }
                | Error::Permission { .. }
                | Error::CommandFailed { .. }
        )
    }

    /// Create an error from the output of a failed package manager command.
    ///
    /// Analyzes stderr to categorize the error appropriately.
    pub fn from_command_output(command: &str, stderr: &str) -> Self {
        let stderr_lower = stderr.to_lowercase();

        if stderr_lower.contains("could not resolve")
            || stderr_lower.contains("temporary failure resolving")
            || stderr_lower.contains("failed to fetch")
            || stderr_lower.contains("connection refused")
            || stderr_lower.contains("timed out")
            || stderr_lower.contains("network is unreachable")
        {
            return Error::Network {
                message: stderr.trim().to_string(),
            };
        }

        if stderr_lower.contains("unable to locate package")
            || stderr_lower.contains("has no installation candidate")
            || stderr_lower.contains("version '") && stderr_lower.contains("was not found")
            || stderr_lower.contains("no matching distribution found")
        {
            return Error::NotFound {
                message: stderr.trim().to_string(),
            };
        }

        if stderr_lower.contains("permission denied")
            || stderr_lower.contains("are you root")
            || stderr_lower.contains("could not get lock")
            || stderr_lower.contains("unable to acquire the dpkg frontend lock")
        {
            return Error::Permission {
                message: stderr.trim().to_string(),
            };
        }

        Error::CommandFailed {
            command: command.to_string(),
            stderr: stderr.trim().to_string(),
        }
    }
}

/// Result type for package manager operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_output_network() {
        let err = Error::from_command_output(
            "apt-get install -y curl",
            "E: Failed to fetch http://deb.debian.org/debian/pool/main/c/curl.deb",
        );
        assert_eq!(err.category(), ErrorCategory::Network);
        assert!(err.is_command_failure());
    }

    #[test]
    fn test_from_output_not_found() {
        let err = Error::from_command_output(
            "apt-get install -y nosuchthing",
            "E: Unable to locate package nosuchthing",
        );
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_from_output_pinned_version_not_found() {
        let err = Error::from_command_output(
            "apt-get install -y curl=0.0.1",
            "E: Version '0.0.1' for 'curl' was not found",
        );
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_from_output_permission() {
        let err = Error::from_command_output(
            "apt-get update",
            "E: Could not open lock file /var/lib/apt/lists/lock - open (13: Permission denied)",
        );
        assert_eq!(err.category(), ErrorCategory::Permission);
    }

    #[test]
    fn test_from_output_fallback() {
        let err = Error::from_command_output("pip install foo", "something odd\n");
        assert_eq!(err.category(), ErrorCategory::Other);
        assert!(err.is_command_failure());
        assert_eq!(err.to_string(), "command failed: pip install foo: something odd");
    }

    #[test]
    fn test_invalid_constraint_is_not_command_failure() {
        let err = Error::InvalidConstraint {
            constraint: "foo>1".into(),
            message: "only >= is supported".into(),
        };
        assert!(!err.is_command_failure());
        assert_eq!(err.category(), ErrorCategory::InvalidInput);
    }
}
