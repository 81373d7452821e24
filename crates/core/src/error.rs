//! Error types for build context resolution
//!
//! Every variant here is fatal: when derived state cannot be produced the run
//! aborts and no partial plan is emitted.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors raised while resolving the build context
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    /// A version literal could not be parsed
    #[error("Invalid version literal '{input}'")]
    #[diagnostic(
        code(kiteplan::version::invalid),
        help("Versions are dot-separated alphanumeric segments starting with a digit, e.g. 7.1.0.alpha")
    )]
    InvalidVersion {
        /// The rejected input
        input: String,
    },

    /// The project's version marker file does not exist
    #[error("No version file found at {}", path.display())]
    #[diagnostic(
        code(kiteplan::context::missing_version_file),
        help("Check out the project under test or run from its root with BUILDKITE_PIPELINE_NAME=rails-ci")
    )]
    MissingVersionFile {
        /// Expected path of the version file
        path: PathBuf,
    },

    /// Reading a project file failed
    #[error("Failed to read {}: {message}", path.display())]
    #[diagnostic(code(kiteplan::io))]
    Io {
        /// Path that could not be read
        path: PathBuf,
        /// Underlying error message
        message: String,
    },

    /// The runtime matrix is too small to designate a primary runtime
    #[error("A primary runtime needs at least two runtimes in the matrix, found {count}")]
    #[diagnostic(
        code(kiteplan::context::insufficient_runtimes),
        help("Pass at least two versions with --rubies")
    )]
    InsufficientRuntimes {
        /// Number of runtimes configured
        count: usize,
    },
}

impl Error {
    /// Create an invalid version error
    #[must_use]
    pub fn invalid_version(input: impl Into<String>) -> Self {
        Self::InvalidVersion {
            input: input.into(),
        }
    }

    /// Create a missing version file error
    #[must_use]
    pub fn missing_version_file(path: impl Into<PathBuf>) -> Self {
        Self::MissingVersionFile { path: path.into() }
    }

    /// Create an IO error
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Io {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an insufficient runtimes error
    #[must_use]
    pub const fn insufficient_runtimes(count: usize) -> Self {
        Self::InsufficientRuntimes { count }
    }
}

/// Result type alias for kiteplan operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_version_message() {
        let error = Error::invalid_version("not-a-version");
        assert_eq!(error.to_string(), "Invalid version literal 'not-a-version'");
    }

    #[test]
    fn test_missing_version_file_message() {
        let error = Error::missing_version_file("/tmp/rails/RAILS_VERSION");
        assert_eq!(
            error.to_string(),
            "No version file found at /tmp/rails/RAILS_VERSION"
        );
    }

    #[test]
    fn test_insufficient_runtimes_message() {
        let error = Error::insufficient_runtimes(1);
        assert_eq!(
            error.to_string(),
            "A primary runtime needs at least two runtimes in the matrix, found 1"
        );
    }

    #[test]
    fn test_diagnostic_code() {
        let error = Error::insufficient_runtimes(0);
        let code = error.code().map(|c| c.to_string());
        assert_eq!(
            code.as_deref(),
            Some("kiteplan::context::insufficient_runtimes")
        );
    }
}
