//! Error types for faultline

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Configuration Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Provisioning Errors ===
    #[error("Provisioning failed for {resource}: {reason}")]
    Provisioning { resource: String, reason: String },

    // === Container Runtime Errors ===
    #[error("Container runtime error: {0}")]
    Runtime(String),

    // === Coordination Service Errors ===
    #[error("Coordination service error: {0}")]
    Coordination(String),

    #[error("Failed to decode payload at {path}: {reason}")]
    Decode { path: String, reason: String },

    // === Storage Client Errors ===
    #[error("Storage client error: {0}")]
    Storage(String),

    #[error("Malformed service locator: {0}")]
    MalformedLocator(String),

    // === Test Verdicts ===
    #[error("Assertion failed: expected {expected}, got {actual}")]
    Assertion { expected: String, actual: String },

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    // === Generic ===
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn provisioning(resource: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Provisioning {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }

    pub fn assertion(expected: impl std::fmt::Display, actual: impl std::fmt::Display) -> Self {
        Error::Assertion {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Is this a harness verdict (expectation mismatch or recovery timeout)
    /// as opposed to an infrastructure failure?
    pub fn is_verdict(&self) -> bool {
        matches!(self, Error::Assertion { .. } | Error::Timeout(_))
    }

    /// A timeout verdict means the system under test likely failed to
    /// recover; an assertion verdict means it recovered to the wrong state.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

// Implement From for common error types
impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
