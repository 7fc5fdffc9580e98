//! Error types for brickwork

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Parse Errors ===
    #[error("Unable to find State for string: {0}")]
    ParseState(String),

    #[error("Parse error: {0}")]
    Parse(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config source error: {0}")]
    Config(#[from] config::ConfigError),

    // === Cluster CLI Errors ===
    #[error("Command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("The brick list is empty: {0}")]
    EmptyBrickList(String),

    // === Coordination Errors ===
    #[error("Coordination timeout: {0}")]
    CoordinationTimeout(String),

    #[error("Local peer {0} is not part of the peer list")]
    LocalPeerNotFound(String),

    #[error("Marker store error: {0}")]
    Marker(String),

    // === Generic ===
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Can the caller reasonably try the same invocation again?
    ///
    /// Nothing inside the crate retries on its own; this only informs the
    /// caller's retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::CommandFailed { .. } | Error::CoordinationTimeout(_) | Error::Io(_)
        )
    }
}

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        let failed = Error::CommandFailed {
            command: "gluster volume create".into(),
            reason: "peer not in cluster".into(),
        };
        assert!(failed.is_retryable());
        assert!(Error::CoordinationTimeout("peers".into()).is_retryable());
        assert!(!Error::InvalidConfig("bad".into()).is_retryable());
        assert!(!Error::ParseState("bogus".into()).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = Error::ParseState("bogus".into());
        assert_eq!(err.to_string(), "Unable to find State for string: bogus");
        let err: Error = "plain".into();
        assert_eq!(err.to_string(), "plain");
    }
}
