//! Error types for the link monitor
//!
//! Only configuration errors and command misuse surface through [`Error`].
//! Probe failures are expected outcomes and are folded into link state
//! (see [`crate::traits::ProbeError`]).

use thiserror::Error;

/// Result type alias for link monitor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the link monitor
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (fatal at construction)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A command named a link that does not exist
    #[error("Link not found: {0}")]
    LinkNotFound(String),

    /// `set_configured_address` on a link that has never been reached
    #[error("No current address known for link {0}")]
    NoCurrentAddress(String),

    /// I/O errors (reading configuration files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a "link not found" error
    pub fn link_not_found(name: impl Into<String>) -> Self {
        Self::LinkNotFound(name.into())
    }

    /// Create a "no current address" error
    pub fn no_current_address(name: impl Into<String>) -> Self {
        Self::NoCurrentAddress(name.into())
    }

    /// True for errors caused by invalid configuration
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::no_current_address("Link 1");
        assert_eq!(err.to_string(), "No current address known for link Link 1");
        assert!(Error::config("no primary link defined").is_config());
        assert!(!Error::link_not_found("vpn").is_config());
    }
}
