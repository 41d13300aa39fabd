//! Centralized error types for mboxcontacts.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mboxcontacts library.
#[derive(Error, Debug)]
pub enum ContactError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file or directory does not exist.
    #[error("Not found: {0}")]
    FileNotFound(PathBuf),

    /// An address string is not a usable `local@domain` email.
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// A record from the message source could not be decoded.
    #[error("Malformed message at offset {offset}: {reason}")]
    MalformedMessage { offset: u64, reason: String },

    /// The configuration is unusable. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The enrichment provider failed for one contact.
    #[error("Enrichment provider '{provider}' failed: {reason}")]
    Enrichment { provider: String, reason: String },

    /// JSON (de)serialization of a contact table failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An export operation failed.
    #[error("Export error: {0}")]
    Export(String),
}

/// Convenience alias for `Result<T, ContactError>`.
pub type Result<T> = std::result::Result<T, ContactError>;

impl ContactError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an `InvalidAddress` variant.
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// `true` for errors that only invalidate a single record, never the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress { .. } | Self::MalformedMessage { .. } | Self::Enrichment { .. }
        )
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `ContactError::io`).
impl From<std::io::Error> for ContactError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(ContactError::invalid_address("bob@", "empty domain").is_recoverable());
        assert!(ContactError::MalformedMessage {
            offset: 10,
            reason: "no headers".into()
        }
        .is_recoverable());
        assert!(!ContactError::Config("no internal domains".into()).is_recoverable());
    }

    #[test]
    fn test_invalid_address_message() {
        let err = ContactError::invalid_address("bob@", "empty domain part");
        assert_eq!(err.to_string(), "Invalid address 'bob@': empty domain part");
    }
}
