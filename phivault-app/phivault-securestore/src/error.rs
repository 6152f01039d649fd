//! Error types for keyring-backed storage.

use phivault_core::PhiVaultError;
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", content = "message")]
pub enum Error {
    /// The OS keyring cannot be reached (no Secret Service, locked keychain).
    #[error("Secure storage not available: {0}")]
    NotAvailable(String),

    /// The OS refused access to the entry.
    #[error("Access denied to secure storage")]
    AccessDenied,

    /// A value read back after a write did not match what was written.
    #[error("Secure storage verification failed for {0}")]
    VerificationFailed(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<Error> for PhiVaultError {
    fn from(err: Error) -> Self {
        match err {
            Error::VerificationFailed(_) => PhiVaultError::StorageWriteFailed(err.to_string()),
            other => PhiVaultError::KeyStore(other.to_string()),
        }
    }
}
