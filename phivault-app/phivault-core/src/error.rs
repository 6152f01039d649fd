//! Error types for the PHI protection subsystem.
//!
//! Errors are designed to be:
//! - Specific enough for programmatic handling (see [`PhiVaultError::code`])
//! - Safe to log: no variant ever carries plaintext, key material or PIN digits
//! - Serializable as `{ code, message }` for a host UI

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PhiVaultError {
    /// No current encryption key exists for the owner. Call `initialize()` first.
    #[error("Encryption key not found")]
    KeyNotFound,

    /// The platform RNG could not produce key material or an IV.
    #[error("Failed to generate encryption key")]
    KeyGenerationFailed,

    /// A stored key no longer matches its recorded digest.
    #[error("Stored encryption key failed its integrity check")]
    KeyCorrupted,

    /// The cipher rejected the input (plaintext beyond the GCM length limit).
    #[error("Failed to encrypt data")]
    EncryptionFailed,

    #[error("Unsupported encryption algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Authentication tag mismatch. Tamper and wrong-key are deliberately
    /// reported the same way.
    #[error("Failed to decrypt data. Data may be corrupted or tampered with")]
    DecryptionFailed,

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("File size {size} exceeds the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Biometric authentication not available on this device")]
    HardwareUnavailable,

    #[error("PIN must be at least {min_length} digits")]
    WeakPin { min_length: usize },

    #[error("PIN must contain only digits")]
    InvalidPinFormat,

    #[error("Account is locked due to too many failed attempts until {until}")]
    AccountLocked { until: DateTime<Utc> },

    #[error("Secure storage write failed: {0}")]
    StorageWriteFailed(String),

    #[error("Secure storage error: {0}")]
    KeyStore(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Logout finished, but one or more best-effort steps failed.
    #[error("Logout completed with failed steps: {}", failed_steps.join(", "))]
    Logout { failed_steps: Vec<&'static str> },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PhiVaultError {
    /// Stable error code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            PhiVaultError::KeyNotFound => "KEY_NOT_FOUND",
            PhiVaultError::KeyGenerationFailed => "KEY_GENERATION_FAILED",
            PhiVaultError::KeyCorrupted => "KEY_CORRUPTED",
            PhiVaultError::EncryptionFailed => "ENCRYPTION_FAILED",
            PhiVaultError::UnsupportedAlgorithm(_) => "UNSUPPORTED_ALGORITHM",
            PhiVaultError::DecryptionFailed => "DECRYPTION_FAILED",
            PhiVaultError::FileNotFound(_) => "FILE_NOT_FOUND",
            PhiVaultError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            PhiVaultError::HardwareUnavailable => "HARDWARE_UNAVAILABLE",
            PhiVaultError::WeakPin { .. } => "WEAK_PIN",
            PhiVaultError::InvalidPinFormat => "INVALID_PIN_FORMAT",
            PhiVaultError::AccountLocked { .. } => "ACCOUNT_LOCKED",
            PhiVaultError::StorageWriteFailed(_) => "STORAGE_WRITE_FAILED",
            PhiVaultError::KeyStore(_) => "KEY_STORE_ERROR",
            PhiVaultError::KeyDerivation(_) => "KEY_DERIVATION_ERROR",
            PhiVaultError::Remote(_) => "REMOTE_ERROR",
            PhiVaultError::Config(_) => "CONFIG_ERROR",
            PhiVaultError::Logout { .. } => "LOGOUT_INCOMPLETE",
            PhiVaultError::Serialization(_) => "SERIALIZATION_ERROR",
            PhiVaultError::Io(_) => "IO_ERROR",
        }
    }
}

// ============================================================================
// Serialization for host IPC
// ============================================================================

impl serde::Serialize for PhiVaultError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("PhiVaultError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

pub type Result<T> = std::result::Result<T, PhiVaultError>;
