//! Biometric Hardware Adapter.
//!
//! A thin capability over the platform's local-authentication API. The
//! adapter never retries: `prompt` shows exactly one system prompt.

mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use scripted::ScriptedBiometrics;

/// Biometric mechanism reported by the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BiometricKind {
    /// Face ID (iOS) or face unlock (Android).
    Face,
    /// Touch ID (iOS) or fingerprint (Android).
    Fingerprint,
    Iris,
}

#[async_trait]
pub trait BiometricHardware: Send + Sync {
    async fn has_hardware(&self) -> Result<bool>;

    async fn is_enrolled(&self) -> Result<bool>;

    async fn supported_kinds(&self) -> Result<Vec<BiometricKind>>;

    /// Show one system prompt and report whether the user passed it.
    async fn prompt(&self, message: &str) -> Result<bool>;
}

impl std::fmt::Display for BiometricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Face => write!(f, "face"),
            Self::Fingerprint => write!(f, "fingerprint"),
            Self::Iris => write!(f, "iris"),
        }
    }
}
