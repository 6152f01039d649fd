//! Biometric configuration and authentication status types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::biometric::BiometricKind;

/// An owner's local biometric/PIN configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricConfig {
    pub enabled: bool,
    pub mechanism_kind: Option<BiometricKind>,
    /// A PIN may be used when the biometric prompt fails.
    pub fallback_enabled: bool,
    pub require_on_launch: bool,
    pub require_after_background_seconds: u32,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl Default for BiometricConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mechanism_kind: None,
            fallback_enabled: false,
            require_on_launch: false,
            require_after_background_seconds: 300,
            failed_attempts: 0,
            locked_until: None,
        }
    }
}

/// Where an owner stands with respect to authentication.
///
/// - `Unconfigured` → `Enabled` (after biometric or PIN setup)
/// - `Enabled` → `Unlocking` → `Unlocked` (during and after a session unlock)
/// - any → `LockedOut` (too many failed PIN attempts, until the window ends)
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum AuthStatus {
    #[default]
    Unconfigured,
    Enabled,
    Unlocking,
    Unlocked,
    LockedOut,
}

impl std::fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unconfigured => write!(f, "Unconfigured"),
            Self::Enabled => write!(f, "Enabled"),
            Self::Unlocking => write!(f, "Unlocking"),
            Self::Unlocked => write!(f, "Unlocked"),
            Self::LockedOut => write!(f, "LockedOut"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_json_is_camel_case() {
        let config = BiometricConfig {
            enabled: true,
            mechanism_kind: Some(BiometricKind::Fingerprint),
            ..Default::default()
        };
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["mechanismKind"], "fingerprint");
        assert_eq!(json["requireAfterBackgroundSeconds"], 300);
        assert!(json["lockedUntil"].is_null());
    }

    #[test]
    fn test_status_serializes_like_display() {
        for status in [
            AuthStatus::Unconfigured,
            AuthStatus::Enabled,
            AuthStatus::Unlocking,
            AuthStatus::Unlocked,
            AuthStatus::LockedOut,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status));
        }
    }
}
