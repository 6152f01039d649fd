use serde::{Deserialize, Serialize};

/// Backend that holds the secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecretStorageMethod {
    MacOSKeychain,
    WindowsCredentialManager,
    /// Secret Service API (GNOME Keyring, KWallet).
    LinuxSecretService,
}

impl SecretStorageMethod {
    /// Method for the platform this binary was built for.
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "macos") {
            Some(Self::MacOSKeychain)
        } else if cfg!(target_os = "windows") {
            Some(Self::WindowsCredentialManager)
        } else if cfg!(target_os = "linux") {
            Some(Self::LinuxSecretService)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretStorageStatus {
    pub available: bool,
    pub method: Option<SecretStorageMethod>,
    pub unavailable_reason: Option<String>,
}

impl SecretStorageStatus {
    pub fn available(method: SecretStorageMethod) -> Self {
        Self {
            available: true,
            method: Some(method),
            unavailable_reason: None,
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            method: None,
            unavailable_reason: Some(reason.into()),
        }
    }
}
