//! Desktop platform adapters for `phivault-core`: an OS keyring key store
//! and a biometric adapter that reports no hardware.

mod biometric;
#[cfg(any(target_os = "macos", target_os = "windows", target_os = "linux"))]
mod desktop;
mod error;
mod models;

pub use biometric::DesktopBiometrics;
#[cfg(any(target_os = "macos", target_os = "windows", target_os = "linux"))]
pub use desktop::{KeyringKeyStore, DEFAULT_SERVICE};
pub use error::{Error, Result};
pub use models::{SecretStorageMethod, SecretStorageStatus};
