//! Desktop stand-in for the biometric hardware adapter.

use async_trait::async_trait;
use phivault_core::biometric::{BiometricHardware, BiometricKind};
use phivault_core::{PhiVaultError, Result};
use tracing::debug;

/// Desktop builds have no local-authentication prompt, so auth falls back
/// to the PIN path.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopBiometrics;

#[async_trait]
impl BiometricHardware for DesktopBiometrics {
    async fn has_hardware(&self) -> Result<bool> {
        Ok(false)
    }

    async fn is_enrolled(&self) -> Result<bool> {
        Ok(false)
    }

    async fn supported_kinds(&self) -> Result<Vec<BiometricKind>> {
        Ok(Vec::new())
    }

    async fn prompt(&self, _message: &str) -> Result<bool> {
        debug!("Biometric prompt requested on desktop");
        Err(PhiVaultError::HardwareUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reports_no_hardware() {
        let hw = DesktopBiometrics;
        assert!(!hw.has_hardware().await.unwrap());
        assert!(hw.supported_kinds().await.unwrap().is_empty());
        assert!(matches!(
            hw.prompt("Unlock").await,
            Err(PhiVaultError::HardwareUnavailable)
        ));
    }
}
