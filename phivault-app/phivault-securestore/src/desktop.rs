//! Key store backed by the OS keyring.
//!
//! - **macOS**: Keychain Access
//! - **Windows**: Credential Manager
//! - **Linux**: Secret Service API (GNOME Keyring, KWallet)
//!
//! Each key store name becomes one keyring account under a shared service
//! name. Keyring calls block, so they run on tokio's blocking pool.

use async_trait::async_trait;
use keyring::Entry;
use phivault_core::keystore::{AccessPolicy, KeyStore};
use phivault_core::PhiVaultError;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::models::{SecretStorageMethod, SecretStorageStatus};

pub const DEFAULT_SERVICE: &str = "com.phivault.keys";

/// Account probed by [`KeyringKeyStore::check_availability`].
const PROBE_ACCOUNT: &str = "availability-probe";

#[derive(Debug, Clone)]
pub struct KeyringKeyStore {
    service: String,
}

impl Default for KeyringKeyStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE)
    }
}

impl KeyringKeyStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Probe the keyring. A missing probe entry still means the keyring works.
    pub fn check_availability(&self) -> SecretStorageStatus {
        debug!("Checking keyring availability for service: {}", self.service);

        let Some(method) = SecretStorageMethod::current() else {
            return SecretStorageStatus::unavailable("No OS keyring on this platform");
        };

        let entry = match Entry::new(&self.service, PROBE_ACCOUNT) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Keyring not available: {}", e);
                return SecretStorageStatus::unavailable(format!(
                    "OS keyring not available: {}",
                    e
                ));
            }
        };

        match entry.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => {
                debug!("Keyring available, method: {:?}", method);
                SecretStorageStatus::available(method)
            }
            Err(e) => {
                warn!("Keyring not accessible: {:?}", e);
                SecretStorageStatus::unavailable(format!("OS keyring not accessible: {}", e))
            }
        }
    }

    async fn run<T, F>(task: F) -> phivault_core::Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(task)
            .await
            .map_err(|e| PhiVaultError::KeyStore(format!("keyring task failed: {}", e)))?
            .map_err(Into::into)
    }
}

fn entry(service: &str, name: &str) -> Result<Entry> {
    Entry::new(service, name).map_err(|e| {
        error!("Failed to create keyring entry {}: {}", name, e);
        map_keyring_error(e)
    })
}

fn write_entry(service: &str, name: &str, value: &str) -> Result<()> {
    entry(service, name)?.set_password(value).map_err(|e| {
        error!("Failed to store {} in keyring: {:?}", name, e);
        map_keyring_error(e)
    })?;

    // Read back through a fresh Entry so a cached value can't mask a lost write.
    match entry(service, name)?.get_password() {
        Ok(readback) if readback == value => {
            debug!("Stored and verified {} in OS keyring", name);
            Ok(())
        }
        Ok(_) => {
            error!("Keyring verification failed for {}: data mismatch", name);
            Err(Error::VerificationFailed(name.to_string()))
        }
        Err(e) => {
            error!("Keyring verification failed for {}: {:?}", name, e);
            Err(Error::VerificationFailed(name.to_string()))
        }
    }
}

fn read_entry(service: &str, name: &str) -> Result<Option<String>> {
    match entry(service, name)?.get_password() {
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => {
            error!("Failed to read {} from keyring: {:?}", name, e);
            Err(map_keyring_error(e))
        }
    }
}

fn delete_entry(service: &str, name: &str) -> Result<()> {
    match entry(service, name)?.delete_credential() {
        Ok(()) => {
            info!("Deleted {} from OS keyring", name);
            Ok(())
        }
        Err(keyring::Error::NoEntry) => {
            debug!("No {} to delete (already gone)", name);
            Ok(())
        }
        Err(e) => {
            error!("Failed to delete {} from keyring: {:?}", name, e);
            Err(map_keyring_error(e))
        }
    }
}

fn map_keyring_error(err: keyring::Error) -> Error {
    match err {
        keyring::Error::NoEntry => Error::Internal("Keyring entry vanished".into()),
        keyring::Error::Ambiguous(_) => Error::Internal("Multiple keyring entries found".into()),
        keyring::Error::NoStorageAccess(e) => {
            debug!("Keyring access denied: {:?}", e);
            Error::AccessDenied
        }
        keyring::Error::PlatformFailure(e) => {
            let msg = format!("{:?}", e);
            if msg.contains("Dbus") || msg.contains("dbus") || msg.contains("D-Bus") {
                Error::NotAvailable(format!(
                    "System keyring not available (D-Bus error): {}",
                    msg
                ))
            } else {
                Error::Internal(format!("Keyring error: {}", msg))
            }
        }
        keyring::Error::BadEncoding(_) => Error::Internal("Keyring value is not UTF-8".into()),
        other => Error::Internal(format!("Keyring error: {}", other)),
    }
}

#[async_trait]
impl KeyStore for KeyringKeyStore {
    async fn set(&self, name: &str, value: &str, policy: AccessPolicy) -> phivault_core::Result<()> {
        // The OS keyring decides accessibility itself; the policy is advisory here.
        debug!("Storing {} with policy {}", name, policy);
        let (service, name, value) = (self.service.clone(), name.to_string(), value.to_string());
        Self::run(move || write_entry(&service, &name, &value)).await
    }

    async fn get(&self, name: &str) -> phivault_core::Result<Option<String>> {
        let (service, name) = (self.service.clone(), name.to_string());
        Self::run(move || read_entry(&service, &name)).await
    }

    async fn delete(&self, name: &str) -> phivault_core::Result<()> {
        let (service, name) = (self.service.clone(), name.to_string());
        Self::run(move || delete_entry(&service, &name)).await
    }
}
