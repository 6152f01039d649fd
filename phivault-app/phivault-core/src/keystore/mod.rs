//! Key Store Adapter: opaque per-name secret storage with a device access policy.
//!
//! The store offers no enumeration, so every caller tracks the exact set of
//! names it writes (see the archive index kept by the encryption service).

mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use memory::MemoryKeyStore;

/// When the platform lets a stored value be read back.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPolicy {
    /// Readable only while the device is unlocked; never migrates to a backup.
    #[default]
    WhenUnlockedThisDeviceOnly,
    /// Readable after the first unlock following boot; never migrates.
    AfterFirstUnlockThisDeviceOnly,
}

#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn set(&self, name: &str, value: &str, policy: AccessPolicy) -> Result<()>;

    async fn get(&self, name: &str) -> Result<Option<String>>;

    /// Deleting an absent name succeeds.
    async fn delete(&self, name: &str) -> Result<()>;
}

impl std::fmt::Display for AccessPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WhenUnlockedThisDeviceOnly => write!(f, "when_unlocked_this_device_only"),
            Self::AfterFirstUnlockThisDeviceOnly => {
                write!(f, "after_first_unlock_this_device_only")
            }
        }
    }
}
