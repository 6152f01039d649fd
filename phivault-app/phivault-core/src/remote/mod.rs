//! Remote collaborators.
//!
//! The profile store is a write-mostly audit mirror of each owner's
//! biometric configuration. The document store, sync queue and token
//! provider are only ever asked to purge themselves during logout.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::biometric::BiometricKind;
use crate::error::Result;

pub use memory::MemoryProfileStore;

/// The remote copy of an owner's biometric configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBiometricProfile {
    pub owner_id: String,
    pub enabled: bool,
    pub mechanism_kind: Option<BiometricKind>,
    pub fallback_enabled: bool,
    /// Leading characters of the PIN digest, never the digest itself.
    pub pin_fragment: Option<String>,
    pub require_on_launch: bool,
    pub require_after_background_seconds: u32,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A partial write. `None` fields are left untouched; `locked_until` uses a
/// nested option so the lock can be cleared explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub enabled: Option<bool>,
    pub mechanism_kind: Option<BiometricKind>,
    pub fallback_enabled: Option<bool>,
    pub pin_fragment: Option<String>,
    pub require_on_launch: Option<bool>,
    pub require_after_background_seconds: Option<u32>,
    pub failed_attempts: Option<u32>,
    pub locked_until: Option<Option<DateTime<Utc>>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RemoteBiometricProfile {
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(kind) = update.mechanism_kind {
            self.mechanism_kind = Some(kind);
        }
        if let Some(fallback) = update.fallback_enabled {
            self.fallback_enabled = fallback;
        }
        if let Some(ref fragment) = update.pin_fragment {
            self.pin_fragment = Some(fragment.clone());
        }
        if let Some(on_launch) = update.require_on_launch {
            self.require_on_launch = on_launch;
        }
        if let Some(seconds) = update.require_after_background_seconds {
            self.require_after_background_seconds = seconds;
        }
        if let Some(attempts) = update.failed_attempts {
            self.failed_attempts = attempts;
        }
        if let Some(locked_until) = update.locked_until {
            self.locked_until = locked_until;
        }
        if update.updated_at.is_some() {
            self.updated_at = update.updated_at;
        }
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Merge `update` into the owner's profile, creating it if needed.
    async fn update_profile(&self, owner_id: &str, update: ProfileUpdate) -> Result<()>;

    async fn read_profile(&self, owner_id: &str) -> Result<Option<RemoteBiometricProfile>>;
}

/// Remote PHI documents cached on the device.
#[async_trait]
pub trait PhiDocumentStore: Send + Sync {
    async fn clear(&self) -> Result<()>;
}

/// Offline writes waiting to be synced.
#[async_trait]
pub trait SyncQueue: Send + Sync {
    async fn clear_queue(&self) -> Result<()>;
}

/// The remote identity provider's session.
#[async_trait]
pub trait AuthTokenProvider: Send + Sync {
    async fn sign_out(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_leaves_unset_fields() {
        let mut profile = RemoteBiometricProfile {
            owner_id: "owner".into(),
            enabled: true,
            failed_attempts: 2,
            ..Default::default()
        };

        profile.apply(&ProfileUpdate {
            failed_attempts: Some(3),
            ..Default::default()
        });

        assert!(profile.enabled);
        assert_eq!(profile.failed_attempts, 3);
    }

    #[test]
    fn test_apply_can_clear_lock() {
        let mut profile = RemoteBiometricProfile {
            locked_until: Some(Utc::now()),
            ..Default::default()
        };

        profile.apply(&ProfileUpdate {
            locked_until: Some(None),
            ..Default::default()
        });

        assert!(profile.locked_until.is_none());
    }
}
