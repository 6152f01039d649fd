use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ProfileStore, ProfileUpdate, RemoteBiometricProfile};
use crate::error::{PhiVaultError, Result};

/// In-memory profile mirror with fault injection.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, RemoteBiometricProfile>>,
    offline: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a backend outage: every call fails.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PhiVaultError::Remote("profile store unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn update_profile(&self, owner_id: &str, update: ProfileUpdate) -> Result<()> {
        self.check()?;
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .entry(owner_id.to_string())
            .or_insert_with(|| RemoteBiometricProfile {
                owner_id: owner_id.to_string(),
                ..Default::default()
            });
        profile.apply(&update);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read_profile(&self, owner_id: &str) -> Result<Option<RemoteBiometricProfile>> {
        self.check()?;
        Ok(self.profiles.read().await.get(owner_id).cloned())
    }
}
