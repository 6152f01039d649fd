//! In-memory key store.
//!
//! NOT secure for production use: values live in process memory. Used by
//! tests and by hosts that have no platform keychain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::RwLock;

use super::{AccessPolicy, KeyStore};
use crate::error::{PhiVaultError, Result};

#[derive(Default)]
pub struct MemoryKeyStore {
    entries: RwLock<HashMap<String, (String, AccessPolicy)>>,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
    /// Writes still allowed before every write fails. `None` is unlimited.
    write_budget: Mutex<Option<usize>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also lifts any budget set by [`fail_writes_after`](Self::fail_writes_after).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
        *self.write_budget.lock() = None;
    }

    /// Let `writes` more writes through, then refuse every write.
    pub fn fail_writes_after(&self, writes: usize) {
        *self.write_budget.lock() = Some(writes);
    }

    fn write_allowed(&self) -> bool {
        if self.fail_writes.load(Ordering::SeqCst) {
            return false;
        }
        match self.write_budget.lock().as_mut() {
            Some(0) => false,
            Some(left) => {
                *left -= 1;
                true
            }
            None => true,
        }
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    pub async fn policy_of(&self, name: &str) -> Option<AccessPolicy> {
        self.entries.read().await.get(name).map(|(_, policy)| *policy)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn set(&self, name: &str, value: &str, policy: AccessPolicy) -> Result<()> {
        if !self.write_allowed() {
            return Err(PhiVaultError::StorageWriteFailed(format!(
                "write refused for {}",
                name
            )));
        }
        self.entries
            .write()
            .await
            .insert(name.to_string(), (value.to_string(), policy));
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .read()
            .await
            .get(name)
            .map(|(value, _)| value.clone()))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(PhiVaultError::KeyStore(format!("delete refused for {}", name)));
        }
        self.entries.write().await.remove(name);
        Ok(())
    }
}
