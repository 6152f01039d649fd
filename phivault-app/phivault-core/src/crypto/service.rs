//! EncryptionService - per-owner AES-256-GCM key lifecycle and payload
//! encryption.
//!
//! Key material lives only in the key store. Every operation reads it back,
//! checks it against the digest recorded in its metadata, and drops (and
//! zeroizes) it before returning.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::envelope::{open, seal, EncryptedEnvelope, ALGORITHM};
use super::key::{ArchivedKey, EncryptionKey, KeyMaterial, KeySlots};
use crate::clock::Clock;
use crate::error::{PhiVaultError, Result};
use crate::files::FileSystem;
use crate::keystore::{AccessPolicy, KeyStore};
use crate::storage::ProtectionSettings;

const KEY_POLICY: AccessPolicy = AccessPolicy::WhenUnlockedThisDeviceOnly;

struct CurrentKey {
    meta: EncryptionKey,
    material: KeyMaterial,
}

pub struct EncryptionService {
    key_store: Arc<dyn KeyStore>,
    files: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
    key_lifetime: Duration,
    archived_generations: usize,
    max_file_size: u64,
    temp_dir: PathBuf,
    /// Held by initialize, rotate and clear.
    key_lock: Mutex<()>,
}

impl EncryptionService {
    pub fn new(
        key_store: Arc<dyn KeyStore>,
        files: Arc<dyn FileSystem>,
        clock: Arc<dyn Clock>,
        settings: &ProtectionSettings,
    ) -> Self {
        Self {
            key_store,
            files,
            clock,
            key_lifetime: settings.key_lifetime(),
            archived_generations: settings.archived_key_generations,
            max_file_size: settings.max_file_size_bytes,
            temp_dir: settings.temp_dir(),
            key_lock: Mutex::new(()),
        }
    }

    /// Create and persist a key for `owner_id` unless one already exists.
    pub async fn initialize(&self, owner_id: &str) -> Result<()> {
        let _guard = self.key_lock.lock().await;
        let slots = KeySlots::for_owner(owner_id);

        if self.load_current(&slots).await?.is_some() {
            debug!("Encryption key already present for owner {}", owner_id);
            return Ok(());
        }

        let material = KeyMaterial::generate()?;
        let meta = EncryptionKey::describe(owner_id, &material, self.clock.now(), self.key_lifetime);

        if let Err(e) = self.store_current(&slots, &meta, &material).await {
            // Material without metadata would read back as corrupted.
            if let Err(cleanup) = self.key_store.delete(slots.current()).await {
                warn!("Failed to remove partially stored key: {}", cleanup);
            }
            return Err(e);
        }

        info!("Created encryption key {} for owner {}", meta.id, owner_id);
        Ok(())
    }

    /// Encrypt `plaintext` under the owner's current key with a fresh IV.
    pub async fn encrypt(&self, plaintext: &[u8], owner_id: &str) -> Result<EncryptedEnvelope> {
        let current = self.require_current(&KeySlots::for_owner(owner_id)).await?;
        seal(&current.material, &current.meta.id, plaintext)
    }

    /// Decrypt an envelope produced by [`encrypt`](Self::encrypt), under the
    /// current key or any archived generation.
    pub async fn decrypt(&self, sealed: &EncryptedEnvelope, owner_id: &str) -> Result<Vec<u8>> {
        if sealed.algorithm_tag != ALGORITHM {
            return Err(PhiVaultError::UnsupportedAlgorithm(
                sealed.algorithm_tag.clone(),
            ));
        }

        let material = self
            .resolve_key(&KeySlots::for_owner(owner_id), &sealed.key_id)
            .await?;
        open(&material, sealed)
    }

    /// Read the whole file and encrypt its bytes.
    pub async fn encrypt_file(&self, path: &Path, owner_id: &str) -> Result<EncryptedEnvelope> {
        let current = self.require_current(&KeySlots::for_owner(owner_id)).await?;

        let info = self.files.info(path).await?;
        if !info.exists {
            return Err(PhiVaultError::FileNotFound(path.to_path_buf()));
        }
        self.check_size(info.size)?;

        let contents = Zeroizing::new(self.files.read(path).await?);
        // The file may have grown since `info`.
        self.check_size(contents.len() as u64)?;

        let sealed = seal(&current.material, &current.meta.id, &contents)?;
        debug!("Encrypted file of {} bytes", contents.len());
        Ok(sealed)
    }

    /// Decrypt into a new uniquely named file under the temp directory and
    /// return its path. The caller owns the file.
    pub async fn decrypt_file(&self, sealed: &EncryptedEnvelope, owner_id: &str) -> Result<PathBuf> {
        let plaintext = Zeroizing::new(self.decrypt(sealed, owner_id).await?);

        let path = self
            .temp_dir
            .join(format!("decrypted_{}", Uuid::new_v4().simple()));
        self.files.write(&path, &plaintext).await?;

        debug!("Decrypted file written to {:?}", path);
        Ok(path)
    }

    /// Replace the current key, archiving the outgoing one first.
    ///
    /// The new material and its metadata are two writes. Until both land the
    /// metadata still names the outgoing key, which is already archived, so
    /// [`load_current`](Self::load_current) recovers it from the archive.
    pub async fn rotate_key(&self, owner_id: &str) -> Result<()> {
        let _guard = self.key_lock.lock().await;
        let slots = KeySlots::for_owner(owner_id);
        let now = self.clock.now();

        let material = KeyMaterial::generate()?;
        let meta = EncryptionKey::describe(owner_id, &material, now, self.key_lifetime);

        let Some(previous) = self.load_current(&slots).await? else {
            self.store_current(&slots, &meta, &material).await?;
            info!("No key to rotate for owner {}, created {}", owner_id, meta.id);
            return Ok(());
        };

        let mut index = self.load_archive_index(&slots).await?;
        if is_archived(&index, &previous.meta) {
            // Left behind by an interrupted rotation.
            debug!("Key {} is already archived", previous.meta.id);
        } else {
            self.archive(&slots, &previous, now, &mut index).await?;
        }

        if let Err(e) = self.store_current(&slots, &meta, &material).await {
            error!("Failed to store rotated key for owner {}: {}", owner_id, e);
            self.restore_current(&slots, &previous).await;
            return Err(e);
        }

        info!(
            "Rotated encryption key for owner {}: {} -> {}",
            owner_id, previous.meta.id, meta.id
        );

        self.prune_archive(&slots, index).await;
        Ok(())
    }

    /// Delete the current key, its metadata and every archived generation.
    pub async fn clear_keys(&self, owner_id: &str) -> Result<()> {
        let _guard = self.key_lock.lock().await;
        let slots = KeySlots::for_owner(owner_id);

        let mut names = vec![slots.current().to_string(), slots.metadata()];
        match self.load_archive_index(&slots).await {
            Ok(index) => names.extend(index.into_iter().map(|k| k.slot)),
            Err(e) => warn!(
                "Archive index for owner {} unreadable, archived slots may remain: {}",
                owner_id, e
            ),
        }
        names.push(slots.archive_index());

        let mut first_error = None;
        for name in &names {
            if let Err(e) = self.key_store.delete(name).await {
                warn!("Failed to delete key store entry: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Cleared encryption keys for owner {}", owner_id);
                Ok(())
            }
        }
    }

    pub async fn key_metadata(&self, owner_id: &str) -> Result<Option<EncryptionKey>> {
        Ok(self
            .load_current(&KeySlots::for_owner(owner_id))
            .await?
            .map(|current| current.meta))
    }

    /// Whether the current key is past its advisory lifetime.
    pub async fn needs_rotation(&self, owner_id: &str) -> Result<bool> {
        let current = self.require_current(&KeySlots::for_owner(owner_id)).await?;
        Ok(current.meta.is_expired(self.clock.now()))
    }

    // ------------------------------------------------------------------
    // Key store access
    // ------------------------------------------------------------------

    /// Copy `previous` into a fresh archive slot and record it in the index.
    async fn archive(
        &self,
        slots: &KeySlots,
        previous: &CurrentKey,
        now: DateTime<Utc>,
        index: &mut Vec<ArchivedKey>,
    ) -> Result<()> {
        let slot = slots.archived(now, index);
        self.key_store
            .set(&slot, &previous.material.encode(), KEY_POLICY)
            .await?;

        index.push(ArchivedKey {
            key_id: previous.meta.id.clone(),
            slot: slot.clone(),
            key_hash: previous.meta.key_hash.clone(),
            rotated_at: now,
        });
        if let Err(e) = self.save_archive_index(slots, index).await {
            index.pop();
            if let Err(cleanup) = self.key_store.delete(&slot).await {
                warn!("Failed to remove unindexed archive slot: {}", cleanup);
            }
            return Err(e);
        }
        Ok(())
    }

    /// The metadata is the commit record: material that does not match it is
    /// replaced by the archived copy of the key the metadata names, if any.
    async fn load_current(&self, slots: &KeySlots) -> Result<Option<CurrentKey>> {
        let Some(encoded) = self.key_store.get(slots.current()).await? else {
            return Ok(None);
        };
        let material = KeyMaterial::from_encoded(&Zeroizing::new(encoded))?;

        let meta_json = self
            .key_store
            .get(&slots.metadata())
            .await?
            .ok_or(PhiVaultError::KeyCorrupted)?;
        let meta: EncryptionKey =
            serde_json::from_str(&meta_json).map_err(|_| PhiVaultError::KeyCorrupted)?;

        let material = if material.digest() == meta.key_hash {
            material
        } else {
            match self.archived_copy(slots, &meta).await {
                Some(archived) => {
                    warn!(
                        "Current slot does not hold key {}, using its archived copy",
                        meta.id
                    );
                    archived
                }
                None => {
                    error!("Encryption key {} failed its integrity check", meta.id);
                    return Err(PhiVaultError::KeyCorrupted);
                }
            }
        };

        if meta.is_expired(self.clock.now()) {
            warn!(
                "Encryption key {} expired at {}, rotation needed",
                meta.id, meta.expires_at
            );
        }

        Ok(Some(CurrentKey { meta, material }))
    }

    async fn archived_copy(&self, slots: &KeySlots, meta: &EncryptionKey) -> Option<KeyMaterial> {
        let index = match self.load_archive_index(slots).await {
            Ok(index) => index,
            Err(e) => {
                warn!("Archive index unreadable: {}", e);
                return None;
            }
        };
        let archived = index
            .into_iter()
            .find(|k| k.key_id == meta.id && k.key_hash == meta.key_hash)?;

        let encoded = Zeroizing::new(self.key_store.get(&archived.slot).await.ok()??);
        let material = KeyMaterial::from_encoded(&encoded).ok()?;
        (material.digest() == meta.key_hash).then_some(material)
    }

    async fn require_current(&self, slots: &KeySlots) -> Result<CurrentKey> {
        self.load_current(slots)
            .await?
            .ok_or(PhiVaultError::KeyNotFound)
    }

    /// Current key if the id matches, else the archived generation, else the
    /// current key anyway and let authentication decide. A corrupted current
    /// key does not hide the archive.
    async fn resolve_key(&self, slots: &KeySlots, key_id: &str) -> Result<KeyMaterial> {
        let (current, corrupted) = match self.load_current(slots).await {
            Ok(current) => (current, false),
            Err(PhiVaultError::KeyCorrupted) => (None, true),
            Err(e) => return Err(e),
        };
        if let Some(c) = current.as_ref() {
            if c.meta.id == key_id {
                return Ok(c.material.clone());
            }
        }

        let index = self.load_archive_index(slots).await?;
        if let Some(archived) = index.iter().find(|k| k.key_id == key_id) {
            match self.key_store.get(&archived.slot).await? {
                Some(encoded) => {
                    let material = KeyMaterial::from_encoded(&Zeroizing::new(encoded))?;
                    if material.digest() != archived.key_hash {
                        error!("Archived key {} failed its integrity check", key_id);
                        return Err(PhiVaultError::KeyCorrupted);
                    }
                    debug!("Resolved archived key {}", key_id);
                    return Ok(material);
                }
                None => warn!("Archived key {} is indexed but its slot is empty", key_id),
            }
        }

        match current {
            Some(c) => Ok(c.material),
            None if corrupted => Err(PhiVaultError::KeyCorrupted),
            None => Err(PhiVaultError::KeyNotFound),
        }
    }

    async fn store_current(
        &self,
        slots: &KeySlots,
        meta: &EncryptionKey,
        material: &KeyMaterial,
    ) -> Result<()> {
        self.key_store
            .set(slots.current(), &material.encode(), KEY_POLICY)
            .await?;
        self.key_store
            .set(&slots.metadata(), &serde_json::to_string(meta)?, KEY_POLICY)
            .await
    }

    async fn restore_current(&self, slots: &KeySlots, previous: &CurrentKey) {
        match self
            .store_current(slots, &previous.meta, &previous.material)
            .await
        {
            Ok(()) => info!("Restored previous key {}", previous.meta.id),
            Err(e) => error!(
                "Failed to restore previous key {}, it remains archived: {}",
                previous.meta.id, e
            ),
        }
    }

    async fn load_archive_index(&self, slots: &KeySlots) -> Result<Vec<ArchivedKey>> {
        match self.key_store.get(&slots.archive_index()).await? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save_archive_index(&self, slots: &KeySlots, index: &[ArchivedKey]) -> Result<()> {
        self.key_store
            .set(&slots.archive_index(), &serde_json::to_string(index)?, KEY_POLICY)
            .await
    }

    /// Drop the oldest generations beyond the cap. Failures are logged and
    /// the affected entries stay indexed.
    async fn prune_archive(&self, slots: &KeySlots, index: Vec<ArchivedKey>) {
        if index.len() <= self.archived_generations {
            return;
        }
        let excess = index.len() - self.archived_generations;

        let mut retained = Vec::with_capacity(index.len());
        for (position, archived) in index.into_iter().enumerate() {
            if position < excess {
                match self.key_store.delete(&archived.slot).await {
                    Ok(()) => {
                        debug!("Pruned archived key {}", archived.key_id);
                        continue;
                    }
                    Err(e) => warn!("Failed to prune archived key {}: {}", archived.key_id, e),
                }
            }
            retained.push(archived);
        }

        if let Err(e) = self.save_archive_index(slots, &retained).await {
            warn!("Failed to save pruned archive index: {}", e);
        }
    }

    fn check_size(&self, size: u64) -> Result<()> {
        if size > self.max_file_size {
            return Err(PhiVaultError::FileTooLarge {
                size,
                limit: self.max_file_size,
            });
        }
        Ok(())
    }
}

fn is_archived(index: &[ArchivedKey], meta: &EncryptionKey) -> bool {
    index
        .iter()
        .any(|k| k.key_id == meta.id && k.key_hash == meta.key_hash)
}
