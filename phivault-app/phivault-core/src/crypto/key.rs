//! Per-owner key material, its metadata, and the key store slot layout.

use aes_gcm::aead::{rand_core::RngCore, OsRng};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::envelope::ALGORITHM;
use crate::error::{PhiVaultError, Result};

/// 256-bit key for AES-256-GCM.
pub const KEY_SIZE: usize = 32;

const KEY_PREFIX: &str = "phi_encryption_key_";

/// A 256-bit encryption key with automatic zeroization on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    key: [u8; KEY_SIZE],
}

impl KeyMaterial {
    /// Draw a fresh key from the OS CSPRNG.
    pub(crate) fn generate() -> Result<Self> {
        let mut key = [0u8; KEY_SIZE];
        OsRng
            .try_fill_bytes(&mut key)
            .map_err(|_| PhiVaultError::KeyGenerationFailed)?;
        Ok(Self { key })
    }

    pub(crate) fn from_encoded(encoded: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(encoded.as_bytes())
                .map_err(|_| PhiVaultError::KeyCorrupted)?,
        );
        if bytes.len() != KEY_SIZE {
            return Err(PhiVaultError::KeyCorrupted);
        }

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&bytes);
        Ok(Self { key })
    }

    /// Base64 form written to the key store.
    pub(crate) fn encode(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(self.key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    /// SHA-256 of the material, hex encoded. Identifies the key without
    /// revealing it.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.key))
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Metadata stored beside the current key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionKey {
    pub id: String,
    pub owner_id: String,
    pub algorithm: String,
    pub key_hash: String,
    pub created_at: DateTime<Utc>,
    /// Advisory. An expired key still decrypts.
    pub expires_at: DateTime<Utc>,
}

impl EncryptionKey {
    pub(crate) fn describe(
        owner_id: &str,
        material: &KeyMaterial,
        now: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            owner_id: owner_id.to_string(),
            algorithm: ALGORITHM.to_string(),
            key_hash: material.digest(),
            created_at: now,
            expires_at: now + lifetime,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// One superseded key generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedKey {
    pub key_id: String,
    pub slot: String,
    pub key_hash: String,
    pub rotated_at: DateTime<Utc>,
}

/// Names of every key store entry belonging to one owner.
pub(crate) struct KeySlots {
    base: String,
}

impl KeySlots {
    pub(crate) fn for_owner(owner_id: &str) -> Self {
        Self {
            base: format!("{}{}", KEY_PREFIX, owner_id),
        }
    }

    pub(crate) fn current(&self) -> &str {
        &self.base
    }

    pub(crate) fn metadata(&self) -> String {
        format!("{}_metadata", self.base)
    }

    pub(crate) fn archive_index(&self) -> String {
        format!("{}_archive", self.base)
    }

    pub(crate) fn archived(&self, rotated_at: DateTime<Utc>, index: &[ArchivedKey]) -> String {
        let slot = format!("{}_old_{}", self.base, rotated_at.timestamp_millis());
        if !index.iter().any(|k| k.slot == slot) {
            return slot;
        }
        // Two rotations inside the same millisecond.
        (1..)
            .map(|n| format!("{}_{}", slot, n))
            .find(|candidate| !index.iter().any(|k| &k.slot == candidate))
            .unwrap_or(slot)
    }
}
