//! PIN credential: Argon2id digest with a per-owner random salt.
//!
//! The PIN itself is never stored. Verification re-derives the digest with
//! the stored salt and parameters and compares in constant time.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{PhiVaultError, Result};

pub const SALT_SIZE: usize = 16;
const DIGEST_LEN: usize = 32;

/// Leading hex characters of the digest shared with the remote mirror.
const FRAGMENT_LEN: usize = 16;

/// Argon2id cost parameters. Stored with every digest so a change of
/// defaults does not invalidate existing PINs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinKdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PinKdfParams {
    /// 64 MB, 3 passes, 4 lanes.
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl PinKdfParams {
    pub fn validate(&self) -> Result<()> {
        self.params().map(|_| ())
    }

    fn params(&self) -> Result<Params> {
        Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(DIGEST_LEN),
        )
        .map_err(|e| PhiVaultError::Config(format!("Invalid Argon2 params: {}", e)))
    }

    fn derive(&self, pin: &str, salt: &[u8]) -> Result<Zeroizing<[u8; DIGEST_LEN]>> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params()?);

        let mut digest = Zeroizing::new([0u8; DIGEST_LEN]);
        argon2
            .hash_password_into(pin.as_bytes(), salt, &mut digest[..])
            .map_err(|e| PhiVaultError::KeyDerivation(e.to_string()))?;
        Ok(digest)
    }
}

/// Reject PINs that are too short, then PINs with anything but ASCII digits.
pub fn validate_pin(pin: &str, min_length: usize) -> Result<()> {
    if pin.chars().count() < min_length {
        return Err(PhiVaultError::WeakPin { min_length });
    }
    if !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(PhiVaultError::InvalidPinFormat);
    }
    Ok(())
}

#[derive(Clone, Serialize, Deserialize)]
pub struct PinDigest {
    /// Hex encoded.
    salt: String,
    /// Hex encoded.
    digest: String,
    kdf: PinKdfParams,
}

impl PinDigest {
    /// Derive a digest under a fresh random salt. CPU and memory heavy; call
    /// from a blocking context.
    pub fn derive(pin: &str, kdf: PinKdfParams) -> Result<Self> {
        let mut salt = [0u8; SALT_SIZE];
        rand::rng().fill_bytes(&mut salt);

        let digest = kdf.derive(pin, &salt)?;
        Ok(Self {
            salt: hex::encode(salt),
            digest: hex::encode(&digest[..]),
            kdf,
        })
    }

    /// Re-derive and compare in constant time.
    pub fn matches(&self, pin: &str) -> Result<bool> {
        let salt = hex::decode(&self.salt)
            .map_err(|_| PhiVaultError::KeyStore("stored PIN salt is malformed".into()))?;
        let expected = Zeroizing::new(
            hex::decode(&self.digest)
                .map_err(|_| PhiVaultError::KeyStore("stored PIN digest is malformed".into()))?,
        );

        let candidate = self.kdf.derive(pin, &salt)?;
        Ok(candidate[..].ct_eq(&expected[..]).into())
    }

    /// Verification fragment for the remote mirror.
    pub fn fragment(&self) -> String {
        self.digest.chars().take(FRAGMENT_LEN).collect()
    }

    pub fn kdf(&self) -> PinKdfParams {
        self.kdf
    }
}

impl std::fmt::Debug for PinDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinDigest")
            .field("digest", &"[REDACTED]")
            .field("kdf", &self.kdf)
            .finish()
    }
}
