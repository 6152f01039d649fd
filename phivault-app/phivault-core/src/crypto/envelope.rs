//! The self-describing encrypted payload and the AES-256-GCM primitives that
//! produce and consume it.
//!
//! Wire shape (stable across versions):
//! `{ "ciphertext", "iv", "authTag", "algorithmTag", "keyId" }` with every byte
//! field base64 encoded.

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use serde::{Deserialize, Serialize};

use super::key::KeyMaterial;
use crate::error::{PhiVaultError, Result};

/// The only supported algorithm tag.
pub const ALGORITHM: &str = "AES-256-GCM";

/// Nonce size for AES-GCM (96 bits = 12 bytes)
pub const IV_SIZE: usize = 12;

/// Authentication tag size (128 bits = 16 bytes)
pub const AUTH_TAG_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub iv: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub auth_tag: Vec<u8>,
    /// Older envelopes carry this under `algorithm`.
    #[serde(alias = "algorithm")]
    pub algorithm_tag: String,
    pub key_id: String,
}

impl EncryptedEnvelope {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Encrypt under a fresh random IV.
pub(crate) fn seal(key: &KeyMaterial, key_id: &str, plaintext: &[u8]) -> Result<EncryptedEnvelope> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|_| PhiVaultError::KeyCorrupted)?;

    let mut iv = [0u8; IV_SIZE];
    OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|_| PhiVaultError::KeyGenerationFailed)?;
    let nonce = Nonce::from_slice(&iv);

    // GCM appends the tag to the ciphertext
    let mut ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| PhiVaultError::EncryptionFailed)?;
    let auth_tag = ciphertext.split_off(ciphertext.len() - AUTH_TAG_SIZE);

    Ok(EncryptedEnvelope {
        ciphertext,
        iv: iv.to_vec(),
        auth_tag,
        algorithm_tag: ALGORITHM.to_string(),
        key_id: key_id.to_string(),
    })
}

/// Verify the tag and decrypt. Every failure is `DecryptionFailed`.
pub(crate) fn open(key: &KeyMaterial, envelope: &EncryptedEnvelope) -> Result<Vec<u8>> {
    if envelope.iv.len() != IV_SIZE || envelope.auth_tag.len() != AUTH_TAG_SIZE {
        return Err(PhiVaultError::DecryptionFailed);
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|_| PhiVaultError::DecryptionFailed)?;
    let nonce = Nonce::from_slice(&envelope.iv);

    let mut combined = Vec::with_capacity(envelope.ciphertext.len() + AUTH_TAG_SIZE);
    combined.extend_from_slice(&envelope.ciphertext);
    combined.extend_from_slice(&envelope.auth_tag);

    cipher
        .decrypt(nonce, combined.as_ref())
        .map_err(|_| PhiVaultError::DecryptionFailed)
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let key = KeyMaterial::generate().unwrap();
        let envelope = seal(&key, "k1", b"blood pressure 120/80").unwrap();

        assert_eq!(envelope.iv.len(), IV_SIZE);
        assert_eq!(envelope.auth_tag.len(), AUTH_TAG_SIZE);
        assert_eq!(envelope.ciphertext.len(), 21);
        assert_eq!(open(&key, &envelope).unwrap(), b"blood pressure 120/80");
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = KeyMaterial::generate().unwrap();
        let other = KeyMaterial::generate().unwrap();
        let envelope = seal(&key, "k1", b"note").unwrap();

        assert!(matches!(
            open(&other, &envelope),
            Err(PhiVaultError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_truncated_iv_fails() {
        let key = KeyMaterial::generate().unwrap();
        let mut envelope = seal(&key, "k1", b"note").unwrap();
        envelope.iv.pop();

        assert!(matches!(
            open(&key, &envelope),
            Err(PhiVaultError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_json_shape() {
        let key = KeyMaterial::generate().unwrap();
        let envelope = seal(&key, "key-123", b"x").unwrap();
        let value: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();

        let object = value.as_object().unwrap();
        let mut fields: Vec<_> = object.keys().map(String::as_str).collect();
        fields.sort_unstable();
        assert_eq!(
            fields,
            ["algorithmTag", "authTag", "ciphertext", "iv", "keyId"]
        );
        assert_eq!(object["algorithmTag"], "AES-256-GCM");
        assert_eq!(object["keyId"], "key-123");
        assert!(object["iv"].is_string());
    }

    #[test]
    fn test_legacy_algorithm_field_accepted() {
        let json = r#"{
            "ciphertext": "AAEC",
            "iv": "AAAAAAAAAAAAAAAA",
            "authTag": "AAAAAAAAAAAAAAAAAAAAAA==",
            "algorithm": "AES-256-GCM",
            "keyId": "legacy"
        }"#;

        let envelope = EncryptedEnvelope::from_json(json).unwrap();
        assert_eq!(envelope.algorithm_tag, ALGORITHM);
        assert_eq!(envelope.ciphertext, vec![0, 1, 2]);
        assert_eq!(envelope.iv.len(), IV_SIZE);
        assert_eq!(envelope.auth_tag.len(), AUTH_TAG_SIZE);
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let json = r#"{"ciphertext":"***","iv":"","authTag":"","algorithmTag":"AES-256-GCM","keyId":"k"}"#;
        assert!(EncryptedEnvelope::from_json(json).is_err());
    }
}
