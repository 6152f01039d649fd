//! Encryption Service: per-owner AES-256-GCM keys held in the key store,
//! rotation with a bounded archive, and self-describing envelopes.

mod envelope;
mod key;
mod service;

pub use envelope::{EncryptedEnvelope, ALGORITHM, AUTH_TAG_SIZE, IV_SIZE};
pub use key::{ArchivedKey, EncryptionKey, KeyMaterial, KEY_SIZE};
pub use service::EncryptionService;
