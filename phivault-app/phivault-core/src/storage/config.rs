use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::auth::PinKdfParams;
use crate::error::{PhiVaultError, Result};

/// 50 MiB, the largest file the encryption service accepts.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Tunables for the protection subsystem. Every field has a default, so a
/// partial JSON file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionSettings {
    pub session_timeout_days: i64,
    pub background_timeout_secs: i64,
    pub cache_dwell_secs: u64,
    pub max_failed_attempts: u32,
    pub lockout_minutes: i64,
    pub key_lifetime_days: i64,
    /// Superseded key generations kept after rotation.
    pub archived_key_generations: usize,
    pub max_file_size_bytes: u64,
    pub min_pin_length: usize,
    /// Reauth window written into a fresh `BiometricConfig`.
    pub biometric_reauth_secs: u32,
    pub pin_kdf: PinKdfParams,
    /// Where decrypted files are written. `None` means the OS temp dir.
    pub temp_dir: Option<PathBuf>,
}

impl Default for ProtectionSettings {
    fn default() -> Self {
        Self {
            session_timeout_days: 30,
            background_timeout_secs: 5 * 60,
            cache_dwell_secs: 5 * 60,
            max_failed_attempts: 5,
            lockout_minutes: 15,
            key_lifetime_days: 90,
            archived_key_generations: 5,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
            min_pin_length: 6,
            biometric_reauth_secs: 300,
            pin_kdf: PinKdfParams::default(),
            temp_dir: None,
        }
    }
}

impl ProtectionSettings {
    pub fn session_timeout(&self) -> Duration {
        Duration::days(self.session_timeout_days)
    }

    pub fn background_timeout(&self) -> Duration {
        Duration::seconds(self.background_timeout_secs)
    }

    pub fn cache_dwell(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache_dwell_secs)
    }

    pub fn lockout_duration(&self) -> Duration {
        Duration::minutes(self.lockout_minutes)
    }

    pub fn key_lifetime(&self) -> Duration {
        Duration::days(self.key_lifetime_days)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Reject settings that would disable a protection outright.
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, bool); 8] = [
            ("session_timeout_days", self.session_timeout_days > 0),
            ("background_timeout_secs", self.background_timeout_secs > 0),
            ("cache_dwell_secs", self.cache_dwell_secs > 0),
            ("max_failed_attempts", self.max_failed_attempts > 0),
            ("lockout_minutes", self.lockout_minutes > 0),
            ("key_lifetime_days", self.key_lifetime_days > 0),
            ("max_file_size_bytes", self.max_file_size_bytes > 0),
            ("min_pin_length", self.min_pin_length > 0),
        ];

        if let Some((field, _)) = checks.iter().find(|(_, ok)| !ok) {
            return Err(PhiVaultError::Config(format!("{} must be positive", field)));
        }

        self.pin_kdf.validate()
    }
}

pub fn load_settings(path: &Path) -> Result<ProtectionSettings> {
    if !path.exists() {
        return Ok(ProtectionSettings::default());
    }

    let content = std::fs::read_to_string(path)?;
    let settings: ProtectionSettings = serde_json::from_str(&content)?;
    settings.validate()?;
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &ProtectionSettings) -> Result<()> {
    settings.validate()?;
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(&dir.path().join("settings.json")).unwrap();

        assert_eq!(settings.max_failed_attempts, 5);
        assert_eq!(settings.session_timeout(), Duration::days(30));
        assert_eq!(settings.max_file_size_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "lockout_minutes": 30 }"#).unwrap();

        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.lockout_duration(), Duration::minutes(30));
        assert_eq!(settings.archived_key_generations, 5);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = ProtectionSettings {
            cache_dwell_secs: 60,
            ..Default::default()
        };

        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path).unwrap().cache_dwell_secs, 60);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let settings = ProtectionSettings {
            background_timeout_secs: 0,
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("background_timeout_secs"));
    }
}
