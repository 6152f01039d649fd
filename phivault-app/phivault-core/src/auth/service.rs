//! AuthService - biometric gate, PIN fallback and failed-attempt lockout.
//!
//! Local state (config, PIN digest, counter, lockout marker) lives in the key
//! store and is the only source of truth for decisions. Every change is also
//! mirrored to the remote profile store on a best-effort basis.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::config::{AuthStatus, BiometricConfig};
use super::lockout::LockoutStatus;
use super::pin::{validate_pin, PinDigest, PinKdfParams};
use crate::biometric::{BiometricHardware, BiometricKind};
use crate::clock::Clock;
use crate::error::{PhiVaultError, Result};
use crate::keystore::{AccessPolicy, KeyStore};
use crate::remote::{ProfileStore, ProfileUpdate, RemoteBiometricProfile};
use crate::storage::ProtectionSettings;

const CONFIG_PREFIX: &str = "phi_biometric_config_";
const PIN_PREFIX: &str = "phi_pin_";
const FAILED_PREFIX: &str = "phi_failed_";
const LOCKOUT_PREFIX: &str = "phi_lockout_";

const PIN_POLICY: AccessPolicy = AccessPolicy::WhenUnlockedThisDeviceOnly;
const STATE_POLICY: AccessPolicy = AccessPolicy::AfterFirstUnlockThisDeviceOnly;

/// Preference order when the hardware reports several mechanisms.
const KIND_PREFERENCE: [BiometricKind; 3] = [
    BiometricKind::Face,
    BiometricKind::Fingerprint,
    BiometricKind::Iris,
];

fn slot(prefix: &str, owner_id: &str) -> String {
    format!("{}{}", prefix, owner_id)
}

pub struct AuthService {
    hardware: Arc<dyn BiometricHardware>,
    key_store: Arc<dyn KeyStore>,
    profiles: Arc<dyn ProfileStore>,
    clock: Arc<dyn Clock>,
    max_failed_attempts: u32,
    lockout_duration: Duration,
    min_pin_length: usize,
    reauth_secs: u32,
    pin_kdf: PinKdfParams,
    /// Held while the failure counter or lockout marker is read and written.
    lockout_lock: Mutex<()>,
}

impl AuthService {
    pub fn new(
        hardware: Arc<dyn BiometricHardware>,
        key_store: Arc<dyn KeyStore>,
        profiles: Arc<dyn ProfileStore>,
        clock: Arc<dyn Clock>,
        settings: &ProtectionSettings,
    ) -> Self {
        Self {
            hardware,
            key_store,
            profiles,
            clock,
            max_failed_attempts: settings.max_failed_attempts,
            lockout_duration: settings.lockout_duration(),
            min_pin_length: settings.min_pin_length,
            reauth_secs: settings.biometric_reauth_secs,
            pin_kdf: settings.pin_kdf,
            lockout_lock: Mutex::new(()),
        }
    }

    // ------------------------------------------------------------------
    // Biometric hardware
    // ------------------------------------------------------------------

    /// Hardware present and at least one biometric enrolled. Adapter errors
    /// count as unavailable.
    pub async fn is_available(&self) -> bool {
        match self.probe_hardware().await {
            Ok(available) => available,
            Err(e) => {
                warn!("Biometric availability check failed: {}", e);
                false
            }
        }
    }

    async fn probe_hardware(&self) -> Result<bool> {
        Ok(self.hardware.has_hardware().await? && self.hardware.is_enrolled().await?)
    }

    /// The mechanism a prompt would use, if any.
    pub async fn biometric_kind(&self) -> Option<BiometricKind> {
        match self.hardware.has_hardware().await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                warn!("Biometric hardware check failed: {}", e);
                return None;
            }
        }

        let kinds = match self.hardware.supported_kinds().await {
            Ok(kinds) => kinds,
            Err(e) => {
                warn!("Failed to list biometric kinds: {}", e);
                return None;
            }
        };

        KIND_PREFERENCE.into_iter().find(|k| kinds.contains(k))
    }

    /// Show a single biometric prompt. `false` when unavailable, declined, or
    /// the adapter fails.
    pub async fn authenticate(&self, prompt: &str) -> bool {
        if !self.is_available().await {
            debug!("Biometric prompt skipped, hardware unavailable");
            return false;
        }

        match self.hardware.prompt(prompt).await {
            Ok(passed) => passed,
            Err(e) => {
                warn!("Biometric prompt failed: {}", e);
                false
            }
        }
    }

    /// Enable biometric authentication for `owner_id`.
    pub async fn setup(&self, owner_id: &str) -> Result<()> {
        if !self.is_available().await {
            return Err(PhiVaultError::HardwareUnavailable);
        }

        let kind = self.biometric_kind().await;
        let mut config = self.config(owner_id).await?.unwrap_or_default();
        config.enabled = true;
        config.mechanism_kind = kind;
        config.fallback_enabled = true;
        config.require_on_launch = true;
        config.require_after_background_seconds = self.reauth_secs;
        self.save_config(owner_id, &config).await?;

        self.mirror(
            owner_id,
            ProfileUpdate {
                enabled: Some(true),
                mechanism_kind: kind,
                fallback_enabled: Some(true),
                require_on_launch: Some(true),
                require_after_background_seconds: Some(self.reauth_secs),
                ..Default::default()
            },
        )
        .await;

        info!("Biometric authentication enabled for owner {}", owner_id);
        Ok(())
    }

    /// Turn biometric authentication off and forget the PIN.
    pub async fn disable(&self, owner_id: &str) -> Result<()> {
        self.key_store.delete(&slot(PIN_PREFIX, owner_id)).await?;

        let mut config = self.config(owner_id).await?.unwrap_or_default();
        config.enabled = false;
        config.fallback_enabled = false;
        self.save_config(owner_id, &config).await?;

        self.mirror(
            owner_id,
            ProfileUpdate {
                enabled: Some(false),
                fallback_enabled: Some(false),
                ..Default::default()
            },
        )
        .await;

        info!("Biometric authentication disabled for owner {}", owner_id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // PIN
    // ------------------------------------------------------------------

    /// Validate and store a fallback PIN.
    pub async fn setup_pin(&self, owner_id: &str, pin: &str) -> Result<()> {
        validate_pin(pin, self.min_pin_length)?;

        let digest = self.derive_digest(pin).await?;
        self.key_store
            .set(
                &slot(PIN_PREFIX, owner_id),
                &serde_json::to_string(&digest)?,
                PIN_POLICY,
            )
            .await?;

        let mut config = self.config(owner_id).await?.unwrap_or_default();
        config.fallback_enabled = true;
        self.save_config(owner_id, &config).await?;

        self.mirror(
            owner_id,
            ProfileUpdate {
                fallback_enabled: Some(true),
                pin_fragment: Some(digest.fragment()),
                ..Default::default()
            },
        )
        .await;

        info!("PIN set for owner {}", owner_id);
        Ok(())
    }

    pub async fn has_pin(&self, owner_id: &str) -> Result<bool> {
        Ok(self.load_pin(owner_id).await?.is_some())
    }

    /// Check `pin` against the stored digest.
    ///
    /// Fails with `AccountLocked` while a lockout is active, without touching
    /// the counter. Returns `false` without counting when no PIN is set.
    pub async fn verify_pin(&self, owner_id: &str, pin: &str) -> Result<bool> {
        let _guard = self.lockout_lock.lock().await;

        if let LockoutStatus::Active { until } = self.refresh_lockout(owner_id).await? {
            debug!("PIN attempt rejected, owner {} locked until {}", owner_id, until);
            return Err(PhiVaultError::AccountLocked { until });
        }

        let Some(stored) = self.load_pin(owner_id).await? else {
            debug!("No PIN set for owner {}", owner_id);
            return Ok(false);
        };

        if self.check_digest(stored, pin).await? {
            self.reset_failures(owner_id).await?;
            debug!("PIN verified for owner {}", owner_id);
            Ok(true)
        } else {
            self.record_failure(owner_id).await?;
            Ok(false)
        }
    }

    pub async fn failed_attempts(&self, owner_id: &str) -> Result<u32> {
        match self.key_store.get(&slot(FAILED_PREFIX, owner_id)).await? {
            Some(count) => count.trim().parse().map_err(|_| {
                PhiVaultError::KeyStore("stored failure counter is malformed".into())
            }),
            None => Ok(0),
        }
    }

    // ------------------------------------------------------------------
    // Lockout
    // ------------------------------------------------------------------

    /// Read the lockout marker. Never mutates state.
    pub async fn lockout_status(&self, owner_id: &str) -> Result<LockoutStatus> {
        let marker = self.lockout_marker(owner_id).await?;
        Ok(LockoutStatus::evaluate(marker, self.clock.now()))
    }

    /// Remove an expired lockout and reset the counter. Returns whether
    /// anything was cleared; concurrent callers clear at most once.
    pub async fn clear_expired_lockout(&self, owner_id: &str) -> Result<bool> {
        let _guard = self.lockout_lock.lock().await;
        let before = self.lockout_status(owner_id).await?;
        let after = self.refresh_lockout(owner_id).await?;
        Ok(before != after)
    }

    /// `lockout_status` followed by `clear_expired_lockout`, atomically:
    /// an expired lockout is cleared as a side effect and reported as
    /// unlocked.
    pub async fn is_locked(&self, owner_id: &str) -> Result<bool> {
        let _guard = self.lockout_lock.lock().await;
        Ok(self.refresh_lockout(owner_id).await?.is_active())
    }

    /// Caller holds `lockout_lock`.
    async fn refresh_lockout(&self, owner_id: &str) -> Result<LockoutStatus> {
        match self.lockout_status(owner_id).await? {
            LockoutStatus::Expired { until } => {
                info!("Lockout for owner {} expired at {}", owner_id, until);
                self.reset_failures(owner_id).await?;
                Ok(LockoutStatus::Clear)
            }
            status => Ok(status),
        }
    }

    async fn lockout_marker(&self, owner_id: &str) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.key_store.get(&slot(LOCKOUT_PREFIX, owner_id)).await? else {
            return Ok(None);
        };
        DateTime::parse_from_rfc3339(raw.trim())
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| PhiVaultError::KeyStore("stored lockout marker is malformed".into()))
    }

    /// Caller holds `lockout_lock`.
    async fn record_failure(&self, owner_id: &str) -> Result<()> {
        let attempts = self.failed_attempts(owner_id).await?.saturating_add(1);
        self.key_store
            .set(
                &slot(FAILED_PREFIX, owner_id),
                &attempts.to_string(),
                STATE_POLICY,
            )
            .await?;

        let mut config = self.config(owner_id).await?.unwrap_or_default();
        config.failed_attempts = attempts;
        let mut update = ProfileUpdate {
            failed_attempts: Some(attempts),
            ..Default::default()
        };

        if attempts >= self.max_failed_attempts {
            let until = self.clock.now() + self.lockout_duration;
            self.key_store
                .set(
                    &slot(LOCKOUT_PREFIX, owner_id),
                    &until.to_rfc3339(),
                    STATE_POLICY,
                )
                .await?;
            config.locked_until = Some(until);
            update.locked_until = Some(Some(until));
            warn!(
                "Too many failed PIN attempts for owner {}, locked until {}",
                owner_id, until
            );
        } else {
            debug!(
                "Failed PIN attempt {}/{} for owner {}",
                attempts, self.max_failed_attempts, owner_id
            );
        }

        self.save_config(owner_id, &config).await?;
        self.mirror(owner_id, update).await;
        Ok(())
    }

    /// Caller holds `lockout_lock`.
    async fn reset_failures(&self, owner_id: &str) -> Result<()> {
        let had_failures = self.failed_attempts(owner_id).await? > 0
            || self.lockout_marker(owner_id).await?.is_some();
        if !had_failures {
            return Ok(());
        }

        self.key_store.delete(&slot(FAILED_PREFIX, owner_id)).await?;
        self.key_store.delete(&slot(LOCKOUT_PREFIX, owner_id)).await?;

        if let Some(mut config) = self.config(owner_id).await? {
            config.failed_attempts = 0;
            config.locked_until = None;
            self.save_config(owner_id, &config).await?;
        }

        self.mirror(
            owner_id,
            ProfileUpdate {
                failed_attempts: Some(0),
                locked_until: Some(None),
                ..Default::default()
            },
        )
        .await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Config and status
    // ------------------------------------------------------------------

    pub async fn config(&self, owner_id: &str) -> Result<Option<BiometricConfig>> {
        match self.key_store.get(&slot(CONFIG_PREFIX, owner_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn is_enabled(&self, owner_id: &str) -> Result<bool> {
        Ok(self
            .config(owner_id)
            .await?
            .map(|c| c.enabled)
            .unwrap_or(false))
    }

    /// The remote mirror, for display only. Never used for decisions.
    pub async fn remote_config(&self, owner_id: &str) -> Option<RemoteBiometricProfile> {
        match self.profiles.read_profile(owner_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Failed to read remote profile for owner {}: {}", owner_id, e);
                None
            }
        }
    }

    /// `LockedOut`, `Enabled` (biometric or PIN configured) or
    /// `Unconfigured`. Session-level states are layered on by the session
    /// manager.
    pub async fn status(&self, owner_id: &str) -> Result<AuthStatus> {
        if self.lockout_status(owner_id).await?.is_active() {
            return Ok(AuthStatus::LockedOut);
        }

        let configured = self.is_enabled(owner_id).await? || self.has_pin(owner_id).await?;
        Ok(if configured {
            AuthStatus::Enabled
        } else {
            AuthStatus::Unconfigured
        })
    }

    /// Delete the PIN digest, counter, lockout marker and local config. The
    /// remote profile is left alone.
    pub async fn clear_biometric_data(&self, owner_id: &str) -> Result<()> {
        let _guard = self.lockout_lock.lock().await;

        let mut first_error = None;
        for prefix in [PIN_PREFIX, FAILED_PREFIX, LOCKOUT_PREFIX, CONFIG_PREFIX] {
            if let Err(e) = self.key_store.delete(&slot(prefix, owner_id)).await {
                warn!("Failed to delete {} entry: {}", prefix.trim_end_matches('_'), e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Cleared biometric data for owner {}", owner_id);
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn save_config(&self, owner_id: &str, config: &BiometricConfig) -> Result<()> {
        self.key_store
            .set(
                &slot(CONFIG_PREFIX, owner_id),
                &serde_json::to_string(config)?,
                STATE_POLICY,
            )
            .await
    }

    async fn load_pin(&self, owner_id: &str) -> Result<Option<PinDigest>> {
        match self.key_store.get(&slot(PIN_PREFIX, owner_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn derive_digest(&self, pin: &str) -> Result<PinDigest> {
        let pin = Zeroizing::new(pin.to_string());
        let kdf = self.pin_kdf;
        tokio::task::spawn_blocking(move || PinDigest::derive(&pin, kdf))
            .await
            .map_err(|e| PhiVaultError::KeyDerivation(e.to_string()))?
    }

    async fn check_digest(&self, stored: PinDigest, pin: &str) -> Result<bool> {
        let pin = Zeroizing::new(pin.to_string());
        tokio::task::spawn_blocking(move || stored.matches(&pin))
            .await
            .map_err(|e| PhiVaultError::KeyDerivation(e.to_string()))?
    }

    async fn mirror(&self, owner_id: &str, mut update: ProfileUpdate) {
        update.updated_at = Some(self.clock.now());
        if let Err(e) = self.profiles.update_profile(owner_id, update).await {
            warn!("Remote profile update failed for owner {}: {}", owner_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometric::ScriptedBiometrics;
    use crate::clock::ManualClock;
    use crate::keystore::MemoryKeyStore;
    use crate::remote::MemoryProfileStore;

    const OWNER: &str = "owner-1";
    const PIN: &str = "482913";

    struct Fixture {
        auth: AuthService,
        hardware: Arc<ScriptedBiometrics>,
        store: Arc<MemoryKeyStore>,
        profiles: Arc<MemoryProfileStore>,
        clock: ManualClock,
    }

    fn light_settings() -> ProtectionSettings {
        ProtectionSettings {
            pin_kdf: PinKdfParams {
                memory_kib: 64,
                iterations: 1,
                parallelism: 1,
            },
            ..Default::default()
        }
    }

    fn fixture_with(hardware: ScriptedBiometrics) -> Fixture {
        let hardware = Arc::new(hardware);
        let store = Arc::new(MemoryKeyStore::new());
        let profiles = Arc::new(MemoryProfileStore::new());
        let clock = ManualClock::default();

        let auth = AuthService::new(
            hardware.clone(),
            store.clone(),
            profiles.clone(),
            Arc::new(clock.clone()),
            &light_settings(),
        );

        Fixture {
            auth,
            hardware,
            store,
            profiles,
            clock,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(ScriptedBiometrics::available())
    }

    async fn with_pin() -> Fixture {
        let f = fixture();
        f.auth.setup_pin(OWNER, PIN).await.unwrap();
        f
    }

    #[tokio::test]
    async fn test_availability_needs_enrollment() {
        let f = fixture();
        assert!(f.auth.is_available().await);

        f.hardware.set_enrolled(false);
        assert!(!f.auth.is_available().await);

        let absent = fixture_with(ScriptedBiometrics::absent());
        assert!(!absent.auth.is_available().await);
    }

    #[tokio::test]
    async fn test_adapter_errors_mean_unavailable() {
        let f = fixture();
        f.hardware.set_failing(true);

        assert!(!f.auth.is_available().await);
        assert_eq!(f.auth.biometric_kind().await, None);
        assert!(!f.auth.authenticate("Unlock records").await);
    }

    #[tokio::test]
    async fn test_biometric_kind_preference() {
        let f = fixture();

        f.hardware
            .set_kinds(vec![BiometricKind::Iris, BiometricKind::Fingerprint]);
        assert_eq!(f.auth.biometric_kind().await, Some(BiometricKind::Fingerprint));

        f.hardware
            .set_kinds(vec![BiometricKind::Fingerprint, BiometricKind::Face]);
        assert_eq!(f.auth.biometric_kind().await, Some(BiometricKind::Face));
    }

    #[tokio::test]
    async fn test_authenticate_shows_one_prompt() {
        let f = fixture();
        f.hardware.push_prompt_result(false);
        f.hardware.push_prompt_result(true);

        assert!(!f.auth.authenticate("Unlock records").await);
        assert_eq!(f.hardware.prompts_shown(), 1);
        assert_eq!(f.hardware.last_message().as_deref(), Some("Unlock records"));

        assert!(f.auth.authenticate("Unlock records").await);
        assert_eq!(f.hardware.prompts_shown(), 2);
    }

    #[tokio::test]
    async fn test_authenticate_without_hardware_never_prompts() {
        let f = fixture_with(ScriptedBiometrics::absent());
        f.hardware.push_prompt_result(true);

        assert!(!f.auth.authenticate("Unlock records").await);
        assert_eq!(f.hardware.prompts_shown(), 0);
    }

    #[tokio::test]
    async fn test_setup_requires_hardware() {
        let f = fixture_with(ScriptedBiometrics::absent());
        assert!(matches!(
            f.auth.setup(OWNER).await,
            Err(PhiVaultError::HardwareUnavailable)
        ));
        assert!(f.auth.config(OWNER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_setup_persists_config_and_mirror() {
        let f = fixture();
        f.auth.setup(OWNER).await.unwrap();

        let config = f.auth.config(OWNER).await.unwrap().unwrap();
        assert!(config.enabled);
        assert!(config.fallback_enabled);
        assert!(config.require_on_launch);
        assert_eq!(config.require_after_background_seconds, 300);
        assert_eq!(config.mechanism_kind, Some(BiometricKind::Face));
        assert!(f.auth.is_enabled(OWNER).await.unwrap());
        assert_eq!(f.auth.status(OWNER).await.unwrap(), AuthStatus::Enabled);

        let remote = f.auth.remote_config(OWNER).await.unwrap();
        assert!(remote.enabled);
        assert!(remote.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_disable_forgets_pin() {
        let f = with_pin().await;
        f.auth.setup(OWNER).await.unwrap();

        f.auth.disable(OWNER).await.unwrap();

        assert!(!f.auth.is_enabled(OWNER).await.unwrap());
        assert!(!f.auth.has_pin(OWNER).await.unwrap());
        assert!(!f.auth.remote_config(OWNER).await.unwrap().enabled);
    }

    #[tokio::test]
    async fn test_setup_pin_validation() {
        let f = fixture();

        assert!(matches!(
            f.auth.setup_pin(OWNER, "12345").await,
            Err(PhiVaultError::WeakPin { min_length: 6 })
        ));
        assert!(matches!(
            f.auth.setup_pin(OWNER, "12a456").await,
            Err(PhiVaultError::InvalidPinFormat)
        ));
        assert!(!f.auth.has_pin(OWNER).await.unwrap());
    }

    #[tokio::test]
    async fn test_setup_pin_stores_digest_only() {
        let f = with_pin().await;

        let stored = f.store.get("phi_pin_owner-1").await.unwrap().unwrap();
        assert!(!stored.contains(PIN));
        assert_eq!(
            f.store.policy_of("phi_pin_owner-1").await,
            Some(AccessPolicy::WhenUnlockedThisDeviceOnly)
        );

        let config = f.auth.config(OWNER).await.unwrap().unwrap();
        assert!(config.fallback_enabled);

        let remote = f.auth.remote_config(OWNER).await.unwrap();
        assert_eq!(remote.pin_fragment.map(|p| p.len()), Some(16));
    }

    #[tokio::test]
    async fn test_verify_pin() {
        let f = with_pin().await;

        assert!(!f.auth.verify_pin(OWNER, "000000").await.unwrap());
        assert_eq!(f.auth.failed_attempts(OWNER).await.unwrap(), 1);

        assert!(f.auth.verify_pin(OWNER, PIN).await.unwrap());
        assert_eq!(f.auth.failed_attempts(OWNER).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_verify_without_pin_is_not_counted() {
        let f = fixture();
        assert!(!f.auth.verify_pin(OWNER, PIN).await.unwrap());
        assert_eq!(f.auth.failed_attempts(OWNER).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lockout_cycle() {
        let f = with_pin().await;
        let start = f.clock.now();

        for attempt in 1..=5u32 {
            assert!(!f.auth.verify_pin(OWNER, "000000").await.unwrap());
            assert_eq!(f.auth.failed_attempts(OWNER).await.unwrap(), attempt);
        }

        let expected_until = start + Duration::minutes(15);
        match f.auth.verify_pin(OWNER, PIN).await {
            Err(PhiVaultError::AccountLocked { until }) => assert_eq!(until, expected_until),
            other => panic!("expected AccountLocked, got {:?}", other),
        }
        // Rejected attempts while locked change nothing.
        assert_eq!(f.auth.failed_attempts(OWNER).await.unwrap(), 5);
        assert!(f.auth.is_locked(OWNER).await.unwrap());
        assert_eq!(f.auth.status(OWNER).await.unwrap(), AuthStatus::LockedOut);

        let config = f.auth.config(OWNER).await.unwrap().unwrap();
        assert_eq!(config.locked_until, Some(expected_until));
        let remote = f.auth.remote_config(OWNER).await.unwrap();
        assert_eq!(remote.locked_until, Some(expected_until));
        assert_eq!(remote.failed_attempts, 5);

        f.clock.advance(Duration::minutes(15));

        assert!(f.auth.verify_pin(OWNER, PIN).await.unwrap());
        assert_eq!(f.auth.failed_attempts(OWNER).await.unwrap(), 0);
        assert_eq!(
            f.auth.lockout_status(OWNER).await.unwrap(),
            LockoutStatus::Clear
        );

        let remote = f.auth.remote_config(OWNER).await.unwrap();
        assert_eq!(remote.failed_attempts, 0);
        assert_eq!(remote.locked_until, None);
    }

    #[tokio::test]
    async fn test_lockout_status_is_a_pure_read() {
        let f = with_pin().await;
        for _ in 0..5 {
            f.auth.verify_pin(OWNER, "000000").await.unwrap();
        }
        f.clock.advance(Duration::minutes(20));

        let first = f.auth.lockout_status(OWNER).await.unwrap();
        let second = f.auth.lockout_status(OWNER).await.unwrap();
        assert!(matches!(first, LockoutStatus::Expired { .. }));
        assert_eq!(first, second);
        assert!(f.store.contains("phi_lockout_owner-1").await);
        assert_eq!(f.auth.failed_attempts(OWNER).await.unwrap(), 5);

        assert!(f.auth.clear_expired_lockout(OWNER).await.unwrap());
        assert!(!f.auth.clear_expired_lockout(OWNER).await.unwrap());
        assert!(!f.store.contains("phi_lockout_owner-1").await);
        assert_eq!(f.auth.failed_attempts(OWNER).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_expiry_resets_once() {
        let f = with_pin().await;
        for _ in 0..5 {
            f.auth.verify_pin(OWNER, "000000").await.unwrap();
        }
        f.clock.advance(Duration::minutes(15));
        let writes_before = f.profiles.write_count();

        let (a, b, c) = tokio::join!(
            f.auth.clear_expired_lockout(OWNER),
            f.auth.clear_expired_lockout(OWNER),
            f.auth.is_locked(OWNER),
        );

        let cleared = [a.unwrap(), b.unwrap()].iter().filter(|c| **c).count();
        assert!(!c.unwrap());
        assert_eq!(cleared, 1);
        assert_eq!(f.profiles.write_count(), writes_before + 1);
    }

    #[tokio::test]
    async fn test_remote_outage_changes_no_decision() {
        let f = fixture();
        f.profiles.set_offline(true);

        f.auth.setup(OWNER).await.unwrap();
        f.auth.setup_pin(OWNER, PIN).await.unwrap();

        assert!(!f.auth.verify_pin(OWNER, "000000").await.unwrap());
        assert_eq!(f.auth.failed_attempts(OWNER).await.unwrap(), 1);
        assert!(f.auth.verify_pin(OWNER, PIN).await.unwrap());
        assert!(f.auth.remote_config(OWNER).await.is_none());
        assert_eq!(f.profiles.write_count(), 0);
    }

    #[tokio::test]
    async fn test_clear_biometric_data_keeps_remote() {
        let f = with_pin().await;
        f.auth.setup(OWNER).await.unwrap();
        f.auth.verify_pin(OWNER, "000000").await.unwrap();

        f.auth.clear_biometric_data(OWNER).await.unwrap();

        assert!(f.store.is_empty().await);
        assert!(f.auth.config(OWNER).await.unwrap().is_none());
        assert!(!f.auth.has_pin(OWNER).await.unwrap());
        assert_eq!(f.auth.status(OWNER).await.unwrap(), AuthStatus::Unconfigured);
        assert!(f.auth.remote_config(OWNER).await.is_some());

        // Already gone.
        f.auth.clear_biometric_data(OWNER).await.unwrap();
    }
}
