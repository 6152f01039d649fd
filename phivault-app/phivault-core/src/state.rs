use std::sync::Arc;

use tracing::info;

use crate::auth::AuthService;
use crate::biometric::BiometricHardware;
use crate::cache::PhiCacheRegistry;
use crate::clock::Clock;
use crate::crypto::EncryptionService;
use crate::error::Result;
use crate::files::FileSystem;
use crate::keystore::KeyStore;
use crate::remote::{AuthTokenProvider, PhiDocumentStore, ProfileStore, SyncQueue};
use crate::session::{RemotePurge, SessionManager};
use crate::storage::{Preferences, ProtectionSettings};

/// Everything the host platform provides.
#[derive(Clone)]
pub struct PlatformAdapters {
    pub key_store: Arc<dyn KeyStore>,
    pub biometrics: Arc<dyn BiometricHardware>,
    pub profiles: Arc<dyn ProfileStore>,
    pub documents: Arc<dyn PhiDocumentStore>,
    pub sync_queue: Arc<dyn SyncQueue>,
    pub tokens: Arc<dyn AuthTokenProvider>,
    pub preferences: Arc<dyn Preferences>,
    pub files: Arc<dyn FileSystem>,
    pub clock: Arc<dyn Clock>,
}

/// The wired-up protection subsystem. Construct one per process and share
/// the services by `Arc`.
pub struct PhiProtection {
    pub settings: ProtectionSettings,
    pub encryption: Arc<EncryptionService>,
    pub auth: Arc<AuthService>,
    pub caches: Arc<PhiCacheRegistry>,
    pub session: Arc<SessionManager>,
}

impl PhiProtection {
    pub fn new(adapters: PlatformAdapters, settings: ProtectionSettings) -> Result<Self> {
        settings.validate()?;

        let encryption = Arc::new(EncryptionService::new(
            adapters.key_store.clone(),
            adapters.files.clone(),
            adapters.clock.clone(),
            &settings,
        ));
        let auth = Arc::new(AuthService::new(
            adapters.biometrics.clone(),
            adapters.key_store.clone(),
            adapters.profiles.clone(),
            adapters.clock.clone(),
            &settings,
        ));
        let caches = Arc::new(PhiCacheRegistry::new(settings.cache_dwell()));
        let session = Arc::new(SessionManager::new(
            auth.clone(),
            encryption.clone(),
            caches.clone(),
            RemotePurge {
                documents: adapters.documents,
                sync_queue: adapters.sync_queue,
                tokens: adapters.tokens,
            },
            adapters.preferences,
            adapters.clock,
            &settings,
        ));

        Ok(Self {
            settings,
            encryption,
            auth,
            caches,
            session,
        })
    }

    /// `new` followed by restoring the persisted session.
    pub async fn start(adapters: PlatformAdapters, settings: ProtectionSettings) -> Result<Self> {
        let protection = Self::new(adapters, settings)?;
        let phase = protection.session.restore().await?;
        info!("PHI protection started, session {}", phase);
        Ok(protection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PinKdfParams;
    use crate::biometric::ScriptedBiometrics;
    use crate::clock::ManualClock;
    use crate::error::PhiVaultError;
    use crate::files::LocalFileSystem;
    use crate::keystore::MemoryKeyStore;
    use crate::remote::MemoryProfileStore;
    use crate::session::SessionPhase;
    use crate::storage::MemoryPreferences;
    use async_trait::async_trait;
    use chrono::Duration;

    struct Offline;

    #[async_trait]
    impl PhiDocumentStore for Offline {
        async fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl SyncQueue for Offline {
        async fn clear_queue(&self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl AuthTokenProvider for Offline {
        async fn sign_out(&self) -> Result<()> {
            Ok(())
        }
    }

    fn adapters(clock: &ManualClock, preferences: Arc<MemoryPreferences>) -> PlatformAdapters {
        let offline = Arc::new(Offline);
        PlatformAdapters {
            key_store: Arc::new(MemoryKeyStore::new()),
            biometrics: Arc::new(ScriptedBiometrics::absent()),
            profiles: Arc::new(MemoryProfileStore::new()),
            documents: offline.clone(),
            sync_queue: offline.clone(),
            tokens: offline,
            preferences,
            files: Arc::new(LocalFileSystem),
            clock: Arc::new(clock.clone()),
        }
    }

    fn settings() -> ProtectionSettings {
        ProtectionSettings {
            pin_kdf: PinKdfParams {
                memory_kib: 64,
                iterations: 1,
                parallelism: 1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let clock = ManualClock::default();
        let invalid = ProtectionSettings {
            max_failed_attempts: 0,
            ..settings()
        };

        let result = PhiProtection::new(adapters(&clock, Arc::new(MemoryPreferences::new())), invalid);
        assert!(matches!(result, Err(PhiVaultError::Config(_))));
    }

    #[tokio::test]
    async fn test_protected_workflow() {
        let clock = ManualClock::default();
        let preferences = Arc::new(MemoryPreferences::new());
        let phi = PhiProtection::start(adapters(&clock, preferences.clone()), settings())
            .await
            .unwrap();

        phi.encryption.initialize("clinician-7").await.unwrap();
        phi.auth.setup_pin("clinician-7", "246810").await.unwrap();
        let sealed = phi
            .encryption
            .encrypt(b"SOAP note: knee ROM improved", "clinician-7")
            .await
            .unwrap();

        phi.session.on_background().await;
        clock.advance(Duration::minutes(10));
        assert_eq!(phi.session.on_foreground().await, SessionPhase::Locked);

        // Restart before unlocking: the lock survives.
        let restarted = PhiProtection::start(adapters(&clock, preferences), settings())
            .await
            .unwrap();
        assert_eq!(restarted.session.phase(), SessionPhase::Locked);

        assert!(phi
            .session
            .unlock_session_with_pin("clinician-7", "246810")
            .await
            .unwrap());
        assert_eq!(
            phi.encryption.decrypt(&sealed, "clinician-7").await.unwrap(),
            b"SOAP note: knee ROM improved"
        );

        phi.session.logout("clinician-7").await.unwrap();
        assert!(matches!(
            phi.encryption.decrypt(&sealed, "clinician-7").await,
            Err(PhiVaultError::KeyNotFound)
        ));
    }
}
