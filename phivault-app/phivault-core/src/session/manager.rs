//! SessionManager - the app-level lock state machine.
//!
//! ```text
//! Active --background--> Backgrounded --foreground (< timeout)--> Active
//!                              |
//!                              +--foreground (>= timeout)--> Locked --unlock--> Active
//! ```
//!
//! In-memory state is authoritative while the process runs. It is written
//! to preferences after every transition so it survives a restart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Duration;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::logout::RemotePurge;
use super::state::{SessionPhase, SessionState, UnlockOutcome};
use crate::auth::{AuthService, AuthStatus};
use crate::cache::PhiCacheRegistry;
use crate::clock::Clock;
use crate::crypto::EncryptionService;
use crate::error::Result;
use crate::storage::{Preferences, ProtectionSettings};

/// Preferences key holding the serialized [`SessionState`].
pub const SESSION_STATE_KEY: &str = "auth_session_state";

const UNLOCK_PROMPT: &str = "Unlock to view patient records";

pub struct SessionManager {
    pub(super) auth: Arc<AuthService>,
    pub(super) encryption: Arc<EncryptionService>,
    pub(super) caches: Arc<PhiCacheRegistry>,
    pub(super) remote: RemotePurge,
    pub(super) preferences: Arc<dyn Preferences>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) state: RwLock<SessionState>,
    background_timeout: Duration,
    unlocking: AtomicBool,
}

/// Clears the unlocking flag on every exit path.
struct UnlockingGuard<'a>(&'a AtomicBool);

impl Drop for UnlockingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SessionManager {
    pub fn new(
        auth: Arc<AuthService>,
        encryption: Arc<EncryptionService>,
        caches: Arc<PhiCacheRegistry>,
        remote: RemotePurge,
        preferences: Arc<dyn Preferences>,
        clock: Arc<dyn Clock>,
        settings: &ProtectionSettings,
    ) -> Self {
        Self {
            auth,
            encryption,
            caches,
            remote,
            preferences,
            clock,
            state: RwLock::new(SessionState::new(settings.session_timeout())),
            background_timeout: settings.background_timeout(),
            unlocking: AtomicBool::new(false),
        }
    }

    /// Load the persisted state. Missing or unreadable state leaves a fresh
    /// session. The configured session timeout always wins over the stored
    /// one.
    pub async fn restore(&self) -> Result<SessionPhase> {
        let stored = self.preferences.get(SESSION_STATE_KEY).await?;

        let mut state = self.state.write();
        if let Some(json) = stored {
            match serde_json::from_str::<SessionState>(&json) {
                Ok(mut restored) => {
                    restored.session_timeout_secs = state.session_timeout_secs;
                    *state = restored;
                    info!("Restored session in phase {}", state.phase());
                }
                Err(e) => warn!("Discarding unreadable session state: {}", e),
            }
        }
        Ok(state.phase())
    }

    pub fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.read().phase()
    }

    /// Record the backgrounding instant and arm the PHI cache timer.
    pub async fn on_background(&self) {
        let snapshot = {
            let mut state = self.state.write();
            state.backgrounded_at = Some(self.clock.now());
            state.clone()
        };
        self.caches.on_background();

        debug!("Session backgrounded");
        self.persist(snapshot).await;
    }

    /// Disarm the cache timer and lock if the app stayed away too long.
    pub async fn on_foreground(&self) -> SessionPhase {
        self.caches.on_foreground();

        let now = self.clock.now();
        let snapshot = {
            let mut state = self.state.write();
            // A locked session stays locked until an unlock succeeds.
            if !state.is_locked {
                if state.background_expired(now, self.background_timeout) {
                    state.is_locked = true;
                    info!("Background timeout elapsed, session locked");
                } else {
                    state.backgrounded_at = None;
                    state.last_activity_at = Some(now);
                }
            }
            state.clone()
        };

        let phase = snapshot.phase();
        self.persist(snapshot).await;
        phase
    }

    /// `true` while the session has not timed out.
    pub fn check_session_timeout(&self) -> bool {
        self.state.read().is_within_timeout(self.clock.now())
    }

    /// `true` when reauthentication is required after backgrounding.
    pub fn check_background_timeout(&self) -> bool {
        self.state
            .read()
            .background_expired(self.clock.now(), self.background_timeout)
    }

    pub async fn update_last_activity(&self) {
        let snapshot = {
            let mut state = self.state.write();
            state.last_activity_at = Some(self.clock.now());
            state.clone()
        };
        self.persist(snapshot).await;
    }

    pub async fn lock_session(&self) {
        let snapshot = {
            let mut state = self.state.write();
            state.is_locked = true;
            state.clone()
        };
        info!("Session locked");
        self.persist(snapshot).await;
    }

    /// Try the biometric prompt when enabled. Session fields change only on
    /// success.
    pub async fn unlock_session(&self, owner_id: &str) -> Result<UnlockOutcome> {
        self.unlocking.store(true, Ordering::SeqCst);
        let _unlocking = UnlockingGuard(&self.unlocking);

        let config = self.auth.config(owner_id).await?.unwrap_or_default();

        if config.enabled && self.auth.authenticate(UNLOCK_PROMPT).await {
            self.mark_unlocked().await;
            info!("Session unlocked with biometrics");
            return Ok(UnlockOutcome::Unlocked);
        }

        if config.fallback_enabled && self.auth.has_pin(owner_id).await? {
            debug!("Biometric unlock unavailable or failed, PIN required");
            Ok(UnlockOutcome::PinRequired)
        } else {
            debug!("Session unlock denied");
            Ok(UnlockOutcome::Denied)
        }
    }

    /// Unlock with the fallback PIN. `AccountLocked` is returned unchanged.
    pub async fn unlock_session_with_pin(&self, owner_id: &str, pin: &str) -> Result<bool> {
        self.unlocking.store(true, Ordering::SeqCst);
        let _unlocking = UnlockingGuard(&self.unlocking);

        if !self.auth.verify_pin(owner_id, pin).await? {
            return Ok(false);
        }

        self.mark_unlocked().await;
        info!("Session unlocked with PIN");
        Ok(true)
    }

    /// The auth service's view refined by the session: `Enabled` becomes
    /// `Unlocking` during an attempt and `Unlocked` while the session is open.
    pub async fn auth_status(&self, owner_id: &str) -> Result<AuthStatus> {
        let status = self.auth.status(owner_id).await?;
        if status != AuthStatus::Enabled {
            return Ok(status);
        }

        Ok(if self.unlocking.load(Ordering::SeqCst) {
            AuthStatus::Unlocking
        } else if self.state.read().is_locked {
            AuthStatus::Enabled
        } else {
            AuthStatus::Unlocked
        })
    }

    async fn mark_unlocked(&self) {
        let snapshot = {
            let mut state = self.state.write();
            state.mark_unlocked(self.clock.now());
            state.clone()
        };
        self.persist(snapshot).await;
    }

    /// Best-effort write of the session state.
    async fn persist(&self, snapshot: SessionState) {
        let json = match serde_json::to_string(&snapshot) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize session state: {}", e);
                return;
            }
        };

        if let Err(e) = self.preferences.set(SESSION_STATE_KEY, &json).await {
            warn!("Failed to persist session state: {}", e);
        }
    }
}
