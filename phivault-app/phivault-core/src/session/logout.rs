//! Logout: an ordered, best-effort teardown of everything PHI related.

use std::sync::Arc;

use tracing::{info, warn};

use super::manager::{SessionManager, SESSION_STATE_KEY};
use crate::error::{PhiVaultError, Result};
use crate::remote::{AuthTokenProvider, PhiDocumentStore, SyncQueue};

/// Substrings marking a preference key as auth related.
const AUTH_PREFERENCE_TAGS: [&str; 4] = ["auth", "user", "session", "token"];

/// Remote collaborators that only take part in logout.
#[derive(Clone)]
pub struct RemotePurge {
    pub documents: Arc<dyn PhiDocumentStore>,
    pub sync_queue: Arc<dyn SyncQueue>,
    pub tokens: Arc<dyn AuthTokenProvider>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutStep {
    PhiCaches,
    EncryptionKeys,
    BiometricData,
    RemoteDocuments,
    SyncQueue,
    SessionState,
    AuthToken,
    AuthPreferences,
}

impl LogoutStep {
    /// Execution order.
    pub const ALL: [LogoutStep; 8] = [
        LogoutStep::PhiCaches,
        LogoutStep::EncryptionKeys,
        LogoutStep::BiometricData,
        LogoutStep::RemoteDocuments,
        LogoutStep::SyncQueue,
        LogoutStep::SessionState,
        LogoutStep::AuthToken,
        LogoutStep::AuthPreferences,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PhiCaches => "phi_caches",
            Self::EncryptionKeys => "encryption_keys",
            Self::BiometricData => "biometric_data",
            Self::RemoteDocuments => "remote_documents",
            Self::SyncQueue => "sync_queue",
            Self::SessionState => "session_state",
            Self::AuthToken => "auth_token",
            Self::AuthPreferences => "auth_preferences",
        }
    }
}

impl std::fmt::Display for LogoutStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_auth_preference(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    AUTH_PREFERENCE_TAGS.iter().any(|tag| key.contains(tag))
}

impl SessionManager {
    /// Tear down every PHI-bearing store for `owner_id`.
    ///
    /// Every step runs even when earlier ones fail, and the in-memory session
    /// is always reset. Failed steps are reported together as
    /// [`PhiVaultError::Logout`].
    pub async fn logout(&self, owner_id: &str) -> Result<()> {
        info!("Logging out owner {}", owner_id);
        let mut failed = Vec::new();

        let mut record = |step: LogoutStep, result: Result<()>| {
            if let Err(e) = result {
                warn!("Logout step {} failed: {}", step, e);
                failed.push(step.as_str());
            }
        };

        self.caches.on_foreground();
        let report = self.caches.clear_all_caches();
        let caches_result = if report.is_complete() {
            Ok(())
        } else {
            let names: Vec<_> = report.failed.iter().map(|f| f.name.as_str()).collect();
            Err(PhiVaultError::StorageWriteFailed(format!(
                "caches not cleared: {}",
                names.join(", ")
            )))
        };
        record(LogoutStep::PhiCaches, caches_result);

        record(
            LogoutStep::EncryptionKeys,
            self.encryption.clear_keys(owner_id).await,
        );
        record(
            LogoutStep::BiometricData,
            self.auth.clear_biometric_data(owner_id).await,
        );
        record(
            LogoutStep::RemoteDocuments,
            self.remote.documents.clear().await,
        );
        record(
            LogoutStep::SyncQueue,
            self.remote.sync_queue.clear_queue().await,
        );

        self.state.write().reset();
        record(
            LogoutStep::SessionState,
            self.preferences.remove(SESSION_STATE_KEY).await,
        );

        record(LogoutStep::AuthToken, self.remote.tokens.sign_out().await);
        record(LogoutStep::AuthPreferences, self.purge_auth_preferences().await);

        if failed.is_empty() {
            info!("Logout complete for owner {}", owner_id);
            Ok(())
        } else {
            warn!("Logout finished with {} failed steps", failed.len());
            Err(PhiVaultError::Logout {
                failed_steps: failed,
            })
        }
    }

    async fn purge_auth_preferences(&self) -> Result<()> {
        let keys = self.preferences.keys().await?;

        let mut first_error = None;
        for key in keys.iter().filter(|k| is_auth_preference(k)) {
            if let Err(e) = self.preferences.remove(key).await {
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_preference_tags() {
        for key in [
            "auth-session-storage",
            "user-profile",
            "auth-token",
            "session-data",
            "Auth_Session_State",
        ] {
            assert!(is_auth_preference(key), "{}", key);
        }
        assert!(!is_auth_preference("other-data"));
        assert!(!is_auth_preference("theme"));
    }

    #[test]
    fn test_step_names_are_unique() {
        let mut names: Vec<_> = LogoutStep::ALL.iter().map(LogoutStep::as_str).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), LogoutStep::ALL.len());
    }
}
