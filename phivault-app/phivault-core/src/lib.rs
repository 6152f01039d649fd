//! PHI protection for a clinical mobile app: encryption at rest, biometric
//! and PIN gating with lockout, PHI cache wiping, and the session lock
//! state machine that ties them together.
//!
//! Platform capabilities (secure key storage, biometric hardware, remote
//! stores, preferences, files, time) are traits in their own modules;
//! [`PhiProtection`] wires the services from a [`PlatformAdapters`] bundle.

pub mod auth;
pub mod biometric;
pub mod cache;
pub mod clock;
pub mod crypto;
pub mod error;
pub mod files;
pub mod keystore;
pub mod remote;
pub mod session;
pub mod state;
pub mod storage;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{PhiVaultError, Result};
pub use state::{PhiProtection, PlatformAdapters};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Returns `false` when a subscriber was already installed.
pub fn init_tracing() -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phivault_core=debug,phivault_securestore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
