//! Biometric/PIN Auth Service.

mod config;
mod lockout;
mod pin;
mod service;

pub use config::{AuthStatus, BiometricConfig};
pub use lockout::LockoutStatus;
pub use pin::{validate_pin, PinDigest, PinKdfParams, SALT_SIZE};
pub use service::AuthService;
