//! Session State Machine and logout.

mod logout;
mod manager;
mod state;

pub use logout::{LogoutStep, RemotePurge};
pub use manager::{SessionManager, SESSION_STATE_KEY};
pub use state::{SessionPhase, SessionState, UnlockOutcome};
