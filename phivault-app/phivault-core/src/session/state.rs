use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Persisted session timestamps and lock flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// `None` for a session that has never recorded activity.
    pub last_activity_at: Option<DateTime<Utc>>,
    pub session_timeout_secs: i64,
    pub backgrounded_at: Option<DateTime<Utc>>,
    pub is_locked: bool,
}

impl SessionState {
    pub fn new(session_timeout: Duration) -> Self {
        Self {
            last_activity_at: None,
            session_timeout_secs: session_timeout.num_seconds(),
            backgrounded_at: None,
            is_locked: false,
        }
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::seconds(self.session_timeout_secs)
    }

    pub fn phase(&self) -> SessionPhase {
        if self.is_locked {
            SessionPhase::Locked
        } else if self.backgrounded_at.is_some() {
            SessionPhase::Backgrounded
        } else {
            SessionPhase::Active
        }
    }

    /// Valid while strictly less than the timeout has passed since the last
    /// activity. A session with no recorded activity is valid.
    pub fn is_within_timeout(&self, now: DateTime<Utc>) -> bool {
        match self.last_activity_at {
            None => true,
            Some(last) => now - last < self.session_timeout(),
        }
    }

    /// True once at least `timeout` has passed since backgrounding.
    pub fn background_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        match self.backgrounded_at {
            None => false,
            Some(at) => now - at >= timeout,
        }
    }

    pub(crate) fn mark_unlocked(&mut self, now: DateTime<Utc>) {
        self.is_locked = false;
        self.backgrounded_at = None;
        self.last_activity_at = Some(now);
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new(self.session_timeout());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SessionPhase {
    Active,
    Backgrounded,
    Locked,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Backgrounded => write!(f, "Backgrounded"),
            Self::Locked => write!(f, "Locked"),
        }
    }
}

/// Result of a biometric unlock attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockOutcome {
    Unlocked,
    /// Biometrics did not unlock, but a PIN may; retry through the PIN path.
    PinRequired,
    Denied,
}
