use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The lockout marker as seen at one instant. Computing it never mutates
/// anything; an `Expired` marker stays on disk until it is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockoutStatus {
    Clear,
    Active { until: DateTime<Utc> },
    Expired { until: DateTime<Utc> },
}

impl LockoutStatus {
    pub(crate) fn evaluate(marker: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match marker {
            None => Self::Clear,
            Some(until) if now < until => Self::Active { until },
            Some(until) => Self::Expired { until },
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_evaluate_boundaries() {
        let until = Utc::now();

        assert_eq!(LockoutStatus::evaluate(None, until), LockoutStatus::Clear);
        assert_eq!(
            LockoutStatus::evaluate(Some(until), until - Duration::seconds(1)),
            LockoutStatus::Active { until }
        );
        assert_eq!(
            LockoutStatus::evaluate(Some(until), until),
            LockoutStatus::Expired { until }
        );
    }
}
