use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attempt budget of a tracked execution. Non-positive inputs fall back to
/// the default of 3; values above 100 are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaxAttempts(i32);

impl MaxAttempts {
    pub const DEFAULT: i32 = 3;
    pub const MAX: i32 = 100;

    pub fn new(value: i32) -> Self {
        if value <= 0 {
            Self(Self::DEFAULT)
        } else {
            Self(value.min(Self::MAX))
        }
    }

    pub fn value(&self) -> i32 {
        self.0
    }

    pub fn is_exhausted(&self, attempt_count: i32) -> bool {
        attempt_count >= self.0
    }
}

impl Default for MaxAttempts {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl std::fmt::Display for MaxAttempts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a tracked execution currently stands, independent of the
/// entity-specific status enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    InFlight,
    Retrying { next_retry_at: Option<DateTime<Utc>> },
    Succeeded,
    Failed,
}

/// Replay rule for a dedupe hit:
/// succeeded never reruns, failed reruns only with budget left, retrying
/// waits for its window, anything else reruns.
pub fn replay_allowed(
    phase: AttemptPhase,
    attempt_count: i32,
    max_attempts: i32,
    now: DateTime<Utc>,
) -> bool {
    match phase {
        AttemptPhase::Succeeded => false,
        AttemptPhase::Failed => attempt_count < max_attempts,
        AttemptPhase::Retrying {
            next_retry_at: Some(next),
        } if now < next => false,
        AttemptPhase::Retrying { .. } | AttemptPhase::InFlight => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureSettlement {
    Terminal,
    Retry { at: DateTime<Utc> },
}

/// A failure is terminal without a retry time or once the budget is spent.
pub fn settle_failure(
    attempt_count: i32,
    max_attempts: i32,
    next_retry_at: Option<DateTime<Utc>>,
) -> FailureSettlement {
    match next_retry_at {
        Some(at) if attempt_count < max_attempts => FailureSettlement::Retry { at },
        _ => FailureSettlement::Terminal,
    }
}
