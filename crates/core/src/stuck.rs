//! Stuck-student detection.
//!
//! A student is stuck when a lesson is still in progress but nothing has
//! happened for longer than the policy threshold. This is a pure function of
//! wall-clock time evaluated at query time; there is no background timer.

use chrono::{DateTime, Duration, Utc};

use crate::model::CompletionStatus;

/// Default idle threshold in minutes.
pub const DEFAULT_STUCK_MINUTES: i64 = 20;

/// Idle-time policy deciding when an in-progress lesson counts as stuck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StuckPolicy {
    threshold: Duration,
}

impl Default for StuckPolicy {
    fn default() -> Self {
        Self::from_minutes(DEFAULT_STUCK_MINUTES)
    }
}

impl StuckPolicy {
    #[must_use]
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    #[must_use]
    pub fn from_minutes(minutes: i64) -> Self {
        Self::new(Duration::minutes(minutes))
    }

    #[must_use]
    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// The instant separating stuck from not-stuck: records whose last
    /// activity is strictly before this are stuck.
    #[must_use]
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.threshold
    }

    /// Whether a record with the given status and last activity is stuck.
    ///
    /// Idle for exactly the threshold is not stuck; the boundary is excluded.
    #[must_use]
    pub fn is_stuck(
        &self,
        status: CompletionStatus,
        last_activity: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        status == CompletionStatus::InProgress
            && now.signed_duration_since(last_activity) > self.threshold
    }
}
