//! Overarching deadline passed down to every call and wait.

use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Stand-in for "never" when a budget does not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A point in time after which an operation must give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    /// Deadline `budget` from now.
    ///
    /// Budgets too large to represent (such as [`Duration::MAX`]) are
    /// treated as "no deadline" and saturate to a far-future instant.
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        Self {
            at: saturating_add(Instant::now(), budget),
            budget,
        }
    }

    /// The budget the deadline was created with.
    #[inline]
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Time left, zero once expired.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Returns `true` once the deadline has passed.
    #[inline]
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// The instant at which the deadline expires.
    #[inline]
    #[must_use]
    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Shortens `timeout` so it never outlives the deadline.
    #[inline]
    #[must_use]
    pub fn clamp(&self, timeout: Duration) -> Duration {
        timeout.min(self.remaining())
    }

    /// Fails with [`Error::Timeout`] if the deadline has already passed.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_expired() {
            return Err(self.expired(operation));
        }
        Ok(())
    }

    /// Builds the timeout error reported when `operation` runs out of time.
    #[must_use]
    pub fn expired(&self, operation: &str) -> Error {
        Error::timeout(operation, millis(self.budget))
    }
}

/// `instant + duration`, saturating to a far-future instant on overflow.
#[must_use]
pub(crate) fn saturating_add(instant: Instant, duration: Duration) -> Instant {
    instant
        .checked_add(duration)
        .or_else(|| instant.checked_add(FAR_FUTURE))
        .unwrap_or(instant)
}

/// Whole milliseconds of `duration`, saturating at `u64::MAX`.
#[inline]
#[must_use]
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_never_exceeds_remaining() {
        let deadline = Deadline::after(Duration::from_millis(50));
        assert!(deadline.clamp(Duration::from_secs(30)) <= Duration::from_millis(50));
        assert_eq!(
            deadline.clamp(Duration::from_millis(0)),
            Duration::from_millis(0)
        );
    }

    #[test]
    fn test_expired_deadline() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);

        let err = deadline.check("navigate").unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("navigate"));
    }

    #[test]
    fn test_fresh_deadline_passes_check() {
        let deadline = Deadline::after(Duration::from_secs(10));
        assert!(deadline.check("print").is_ok());
    }

    #[test]
    fn test_unbounded_budget_saturates() {
        let deadline = Deadline::after(Duration::MAX);
        assert!(!deadline.is_expired());
        assert!(deadline.remaining() > Duration::from_secs(365 * 24 * 60 * 60));
        assert_eq!(deadline.budget(), Duration::MAX);
        assert_eq!(
            deadline.clamp(Duration::from_secs(30)),
            Duration::from_secs(30)
        );

        let err = deadline.expired("print");
        assert!(err.to_string().contains(&u64::MAX.to_string()));
    }

    #[test]
    fn test_saturating_add() {
        let now = Instant::now();
        assert_eq!(
            saturating_add(now, Duration::from_secs(1)),
            now + Duration::from_secs(1)
        );
        assert!(saturating_add(now, Duration::MAX) > now);
    }
}
