use chrono::{DateTime, Utc};
use std::time::Duration;

/// Source of wall-clock time for cache stamps and optimistic records.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// Time elapsed since `at`, zero when `at` lies in the future.
    #[must_use]
    pub fn elapsed_since(&self, at: DateTime<Utc>) -> Duration {
        (self.now() - at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Deterministic timestamp for tests (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_has_no_elapsed_time() {
        let clock = fixed_clock();
        assert_eq!(clock.elapsed_since(fixed_now()), Duration::ZERO);
    }

    #[test]
    fn future_stamp_saturates_to_zero() {
        let clock = fixed_clock();
        let later = fixed_now() + chrono::Duration::seconds(30);
        assert_eq!(clock.elapsed_since(later), Duration::ZERO);
        assert_eq!(
            Clock::fixed(later).elapsed_since(fixed_now()),
            Duration::from_secs(30)
        );
    }
}
