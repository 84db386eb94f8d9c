//! Poll interval schedules.
//!
//! A [`PollSchedule`] starts at `initial_interval_ms` and grows by
//! `multiplier` after every poll, clamped to `max_interval_ms`. A
//! multiplier of `1.0` gives a fixed interval.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollSchedule {
    /// Delay before the first status query.
    pub initial_interval_ms: u64,
    /// Upper bound on the delay between queries.
    pub max_interval_ms: u64,
    /// Factor by which the delay grows after each query.
    pub multiplier: f64,
}

impl PollSchedule {
    /// A constant interval.
    pub fn fixed(interval: Duration) -> Self {
        let ms = interval.as_millis() as u64;
        Self {
            initial_interval_ms: ms,
            max_interval_ms: ms,
            multiplier: 1.0,
        }
    }

    /// An interval that grows geometrically up to `max`.
    pub fn growing(initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            initial_interval_ms: initial.as_millis() as u64,
            max_interval_ms: max.as_millis() as u64,
            multiplier,
        }
    }

    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms).min(self.max_interval())
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    /// Calculate the next interval from the current one, clamped to
    /// [`max_interval`](Self::max_interval).
    pub fn next_interval(&self, current: Duration) -> Duration {
        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        };
        let next_ms = (current.as_millis() as f64 * multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_interval())
    }

    /// Sum of the first `attempts` intervals: the time spent sleeping before
    /// the poller gives up on attempt count alone.
    pub fn total_wait(&self, attempts: u32) -> Duration {
        let mut interval = self.initial_interval();
        let mut total = Duration::ZERO;
        for _ in 0..attempts {
            total += interval;
            interval = self.next_interval(interval);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_schedule_never_grows() {
        let schedule = PollSchedule::fixed(Duration::from_secs(5));
        let d = schedule.next_interval(Duration::from_secs(5));
        assert_eq!(d, Duration::from_secs(5));
    }

    #[test]
    fn growing_schedule_clamps_at_max() {
        let schedule =
            PollSchedule::growing(Duration::from_secs(5), 1.5, Duration::from_secs(10));
        let mut delay = schedule.initial_interval();
        let expected_ms = [5000, 7500, 10000, 10000];
        for &ms in &expected_ms {
            assert_eq!(delay.as_millis() as u64, ms);
            delay = schedule.next_interval(delay);
        }
    }

    #[test]
    fn shrinking_multiplier_is_treated_as_fixed() {
        let schedule = PollSchedule::growing(Duration::from_secs(4), 0.5, Duration::from_secs(10));
        assert_eq!(
            schedule.next_interval(Duration::from_secs(4)),
            Duration::from_secs(4)
        );
    }

    #[test]
    fn total_wait_sums_intervals() {
        let schedule = PollSchedule::fixed(Duration::from_secs(5));
        assert_eq!(schedule.total_wait(3), Duration::from_secs(15));
    }
}
