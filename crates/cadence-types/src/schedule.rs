//! Schedule records and the interval advancement rule.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Shortest allowed interval.
pub const MIN_INTERVAL_SECONDS: i64 = 1;

/// Longest allowed interval (one year).
pub const MAX_INTERVAL_SECONDS: i64 = 31_536_000;

/// A persisted recurrence rule that triggers a workflow every `interval_seconds`.
///
/// Created and edited by the external API. The scheduler only writes the run
/// bookkeeping fields (`next_run_at`, `last_run_at`, `run_count`,
/// `failure_count`, `last_error`, `updated_at`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub is_active: bool,
    pub interval_seconds: i64,
    pub start_at: DateTime<Utc>,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub run_count: i64,
    pub failure_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// Create an active schedule whose first run is `next_run_at`.
    pub fn new(workflow_id: Uuid, interval_seconds: i64, next_run_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            is_active: true,
            interval_seconds,
            start_at: next_run_at.min(now),
            next_run_at,
            last_run_at: None,
            run_count: 0,
            failure_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The validated interval.
    pub fn interval(&self) -> Result<Duration> {
        if !(MIN_INTERVAL_SECONDS..=MAX_INTERVAL_SECONDS).contains(&self.interval_seconds) {
            return Err(Error::InvalidInterval {
                value: self.interval_seconds,
                min: MIN_INTERVAL_SECONDS,
                max: MAX_INTERVAL_SECONDS,
            });
        }
        Ok(Duration::seconds(self.interval_seconds))
    }

    /// Whether the schedule is eligible at `now` given a look-ahead window.
    pub fn is_due(&self, now: DateTime<Utc>, lookahead_seconds: i64) -> bool {
        self.is_active
            && self.start_at <= now
            && self.next_run_at <= now + Duration::seconds(lookahead_seconds)
    }

    /// The `next_run_at` this schedule moves to once an attempt at `fired_at` completes.
    pub fn next_run_after(&self, fired_at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.interval()?;
        Ok(next_run_after(
            self.next_run_at,
            self.interval_seconds,
            fired_at,
        ))
    }
}

/// Advance `previous` by the smallest whole number of intervals (at least one)
/// that lands strictly after `fired_at`.
///
/// Missed ticks are skipped rather than replayed, and the schedule never
/// drifts off its original grid.
///
/// `interval_seconds` must already be validated as positive.
pub fn next_run_after(
    previous: DateTime<Utc>,
    interval_seconds: i64,
    fired_at: DateTime<Utc>,
) -> DateTime<Utc> {
    let interval_us = interval_seconds.max(MIN_INTERVAL_SECONDS) * 1_000_000;
    let elapsed_us = (fired_at - previous)
        .num_microseconds()
        .unwrap_or(i64::MAX);

    let steps = if elapsed_us < 0 {
        1
    } else {
        elapsed_us / interval_us + 1
    };

    previous + Duration::seconds(interval_seconds.max(MIN_INTERVAL_SECONDS) * steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_advance_single_interval() {
        assert_eq!(next_run_after(at(0), 60, at(1)), at(60));
    }

    #[test]
    fn test_advance_when_fired_early_in_lookahead() {
        // fired before next_run_at (look-ahead) still moves exactly one interval
        assert_eq!(next_run_after(at(0), 60, at(-3)), at(60));
    }

    #[test]
    fn test_advance_skips_missed_ticks() {
        assert_eq!(next_run_after(at(0), 60, at(250)), at(300));
    }

    #[test]
    fn test_advance_on_exact_boundary_is_strict() {
        assert_eq!(next_run_after(at(0), 60, at(60)), at(120));
        assert_eq!(next_run_after(at(0), 60, at(0)), at(60));
    }

    #[test]
    fn test_advance_is_smallest_whole_multiple() {
        let previous = at(0);
        for interval in [1, 7, 60, 3600] {
            for fired in [-5, 0, 1, 59, 60, 61, 599, 7201] {
                let fired_at = at(fired);
                let next = next_run_after(previous, interval, fired_at);
                let delta = (next - previous).num_seconds();
                assert!(delta >= interval);
                assert_eq!(delta % interval, 0);
                assert!(next > fired_at);
                assert!(next - Duration::seconds(interval) <= fired_at || delta == interval);
            }
        }
    }

    #[test]
    fn test_interval_validation() {
        let mut schedule = Schedule::new(Uuid::new_v4(), 60, at(0));
        assert!(schedule.interval().is_ok());

        schedule.interval_seconds = 0;
        assert!(matches!(
            schedule.interval(),
            Err(Error::InvalidInterval { value: 0, .. })
        ));

        schedule.interval_seconds = MAX_INTERVAL_SECONDS + 1;
        assert!(schedule.interval().is_err());

        schedule.interval_seconds = MAX_INTERVAL_SECONDS;
        assert!(schedule.interval().is_ok());
    }

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        let mut schedule = Schedule::new(Uuid::new_v4(), 60, now - Duration::seconds(1));
        schedule.start_at = now - Duration::hours(1);
        assert!(schedule.is_due(now, 0));

        schedule.next_run_at = now + Duration::seconds(3);
        assert!(!schedule.is_due(now, 0));
        assert!(schedule.is_due(now, 5));

        schedule.next_run_at = now - Duration::seconds(1);
        schedule.is_active = false;
        assert!(!schedule.is_due(now, 5));

        schedule.is_active = true;
        schedule.start_at = now + Duration::minutes(1);
        assert!(!schedule.is_due(now, 5));
    }
}
