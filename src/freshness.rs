//! Sliding freshness cutoff derived from the last successful run.

use chrono::{DateTime, Duration, Utc};

/// Backward pad applied to the last-run timestamp to absorb scheduling drift.
pub const DRIFT_PAD_SECS: i64 = 3 * 60;
/// Hard ceiling on how far back a run ever looks.
pub const MAX_LOOKBACK_SECS: i64 = 20 * 60;

/// Items older than the cutoff are stale backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessGate {
    cutoff: DateTime<Utc>,
}

impl FreshnessGate {
    /// `max(last_run - 3 min, now - 20 min)`; with no previous run, `now - 20 min`.
    pub fn new(last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let ceiling = now - Duration::seconds(MAX_LOOKBACK_SECS);
        let cutoff = match last_run {
            Some(last) => (last - Duration::seconds(DRIFT_PAD_SECS)).max(ceiling),
            None => ceiling,
        };
        Self { cutoff }
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    /// Untimestamped items are assumed fresh.
    pub fn is_fresh(&self, published: Option<DateTime<Utc>>) -> bool {
        published.is_none_or(|ts| ts >= self.cutoff)
    }
}
