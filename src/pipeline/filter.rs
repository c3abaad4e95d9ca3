use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::config::ListingConfig;
use crate::types::ObjectRecord;

const FILTER_NAME: &str = "TimeWindowFilter";

/// Keeps objects modified within `time_window` of `now`, or everything in backfill mode.
#[derive(Debug, Clone, Copy)]
pub struct TimeWindowFilter {
    now: DateTime<Utc>,
    time_window: TimeDelta,
    backfill: bool,
}

impl TimeWindowFilter {
    pub fn new(now: DateTime<Utc>, listing_config: &ListingConfig) -> Self {
        Self {
            now,
            time_window: listing_config.time_window,
            backfill: listing_config.backfill,
        }
    }

    pub fn is_eligible(&self, record: &ObjectRecord) -> bool {
        if self.backfill || self.now - record.last_modified <= self.time_window {
            return true;
        }

        debug!(
            name = FILTER_NAME,
            relpath = record.relpath,
            last_modified = record.last_modified.to_rfc3339(),
            cutoff = (self.now - self.time_window).to_rfc3339(),
            "object filtered."
        );

        false
    }
}
