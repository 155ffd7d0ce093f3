//! Time bucket selection
//!
//! Counters are grouped into fixed-length windows measured from a configured
//! `period_start`. A bucket is named after the wall-clock time its window starts:
//!
//! Bucket key format: `<prefix>:<YYYYMMDDhhmmss>`

use crate::error::StatError;
use chrono::{NaiveDateTime, TimeDelta};

/// Timestamp layout used in bucket keys
pub const BUCKET_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Format the key of the bucket starting at `bucket_start`
pub fn format_bucket_key(prefix: &str, bucket_start: NaiveDateTime) -> String {
    format!("{}:{}", prefix, bucket_start.format(BUCKET_TIME_FORMAT))
}

/// Maps instants to the canonical bucket of a fixed period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSelector {
    prefix: String,
    period_start: NaiveDateTime,
    period: TimeDelta,
}

impl BucketSelector {
    /// Create a selector; the period must be at least one millisecond
    pub fn new(
        prefix: impl Into<String>,
        period_start: NaiveDateTime,
        period: TimeDelta,
    ) -> Result<Self, StatError> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(StatError::invalid_config("key prefix is empty"));
        }
        if period.num_milliseconds() <= 0 {
            return Err(StatError::invalid_config(format!(
                "period must be positive, got {}ms",
                period.num_milliseconds()
            )));
        }

        Ok(BucketSelector {
            prefix,
            period_start,
            period,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn period_start(&self) -> NaiveDateTime {
        self.period_start
    }

    pub fn period(&self) -> TimeDelta {
        self.period
    }

    /// Start of the window containing `instant`
    ///
    /// Uses floor division so instants before `period_start` land in the
    /// window that starts at or before them, never after.
    pub fn bucket_start(&self, instant: NaiveDateTime) -> NaiveDateTime {
        let elapsed_ms = (instant - self.period_start).num_milliseconds();
        let period_ms = self.period.num_milliseconds();
        let truncated_ms = elapsed_ms - elapsed_ms.rem_euclid(period_ms);

        let start = self.period_start + TimeDelta::milliseconds(truncated_ms);
        // num_milliseconds() rounds toward zero, so a sub-millisecond
        // remainder before period_start can land one window late
        if start > instant {
            return start - TimeDelta::milliseconds(period_ms);
        }
        start
    }

    /// Canonical bucket key for `instant`
    pub fn bucket_key(&self, instant: NaiveDateTime) -> String {
        format_bucket_key(&self.prefix, self.bucket_start(instant))
    }
}
