//! Bucket report orchestration: select bucket, fetch, aggregate, render

use super::aggregator::DistributionAggregator;
use super::bucket::BucketSelector;
use super::report::{ReportRow, ReportSerializer};
use super::types::Aggregate;
use crate::clock::{StatClock, SystemClock};
use crate::config::StatConfig;
use crate::error::StatError;
use crate::store::CounterStore;
use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

/// Builds distribution reports for the bucket containing a given instant
pub struct ItemStat<S: CounterStore> {
    store: S,
    selector: BucketSelector,
    aggregator: DistributionAggregator,
}

impl<S: CounterStore> ItemStat<S> {
    pub fn new(store: S, config: &StatConfig) -> Result<Self, StatError> {
        config.validate()?;
        Ok(ItemStat {
            store,
            selector: config.selector()?,
            aggregator: DistributionAggregator::new(config.line_limit),
        })
    }

    pub fn selector(&self) -> &BucketSelector {
        &self.selector
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Bucket key holding the counters recorded at `instant`
    pub fn bucket_key(&self, instant: NaiveDateTime) -> String {
        self.selector.bucket_key(instant)
    }

    /// Fetch and aggregate one bucket
    pub fn fetch(&self, bucket_key: &str) -> Result<Aggregate, StatError> {
        let fields = self.store.fetch_bucket(bucket_key).map_err(|e| {
            warn!("Fetch of bucket {} failed: {}", bucket_key, e);
            e
        })?;
        debug!("Fetched {} fields from bucket {}", fields.len(), bucket_key);
        self.aggregator.aggregate(fields)
    }

    /// Report rows for the bucket containing `instant`
    ///
    /// An empty bucket produces no rows.
    pub fn stat(&self, instant: NaiveDateTime) -> Result<Vec<ReportRow>, StatError> {
        let bucket_key = self.bucket_key(instant);
        let aggregate = self.fetch(&bucket_key)?;
        let rows = ReportSerializer::render_report(&aggregate);

        info!(
            "Rendered {} rows for {} experiments from bucket {}",
            rows.len(),
            aggregate.len(),
            bucket_key
        );
        Ok(rows)
    }

    /// Report rows for the current bucket
    pub fn stat_now(&self) -> Result<Vec<ReportRow>, StatError> {
        self.stat_at(&SystemClock)
    }

    pub fn stat_at<C: StatClock>(&self, clock: &C) -> Result<Vec<ReportRow>, StatError> {
        self.stat(clock.now())
    }
}
