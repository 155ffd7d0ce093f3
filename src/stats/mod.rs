//! Distribution statistics over per-bucket counters
//!
//! A bucket is a flat hash of `tag:reason:index:item:token -> count` fields.
//! The pipeline decodes each field, folds counts per experiment and position,
//! normalizes each position into ranked probabilities and renders report rows.

pub mod aggregate_dst;
mod aggregator;
mod bucket;
mod item_stat;
mod key_codec;
mod normalizer;
mod report;
mod types;

pub use aggregate_dst::{
    run_aggregate_batch, summarize_aggregate_batch, AggregateDSTConfig, AggregateDSTHarness,
    AggregateDSTResult,
};
pub use aggregator::{aggregate, DistributionAggregator, DEFAULT_LINE_LIMIT};
pub use bucket::{format_bucket_key, BucketSelector, BUCKET_TIME_FORMAT};
pub use item_stat::ItemStat;
pub use key_codec::{KeyCodec, FIELD_PARTS, FIELD_SEPARATOR};
pub use normalizer::DistributionNormalizer;
pub use report::{rank_label, ReportRow, ReportSerializer, RATIO_LABEL};
pub use types::{
    Aggregate, CountTable, CounterKey, ItemKey, PositionList, RankedDistribution, RankedEntry,
};
