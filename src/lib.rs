//! Positional distribution statistics for recommendation experiments
//!
//! Writers count `(experiment, reason, position, item)` occurrences into
//! time-bucketed hashes through [`recorder`]; [`stats::ItemStat`] reads a
//! bucket back and renders, per experiment and position, the ranked items
//! with their share of the total.
//!
//! ```text
//! RecorderHandle::incr ──► RecorderActor ──► CounterStore (bucket hash)
//!                                                 │
//!              CSV ◄── ReportSerializer ◄── Aggregator ◄── ItemStat
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod observability;
pub mod recorder;
pub mod rng;
pub mod sink;
pub mod stats;
pub mod store;

pub use clock::{SimulatedClock, StatClock, SystemClock};
pub use config::{parse_timestamp, RecorderConfig, StatConfig};
pub use error::StatError;
pub use recorder::{spawn_recorder, RecorderHandle};
pub use sink::CsvSink;
pub use stats::{
    aggregate, Aggregate, BucketSelector, CountTable, CounterKey, DistributionAggregator,
    DistributionNormalizer, ItemKey, ItemStat, KeyCodec, PositionList, RankedDistribution,
    RankedEntry, ReportRow, ReportSerializer,
};
pub use store::{CounterStore, InMemoryCounterStore, RedisCounterStore};
