//! Groups raw bucket fields into per-experiment, per-position count tables

use super::key_codec::KeyCodec;
use super::types::Aggregate;
use crate::error::StatError;
use tracing::debug;

/// Default number of positions every experiment starts with
pub const DEFAULT_LINE_LIMIT: usize = 40;

/// Sums counter fields into an [`Aggregate`]
///
/// Aggregation is pure summation, so the resulting counts do not depend on
/// the order in which the store returns fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionAggregator {
    line_limit: usize,
}

impl Default for DistributionAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_LIMIT)
    }
}

impl DistributionAggregator {
    /// `line_limit` is the initial position count per experiment; higher
    /// positions still extend the list
    pub fn new(line_limit: usize) -> Self {
        DistributionAggregator { line_limit }
    }

    pub fn line_limit(&self) -> usize {
        self.line_limit
    }

    /// Aggregate `(field, value)` pairs fetched from one bucket
    ///
    /// A single undecodable field or non-integer value fails the whole call.
    pub fn aggregate<I, K, V>(&self, raw_pairs: I) -> Result<Aggregate, StatError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut aggregate = Aggregate::new();
        let mut fields = 0usize;

        for (raw_key, raw_value) in raw_pairs {
            let raw_key = raw_key.as_ref();
            let key = KeyCodec::decode(raw_key)?;
            let count = parse_count(raw_key, raw_value.as_ref())?;

            if aggregate.add(&key, count, self.line_limit).is_none() {
                return Err(StatError::malformed(
                    raw_key,
                    format!("count {} overflows the bucket total", count),
                ));
            }
            fields += 1;
        }

        debug!(
            "Aggregated {} fields into {} experiments",
            fields,
            aggregate.len()
        );
        Ok(aggregate)
    }
}

/// Aggregate with an explicit line limit
pub fn aggregate<I, K, V>(raw_pairs: I, line_limit: usize) -> Result<Aggregate, StatError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    DistributionAggregator::new(line_limit).aggregate(raw_pairs)
}

fn parse_count(raw_key: &str, raw_value: &str) -> Result<u64, StatError> {
    raw_value.trim().parse::<u64>().map_err(|_| {
        StatError::malformed(
            raw_key,
            format!("count '{}' is not a non-negative integer", raw_value),
        )
    })
}
