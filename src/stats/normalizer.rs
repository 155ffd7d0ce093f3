//! Turns count tables into ranked probability distributions

use super::types::{CountTable, RankedDistribution, RankedEntry};

pub struct DistributionNormalizer;

impl DistributionNormalizer {
    /// Rank a table by descending count and attach `count / total` to every entry
    ///
    /// Returns `None` for a table with nothing to rank (no entries, or only
    /// zero counts). Ties keep the table's insertion order.
    pub fn normalize(table: &CountTable) -> Option<RankedDistribution> {
        if table.is_empty() {
            return None;
        }
        let total = table.total();
        if total == 0 {
            return None;
        }

        let mut entries: Vec<RankedEntry> = table
            .iter()
            .map(|(key, count)| RankedEntry {
                item_id: key.item_id.clone(),
                reason: key.reason.clone(),
                count,
                probability: count as f64 / total as f64,
            })
            .collect();

        // sort_by is stable
        entries.sort_by(|a, b| b.count.cmp(&a.count));

        Some(RankedDistribution::new(entries, total))
    }
}
