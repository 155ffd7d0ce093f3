//! Core types for positional item-distribution statistics

use ahash::AHashMap;

/// A decoded counter field.
///
/// The wire form carries a fifth component, the per-worker dedup token. It only
/// keeps fields from different writers apart inside the store hash and is dropped
/// once the key has been validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterKey {
    pub experiment_tag: String,
    pub reason: String,
    pub position_index: usize,
    pub item_id: String,
}

impl CounterKey {
    pub fn item_key(&self) -> ItemKey {
        ItemKey::new(self.item_id.clone(), self.reason.clone())
    }
}

/// Composite key of a count table: which item, and why it was shown
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    pub item_id: String,
    pub reason: String,
}

impl ItemKey {
    pub fn new(item_id: impl Into<String>, reason: impl Into<String>) -> Self {
        ItemKey {
            item_id: item_id.into(),
            reason: reason.into(),
        }
    }

    /// Report cell for this item: `item_id,reason`
    pub fn label(&self) -> String {
        format!("{},{}", self.item_id, self.reason)
    }
}

/// Accumulated counts for one `(experiment_tag, position_index)` slot.
///
/// Entries keep first-insertion order so that ranking ties are stable.
#[derive(Debug, Clone, Default)]
pub struct CountTable {
    entries: Vec<(ItemKey, u64)>,
    index: AHashMap<ItemKey, usize>,
    total: u64,
}

impl CountTable {
    pub fn new() -> Self {
        CountTable {
            entries: Vec::new(),
            index: AHashMap::new(),
            total: 0,
        }
    }

    /// Verify all invariants hold for this table
    /// Called in debug builds after every mutation
    #[cfg(debug_assertions)]
    fn verify_invariants(&self) {
        debug_assert_eq!(
            self.entries.len(),
            self.index.len(),
            "Invariant violated: index must cover every entry exactly once"
        );
        for (slot, (key, _)) in self.entries.iter().enumerate() {
            debug_assert_eq!(
                self.index.get(key),
                Some(&slot),
                "Invariant violated: index slot for {:?} must point at its entry",
                key
            );
        }
        debug_assert_eq!(
            self.entries.iter().map(|(_, count)| u128::from(*count)).sum::<u128>(),
            u128::from(self.total),
            "Invariant violated: total must equal the sum of entries"
        );
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    fn verify_invariants(&self) {}

    /// Add `count` to the entry for `key`, creating it on first sight
    ///
    /// Returns the entry's new count, or `None` (table unchanged) when the
    /// table total would overflow `u64`.
    pub fn add(&mut self, key: ItemKey, count: u64) -> Option<u64> {
        let total = self.total.checked_add(count)?;
        let updated = match self.index.get(&key) {
            Some(&slot) => {
                let entry = &mut self.entries[slot].1;
                // Never exceeds the checked total
                *entry += count;
                *entry
            }
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, count));
                count
            }
        };
        self.total = total;

        self.verify_invariants();
        Some(updated)
    }

    pub fn get(&self, item_id: &str, reason: &str) -> Option<u64> {
        let key = ItemKey::new(item_id, reason);
        self.index.get(&key).map(|&slot| self.entries[slot].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all counts in the table
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Iterate entries in first-insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&ItemKey, u64)> {
        self.entries.iter().map(|(key, count)| (key, *count))
    }
}

/// Tables compare as mappings: insertion order is not part of equality.
impl PartialEq for CountTable {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(key, count)| other.get(&key.item_id, &key.reason) == Some(*count))
    }
}

impl Eq for CountTable {}

/// Count tables of one experiment, indexed by position
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionList {
    tables: Vec<CountTable>,
    total: u64,
}

impl PositionList {
    /// Create a list holding `len` empty tables
    pub fn with_len(len: usize) -> Self {
        PositionList {
            tables: (0..len).map(|_| CountTable::new()).collect(),
            total: 0,
        }
    }

    /// Add `count` for `key` at position `index`, growing the list with
    /// empty tables when the index is past the end
    ///
    /// Returns the entry's new count, or `None` (list unchanged) when the
    /// list total would overflow `u64`.
    pub fn add(&mut self, index: usize, key: ItemKey, count: u64) -> Option<u64> {
        let total = self.total.checked_add(count)?;
        // A table total never exceeds the list total
        let updated = self.table_mut(index).add(key, count)?;
        self.total = total;
        Some(updated)
    }

    fn table_mut(&mut self, index: usize) -> &mut CountTable {
        if index >= self.tables.len() {
            self.tables.resize_with(index + 1, CountTable::new);
        }

        debug_assert!(
            index < self.tables.len(),
            "Postcondition violated: list must hold index {} after growth",
            index
        );
        &mut self.tables[index]
    }

    pub fn get(&self, index: usize) -> Option<&CountTable> {
        self.tables.get(index)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CountTable> {
        self.tables.iter()
    }

    /// Sum of every count across every position
    pub fn total_count(&self) -> u64 {
        self.total
    }

    /// Entry count of the widest table
    pub fn max_entries(&self) -> usize {
        self.tables.iter().map(CountTable::len).max().unwrap_or(0)
    }
}

/// Per-experiment position lists, iterated in first-seen tag order
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    order: Vec<String>,
    experiments: AHashMap<String, PositionList>,
    total: u64,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` to the cell named by `key`
    ///
    /// An experiment seen for the first time starts with `line_limit` empty
    /// positions. Returns the cell's new count, or `None` (aggregate
    /// unchanged) when the overall total would overflow `u64`.
    pub fn add(&mut self, key: &CounterKey, count: u64, line_limit: usize) -> Option<u64> {
        let total = self.total.checked_add(count)?;
        let updated = self.entry(&key.experiment_tag, line_limit).add(
            key.position_index,
            key.item_key(),
            count,
        )?;
        self.total = total;
        Some(updated)
    }

    fn entry(&mut self, tag: &str, line_limit: usize) -> &mut PositionList {
        let order = &mut self.order;
        self.experiments.entry(tag.to_string()).or_insert_with(|| {
            order.push(tag.to_string());
            PositionList::with_len(line_limit)
        })
    }

    pub fn get(&self, tag: &str) -> Option<&PositionList> {
        self.experiments.get(tag)
    }

    /// Experiment tags in the order they were first seen
    pub fn tags(&self) -> &[String] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PositionList)> {
        self.order.iter().filter_map(move |tag| {
            self.experiments
                .get(tag)
                .map(|positions| (tag.as_str(), positions))
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Sum of every count across every experiment
    pub fn total_count(&self) -> u64 {
        self.total
    }
}

/// Aggregates compare as mappings from tag to positions; first-seen order is ignored.
impl PartialEq for Aggregate {
    fn eq(&self, other: &Self) -> bool {
        self.experiments == other.experiments
    }
}

impl Eq for Aggregate {}

/// One row of a ranked distribution
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    pub item_id: String,
    pub reason: String,
    pub count: u64,
    pub probability: f64,
}

impl RankedEntry {
    pub fn label(&self) -> String {
        format!("{},{}", self.item_id, self.reason)
    }
}

/// Count table entries ordered by descending count, annotated with probabilities
#[derive(Debug, Clone, PartialEq)]
pub struct RankedDistribution {
    entries: Vec<RankedEntry>,
    total: u64,
}

impl RankedDistribution {
    pub(crate) fn new(entries: Vec<RankedEntry>, total: u64) -> Self {
        RankedDistribution { entries, total }
    }

    pub fn entries(&self) -> &[RankedEntry] {
        &self.entries
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_table_accumulates() {
        let mut table = CountTable::new();
        table.add(ItemKey::new("5120", "normal"), 3);
        table.add(ItemKey::new("5120", "normal"), 2);
        table.add(ItemKey::new("5121", "normal"), 5);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("5120", "normal"), Some(5));
        assert_eq!(table.get("5121", "normal"), Some(5));
        assert_eq!(table.get("5121", "boost"), None);
        assert_eq!(table.total(), 10);
    }

    #[test]
    fn test_count_table_keeps_insertion_order() {
        let mut table = CountTable::new();
        table.add(ItemKey::new("b", "r"), 1);
        table.add(ItemKey::new("a", "r"), 1);
        table.add(ItemKey::new("b", "r"), 1);

        let order: Vec<&str> = table.iter().map(|(k, _)| k.item_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn test_count_table_equality_ignores_order() {
        let mut t1 = CountTable::new();
        t1.add(ItemKey::new("a", "r"), 1);
        t1.add(ItemKey::new("b", "r"), 2);

        let mut t2 = CountTable::new();
        t2.add(ItemKey::new("b", "r"), 2);
        t2.add(ItemKey::new("a", "r"), 1);

        assert_eq!(t1, t2);

        t2.add(ItemKey::new("a", "r"), 1);
        assert_ne!(t1, t2);
    }

    #[test]
    fn test_position_list_grows_past_floor() {
        let mut list = PositionList::with_len(3);
        assert_eq!(list.len(), 3);
        assert!(list.iter().all(CountTable::is_empty));

        list.add(7, ItemKey::new("x", "r"), 4);
        assert_eq!(list.len(), 8);
        assert!(list.get(5).is_some_and(CountTable::is_empty));
        assert_eq!(list.get(7).and_then(|t| t.get("x", "r")), Some(4));

        // Lower indices never shrink the list
        list.add(0, ItemKey::new("y", "r"), 1);
        assert_eq!(list.len(), 8);
        assert_eq!(list.total_count(), 5);
        assert_eq!(list.max_entries(), 1);
    }

    #[test]
    fn test_aggregate_first_seen_order() {
        let mut agg = Aggregate::new();
        agg.add(&key("z", 0, "1"), 1, 2);
        agg.add(&key("a", 1, "2"), 2, 2);
        agg.add(&key("z", 0, "1"), 1, 2);

        assert_eq!(agg.tags(), &["z".to_string(), "a".to_string()]);
        assert_eq!(agg.len(), 2);
        assert_eq!(agg.total_count(), 4);

        let tags: Vec<&str> = agg.iter().map(|(tag, _)| tag).collect();
        assert_eq!(tags, vec!["z", "a"]);
    }

    fn key(tag: &str, position_index: usize, item_id: &str) -> CounterKey {
        CounterKey {
            experiment_tag: tag.to_string(),
            reason: "r".to_string(),
            position_index,
            item_id: item_id.to_string(),
        }
    }

    #[test]
    fn test_count_table_rejects_overflow() {
        let mut table = CountTable::new();
        assert_eq!(table.add(ItemKey::new("a", "r"), u64::MAX - 1), Some(u64::MAX - 1));
        assert_eq!(table.add(ItemKey::new("a", "r"), 1), Some(u64::MAX));
        assert_eq!(table.add(ItemKey::new("b", "r"), 1), None);
        assert_eq!(table.add(ItemKey::new("a", "r"), 1), None);

        // Rejected additions leave the table untouched
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("a", "r"), Some(u64::MAX));
        assert_eq!(table.total(), u64::MAX);
    }

    #[test]
    fn test_totals_reject_overflow_across_tables() {
        let mut agg = Aggregate::new();
        assert!(agg.add(&key("a", 0, "1"), u64::MAX, 1).is_some());
        // Different experiment and position, same overall total
        assert_eq!(agg.add(&key("b", 3, "2"), 1, 1), None);
        assert_eq!(agg.total_count(), u64::MAX);
        assert_eq!(agg.len(), 1);

        let mut list = PositionList::with_len(2);
        assert!(list.add(0, ItemKey::new("x", "r"), u64::MAX).is_some());
        assert_eq!(list.add(1, ItemKey::new("y", "r"), 1), None);
        assert_eq!(list.total_count(), u64::MAX);
        assert!(list.get(1).is_some_and(CountTable::is_empty));
    }

    #[test]
    fn test_item_key_label() {
        assert_eq!(ItemKey::new("5120", "normal").label(), "5120,normal");
    }
}
