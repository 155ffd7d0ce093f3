//! Renders ranked distributions into report rows
//!
//! Output layout per experiment:
//!
//! ```text
//! exp_tag: c, log_count: 10
//! rank 1,     5120,normal, 5121,normal
//! ratio,      0.50,        0.50
//! (empty separator row)
//! ```

use super::normalizer::DistributionNormalizer;
use super::types::{Aggregate, PositionList, RankedDistribution};

/// One report row; an empty row separates experiments
pub type ReportRow = Vec<String>;

/// Label of the probability row under each rank row
pub const RATIO_LABEL: &str = "ratio";

/// Probabilities that print as this value are left out of the report
const SUPPRESSED_PROBABILITY: &str = "0.00";

pub struct ReportSerializer;

impl ReportSerializer {
    /// Item labels and probability labels for the top `max_fields` entries
    ///
    /// Entries whose probability prints as `0.00` are dropped from both
    /// sequences, so they always have equal length.
    pub fn serialize_line(
        ranked: &RankedDistribution,
        max_fields: usize,
    ) -> (Vec<String>, Vec<String>) {
        let mut item_labels = Vec::new();
        let mut prob_labels = Vec::new();

        for entry in ranked.entries().iter().take(max_fields) {
            let prob = format!("{:.2}", entry.probability);
            if prob == SUPPRESSED_PROBABILITY {
                continue;
            }
            item_labels.push(entry.label());
            prob_labels.push(prob);
        }

        debug_assert_eq!(item_labels.len(), prob_labels.len());
        (item_labels, prob_labels)
    }

    /// Rank and ratio rows for every non-empty position of one experiment
    pub fn stat_single_experiment(positions: &PositionList) -> Vec<ReportRow> {
        let max_fields = positions.max_entries();
        let mut rows = Vec::new();

        for (i, table) in positions.iter().enumerate() {
            let Some(ranked) = DistributionNormalizer::normalize(table) else {
                continue;
            };
            let (item_labels, prob_labels) = Self::serialize_line(&ranked, max_fields);

            let mut rank_row = Vec::with_capacity(item_labels.len() + 1);
            rank_row.push(rank_label(i));
            rank_row.extend(item_labels);

            let mut ratio_row = Vec::with_capacity(prob_labels.len() + 1);
            ratio_row.push(RATIO_LABEL.to_string());
            ratio_row.extend(prob_labels);

            rows.push(rank_row);
            rows.push(ratio_row);
        }

        rows
    }

    /// Full report: a header per experiment, its rows, then a separator
    pub fn render_report(aggregate: &Aggregate) -> Vec<ReportRow> {
        let mut rows = Vec::new();

        for (tag, positions) in aggregate.iter() {
            rows.push(vec![
                format!("exp_tag: {}", tag),
                format!("log_count: {}", positions.total_count()),
            ]);
            rows.extend(Self::stat_single_experiment(positions));
            rows.push(Vec::new());
        }

        rows
    }
}

/// Row label for 0-based position `index`
pub fn rank_label(index: usize) -> String {
    format!("rank {}", index + 1)
}
