//! Deterministic Simulation Testing for the aggregation pipeline
//!
//! VOPR-style harness that enables:
//! - Deterministic random bucket generation
//! - Invariant checking on every generated bucket
//! - Seed-based reproducibility for debugging
//!
//! Each round builds a random bucket of counter fields, aggregates it in the
//! fetched order and in several shuffled orders, and checks counts,
//! probabilities and rendered lines.

use super::aggregator::DistributionAggregator;
use super::key_codec::KeyCodec;
use super::normalizer::DistributionNormalizer;
use super::report::ReportSerializer;
use super::types::Aggregate;
use crate::rng::DeterministicRng;
use std::collections::HashMap;

/// Configuration for aggregation DST
#[derive(Debug, Clone)]
pub struct AggregateDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of distinct experiment tags
    pub num_tags: usize,
    /// Highest position index is `num_positions - 1`
    pub num_positions: usize,
    /// Number of distinct item ids
    pub num_items: usize,
    /// Number of distinct reasons
    pub num_reasons: usize,
    /// Fields per generated bucket
    pub fields_per_bucket: usize,
    /// Counter values are drawn from `1..=max_count`
    pub max_count: u64,
    /// Initial positions per experiment
    pub line_limit: usize,
    /// Shuffled re-aggregations per bucket
    pub shuffles: usize,
}

impl Default for AggregateDSTConfig {
    fn default() -> Self {
        AggregateDSTConfig {
            seed: 0,
            num_tags: 3,
            num_positions: 10,
            num_items: 20,
            num_reasons: 2,
            fields_per_bucket: 200,
            max_count: 50,
            line_limit: 40,
            shuffles: 3,
        }
    }
}

impl AggregateDSTConfig {
    pub fn new(seed: u64) -> Self {
        AggregateDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// Few items, many duplicates (lots of summation and ties)
    pub fn dense(seed: u64) -> Self {
        AggregateDSTConfig {
            seed,
            num_tags: 1,
            num_positions: 3,
            num_items: 4,
            num_reasons: 1,
            fields_per_bucket: 300,
            max_count: 5,
            line_limit: 3,
            shuffles: 4,
        }
    }

    /// Positions beyond the line limit, long tail of small items
    pub fn sparse_wide(seed: u64) -> Self {
        AggregateDSTConfig {
            seed,
            num_tags: 5,
            num_positions: 80,
            num_items: 500,
            num_reasons: 3,
            fields_per_bucket: 400,
            max_count: 1000,
            line_limit: 40,
            shuffles: 2,
        }
    }
}

/// Result of an aggregation DST run
#[derive(Debug, Clone)]
pub struct AggregateDSTResult {
    pub seed: u64,
    pub rounds: u64,
    pub fields: u64,
    pub experiments: u64,
    pub rendered_rows: u64,
    pub invariant_violations: Vec<String>,
}

impl AggregateDSTResult {
    pub fn new(seed: u64) -> Self {
        AggregateDSTResult {
            seed,
            rounds: 0,
            fields: 0,
            experiments: 0,
            rendered_rows: 0,
            invariant_violations: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Seed {}: {} rounds ({} fields, {} experiments, {} rows), {} violations",
            self.seed,
            self.rounds,
            self.fields,
            self.experiments,
            self.rendered_rows,
            self.invariant_violations.len()
        )
    }
}

type CellKey = (String, usize, String, String);

/// DST harness for the aggregation pipeline
pub struct AggregateDSTHarness {
    config: AggregateDSTConfig,
    rng: DeterministicRng,
    result: AggregateDSTResult,
}

impl AggregateDSTHarness {
    pub fn new(config: AggregateDSTConfig) -> Self {
        let rng = DeterministicRng::new(config.seed);
        AggregateDSTHarness {
            result: AggregateDSTResult::new(config.seed),
            config,
            rng,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(AggregateDSTConfig::new(seed))
    }

    fn pick(&mut self, n: usize) -> usize {
        self.rng.gen_range(0, n.max(1) as u64) as usize
    }

    /// Random bucket contents plus the expected per-cell sums
    fn generate_bucket(&mut self) -> (Vec<(String, String)>, HashMap<CellKey, u64>) {
        let mut fields = Vec::with_capacity(self.config.fields_per_bucket);
        let mut expected: HashMap<CellKey, u64> = HashMap::new();

        for i in 0..self.config.fields_per_bucket {
            let tag = format!("exp{}", self.pick(self.config.num_tags));
            let position = self.pick(self.config.num_positions);
            let item = format!("{}", 5000 + self.pick(self.config.num_items));
            let reason = format!("reason{}", self.pick(self.config.num_reasons));
            let count = self.rng.gen_range(1, self.config.max_count + 1);

            let label = match KeyCodec::encode_label(&tag, &reason, position, &item) {
                Ok(label) => label,
                Err(e) => {
                    self.result
                        .invariant_violations
                        .push(format!("Generated label rejected: {}", e));
                    continue;
                }
            };
            // Unique token per field so every field survives in the hash
            let field = KeyCodec::encode_field(&label, &format!("{:08x}", i));

            *expected.entry((tag, position, item, reason)).or_insert(0) += count;
            fields.push((field, count.to_string()));
        }

        (fields, expected)
    }

    fn run_round(&mut self) {
        let (mut fields, expected) = self.generate_bucket();
        let aggregator = DistributionAggregator::new(self.config.line_limit);
        let round = self.result.rounds + 1;

        let baseline = match aggregator.aggregate(fields.iter().map(|(k, v)| (k, v))) {
            Ok(agg) => agg,
            Err(e) => {
                self.result
                    .invariant_violations
                    .push(format!("Round #{}: aggregation failed: {}", round, e));
                return;
            }
        };

        if let Err(violation) = self.check_invariants(&baseline, &fields, &expected) {
            self.result
                .invariant_violations
                .push(format!("Round #{}: {}", round, violation));
        }

        for shuffle in 0..self.config.shuffles {
            self.rng.shuffle(&mut fields);
            match aggregator.aggregate(fields.iter().map(|(k, v)| (k, v))) {
                Ok(shuffled) if shuffled == baseline => {}
                Ok(_) => self.result.invariant_violations.push(format!(
                    "Round #{}: shuffle {} produced a different aggregate",
                    round, shuffle
                )),
                Err(e) => self.result.invariant_violations.push(format!(
                    "Round #{}: shuffle {} failed: {}",
                    round, shuffle, e
                )),
            }
        }

        let rows = ReportSerializer::render_report(&baseline);
        self.result.rendered_rows += rows.len() as u64;
        self.result.experiments += baseline.len() as u64;
        self.result.fields += fields.len() as u64;
        self.result.rounds += 1;
    }

    fn check_invariants(
        &self,
        aggregate: &Aggregate,
        fields: &[(String, String)],
        expected: &HashMap<CellKey, u64>,
    ) -> Result<(), String> {
        // Invariant 1: Conservation of count
        let input_total: u64 = fields
            .iter()
            .map(|(_, v)| v.parse::<u64>().unwrap_or(0))
            .sum();
        if aggregate.total_count() != input_total {
            return Err(format!(
                "Count not conserved: aggregated={}, input={}",
                aggregate.total_count(),
                input_total
            ));
        }

        // Invariant 2: Every cell holds exactly its expected sum
        for ((tag, position, item, reason), count) in expected {
            let actual = aggregate
                .get(tag)
                .and_then(|positions| positions.get(*position))
                .and_then(|table| table.get(item, reason));
            if actual != Some(*count) {
                return Err(format!(
                    "Cell ({}, {}, {}, {}) mismatch: actual={:?}, expected={}",
                    tag, position, item, reason, actual, count
                ));
            }
        }

        for (tag, positions) in aggregate.iter() {
            // Invariant 3: line_limit is a floor, highest index always fits
            let highest = expected
                .keys()
                .filter(|(t, ..)| t == tag)
                .map(|(_, p, ..)| *p)
                .max()
                .unwrap_or(0);
            let expected_len = self.config.line_limit.max(highest + 1);
            if positions.len() != expected_len {
                return Err(format!(
                    "Experiment {} has {} positions, expected {}",
                    tag,
                    positions.len(),
                    expected_len
                ));
            }

            let max_fields = positions.max_entries();
            for (index, table) in positions.iter().enumerate() {
                let Some(ranked) = DistributionNormalizer::normalize(table) else {
                    if !table.is_empty() {
                        return Err(format!("{}[{}] non-empty table not ranked", tag, index));
                    }
                    continue;
                };

                // Invariant 4: Probabilities sum to 1
                let sum: f64 = ranked.entries().iter().map(|e| e.probability).sum();
                if (sum - 1.0).abs() > 1e-9 {
                    return Err(format!("{}[{}] probabilities sum to {}", tag, index, sum));
                }

                // Invariant 5: Ranking is non-increasing
                if ranked
                    .entries()
                    .windows(2)
                    .any(|w| w[0].count < w[1].count)
                {
                    return Err(format!("{}[{}] ranking not descending", tag, index));
                }

                // Invariant 6: Rendered line never shows 0.00 and stays paired
                let (items, probs) = ReportSerializer::serialize_line(&ranked, max_fields);
                if items.len() != probs.len() {
                    return Err(format!(
                        "{}[{}] label/probability length mismatch: {} vs {}",
                        tag,
                        index,
                        items.len(),
                        probs.len()
                    ));
                }
                if probs.iter().any(|p| p == "0.00") {
                    return Err(format!("{}[{}] rendered a 0.00 probability", tag, index));
                }
            }
        }

        Ok(())
    }

    pub fn run(&mut self, rounds: usize) {
        for _ in 0..rounds {
            self.run_round();
            if !self.result.invariant_violations.is_empty() {
                break;
            }
        }
    }

    pub fn result(&self) -> &AggregateDSTResult {
        &self.result
    }
}

/// Run a batch of DST tests
pub fn run_aggregate_batch(
    start_seed: u64,
    num_seeds: usize,
    rounds_per_seed: usize,
    config_fn: fn(u64) -> AggregateDSTConfig,
) -> Vec<AggregateDSTResult> {
    (0..num_seeds)
        .map(|i| {
            let seed = start_seed + i as u64;
            let mut harness = AggregateDSTHarness::new(config_fn(seed));
            harness.run(rounds_per_seed);
            harness.result().clone()
        })
        .collect()
}

/// Summarize batch results
pub fn summarize_aggregate_batch(results: &[AggregateDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let failed = total - passed;
    let total_fields: u64 = results.iter().map(|r| r.fields).sum();

    let mut summary = format!(
        "Aggregate DST Summary\n\
         =====================\n\
         Seeds: {} total, {} passed, {} failed\n\
         Total fields: {}\n",
        total, passed, failed, total_fields
    );

    if failed > 0 {
        summary.push_str("\nFailed seeds:\n");
        for result in results.iter().filter(|r| !r.is_success()) {
            summary.push_str(&format!("  Seed {}: {}\n", result.seed, result.summary()));
            for violation in &result.invariant_violations {
                summary.push_str(&format!("    - {}\n", violation));
            }
        }
    }

    summary
}
