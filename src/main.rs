//! dist-stat: render the positional distribution report for one bucket
//!
//! Settings come from `DIST_STAT_*` environment variables (see `config`).
//! `DIST_STAT_AT` picks the report instant (default: now) and
//! `DIST_STAT_OUTPUT` the CSV file (default: `output.csv`).

use dist_stat::observability::init_tracing;
use dist_stat::{parse_timestamp, CsvSink, ItemStat, RedisCounterStore, StatConfig};
use tracing::info;

const DEFAULT_OUTPUT: &str = "output.csv";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = StatConfig::from_env()?;
    let output = std::env::var("DIST_STAT_OUTPUT").unwrap_or_else(|_| DEFAULT_OUTPUT.to_string());

    info!(
        "dist-stat: prefix={} period={:?} store={}",
        config.key_prefix, config.period, config.redis_url
    );

    let store = RedisCounterStore::connect(&config.redis_url)?;
    let stat = ItemStat::new(store, &config)?;

    let rows = match std::env::var("DIST_STAT_AT") {
        Ok(raw) => stat.stat(parse_timestamp(&raw)?)?,
        Err(_) => stat.stat_now()?,
    };

    CsvSink::write_file(&output, &rows)?;
    info!("Wrote {} rows to {}", rows.len(), output);
    Ok(())
}
