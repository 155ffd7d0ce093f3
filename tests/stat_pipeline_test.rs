//! End-to-end report tests: bucket in the store -> rows -> CSV

use dist_stat::{
    parse_timestamp, spawn_recorder, CsvSink, InMemoryCounterStore, ItemStat, RecorderConfig,
    SimulatedClock, StatConfig, StatError,
};
use std::time::Duration;

fn stat_config() -> StatConfig {
    StatConfig {
        key_prefix: "exp".to_string(),
        period_start: parse_timestamp("2024-03-01 00:00:00").unwrap(),
        period: Duration::from_secs(3600),
        ..StatConfig::default()
    }
}

fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

#[test]
fn test_two_experiments_two_positions() {
    let store = InMemoryCounterStore::new();
    store.insert_bucket(
        "exp:20240301140000",
        [
            ("c:normal:0:5120:aaa", "3"),
            ("c:normal:0:5120:bbb", "2"),
            ("c:normal:0:5121:ccc", "5"),
            ("c:hot:1:9:aaa", "1"),
            ("d:normal:0:42:aaa", "4"),
        ],
    );
    let stat = ItemStat::new(store, &stat_config()).unwrap();

    let rows = stat
        .stat(parse_timestamp("2024-03-01 14:30:00").unwrap())
        .unwrap();

    assert_eq!(
        rows,
        vec![
            row(&["exp_tag: c", "log_count: 11"]),
            row(&["rank 1", "5120,normal", "5121,normal"]),
            row(&["ratio", "0.50", "0.50"]),
            row(&["rank 2", "9,hot"]),
            row(&["ratio", "1.00"]),
            row(&[]),
            row(&["exp_tag: d", "log_count: 4"]),
            row(&["rank 1", "42,normal"]),
            row(&["ratio", "1.00"]),
            row(&[]),
        ]
    );
}

#[test]
fn test_gap_positions_are_skipped() {
    let store = InMemoryCounterStore::new();
    store.insert_bucket("exp:20240301000000", [("c:r:2:7:t", "4")]);
    let stat = ItemStat::new(store, &stat_config()).unwrap();

    let rows = stat
        .stat(parse_timestamp("2024-03-01 00:00:00").unwrap())
        .unwrap();
    assert_eq!(rows[1], row(&["rank 3", "7,r"]));
    assert_eq!(rows.len(), 4);
}

#[test]
fn test_near_zero_share_is_suppressed() {
    let store = InMemoryCounterStore::new();
    store.insert_bucket(
        "exp:20240301000000",
        [("c:r:0:1:t", "999"), ("c:r:0:2:t", "1")],
    );
    let stat = ItemStat::new(store, &stat_config()).unwrap();

    let rows = stat
        .stat(parse_timestamp("2024-03-01 00:10:00").unwrap())
        .unwrap();
    assert_eq!(rows[0], row(&["exp_tag: c", "log_count: 1000"]));
    assert_eq!(rows[1], row(&["rank 1", "1,r"]));
    assert_eq!(rows[2], row(&["ratio", "1.00"]));
}

#[test]
fn test_empty_bucket_writes_empty_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("output.csv");
    let stat = ItemStat::new(InMemoryCounterStore::new(), &stat_config()).unwrap();

    let rows = stat
        .stat(parse_timestamp("2024-03-01 09:00:00").unwrap())
        .unwrap();
    CsvSink::write_file(&path, &rows).unwrap();

    assert!(rows.is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
}

#[test]
fn test_report_as_csv() {
    let store = InMemoryCounterStore::new();
    store.insert_bucket(
        "exp:20240301140000",
        [("c:normal:0:5120:aaa", "5"), ("c:normal:0:5121:ccc", "5")],
    );
    let stat = ItemStat::new(store, &stat_config()).unwrap();

    let rows = stat
        .stat(parse_timestamp("2024-03-01 14:00:00").unwrap())
        .unwrap();
    let csv = CsvSink::to_string(&rows).unwrap();

    assert!(csv.starts_with(
        "exp_tag: c,log_count: 10\n\
         rank 1,\"5120,normal\",\"5121,normal\"\n\
         ratio,0.50,0.50\n"
    ));
    // Separator row
    assert_eq!(csv.lines().count(), 4);
}

#[test]
fn test_malformed_field_aborts_report() {
    let store = InMemoryCounterStore::new();
    store.insert_bucket(
        "exp:20240301140000",
        [("c:normal:0:5120:aaa", "5"), ("c:normal:x:5121:ccc", "5")],
    );
    let stat = ItemStat::new(store, &stat_config()).unwrap();

    let err = stat
        .stat(parse_timestamp("2024-03-01 14:00:00").unwrap())
        .unwrap_err();
    assert!(matches!(err, StatError::MalformedKey { .. }));
}

#[test]
fn test_unavailable_store() {
    let store = InMemoryCounterStore::new();
    store.set_unavailable(true);
    let stat = ItemStat::new(store, &stat_config()).unwrap();

    let err = stat
        .stat(parse_timestamp("2024-03-01 14:00:00").unwrap())
        .unwrap_err();
    assert!(err.is_store_error());
}

#[tokio::test]
async fn test_two_recorders_feed_one_report() {
    let store = InMemoryCounterStore::new();
    let clock = SimulatedClock::new(parse_timestamp("2024-03-01 14:05:00").unwrap());
    let recorder_config = RecorderConfig {
        key_prefix: "exp".to_string(),
        period_start: parse_timestamp("2024-03-01 00:00:00").unwrap(),
        period: Duration::from_secs(3600),
        key_ttl: Duration::ZERO,
        flush_period: Duration::from_secs(3600),
    };

    let (first, first_task) =
        spawn_recorder(store.clone(), recorder_config.clone(), clock.clone()).unwrap();
    let (second, second_task) =
        spawn_recorder(store.clone(), recorder_config, clock.clone()).unwrap();

    for _ in 0..3 {
        first.incr_item("c", "normal", 0, "5120").unwrap();
    }
    for _ in 0..2 {
        second.incr_item("c", "normal", 0, "5120").unwrap();
    }
    for _ in 0..5 {
        second.incr_item("c", "normal", 0, "5121").unwrap();
    }
    first.shutdown().await;
    second.shutdown().await;
    first_task.await.unwrap();
    second_task.await.unwrap();

    let stat = ItemStat::new(store, &stat_config()).unwrap();
    let rows = stat.stat_at(&clock).unwrap();

    assert_eq!(rows[0], row(&["exp_tag: c", "log_count: 10"]));
    assert_eq!(rows[2], row(&["ratio", "0.50", "0.50"]));
    assert_eq!(rows[1].len(), 3);
}
