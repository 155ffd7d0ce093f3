//! Redis-backed counter store
//!
//! One hash per bucket: `HGETALL` for reads, `HSET` for writes, `EXPIRE` for
//! retention. Transport and server errors surface as `StoreUnavailable`.

use super::CounterStore;
use crate::error::StatError;
use parking_lot::Mutex;
use redis::Commands;
use std::time::Duration;
use tracing::debug;

pub struct RedisCounterStore {
    conn: Mutex<redis::Connection>,
}

impl RedisCounterStore {
    /// Connect to `url`, e.g. `redis://:password@127.0.0.1:6379/0`
    pub fn connect(url: &str) -> Result<Self, StatError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection()?;
        debug!("Connected to counter store at {}", url);
        Ok(RedisCounterStore {
            conn: Mutex::new(conn),
        })
    }
}

impl CounterStore for RedisCounterStore {
    fn fetch_bucket(&self, bucket_key: &str) -> Result<Vec<(String, String)>, StatError> {
        let mut conn = self.conn.lock();
        let fields: Vec<(String, String)> = conn.hgetall(bucket_key)?;
        Ok(fields)
    }

    fn write_bucket(&self, bucket_key: &str, fields: &[(String, String)]) -> Result<(), StatError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock();
        let _: () = conn.hset_multiple(bucket_key, fields)?;
        Ok(())
    }

    fn expire(&self, bucket_key: &str, ttl: Duration) -> Result<(), StatError> {
        let secs = i64::try_from(ttl.as_secs()).map_err(|_| {
            StatError::invalid_config(format!("ttl {:?} is out of range", ttl))
        })?;
        let mut conn = self.conn.lock();
        let _: bool = conn.expire(bucket_key, secs)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_to_unreachable_server_is_store_error() {
        // Port 1 is never a Redis server
        match RedisCounterStore::connect("redis://127.0.0.1:1/0") {
            Err(err) => assert!(err.is_store_error()),
            Ok(_) => panic!("connection to port 1 should fail"),
        }
    }

    #[test]
    fn test_bad_url_is_rejected() {
        assert!(RedisCounterStore::connect("not a url").is_err());
    }

    #[test]
    #[ignore] // Needs a Redis server: cargo test redis_round_trip -- --ignored
    fn test_redis_round_trip() {
        let url = std::env::var("DIST_STAT_TEST_REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379/15".to_string());
        let store = RedisCounterStore::connect(&url).unwrap();
        let bucket = format!("dist_stat_test:{}", crate::rng::worker_token());

        assert!(store.fetch_bucket(&bucket).unwrap().is_empty());

        let fields = vec![
            ("c:normal:0:5120:aaa".to_string(), "3".to_string()),
            ("c:normal:0:5121:aaa".to_string(), "5".to_string()),
        ];
        store.write_bucket(&bucket, &fields).unwrap();
        // HSET overwrites an existing field
        store
            .write_bucket(&bucket, &[("c:normal:0:5120:aaa".to_string(), "4".to_string())])
            .unwrap();
        store.expire(&bucket, Duration::from_secs(60)).unwrap();

        let mut fetched = store.fetch_bucket(&bucket).unwrap();
        fetched.sort();
        assert_eq!(
            fetched,
            vec![
                ("c:normal:0:5120:aaa".to_string(), "4".to_string()),
                ("c:normal:0:5121:aaa".to_string(), "5".to_string()),
            ]
        );

        let ttl: i64 = redis::cmd("TTL")
            .arg(&bucket)
            .query(&mut *store.conn.lock())
            .unwrap();
        assert!((1..=60).contains(&ttl), "unexpected ttl {}", ttl);

        let _: () = redis::cmd("DEL")
            .arg(&bucket)
            .query(&mut *store.conn.lock())
            .unwrap();
    }
}
