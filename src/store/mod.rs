//! Counter Store Abstraction
//!
//! Counters for one time bucket live as fields of a single hash. The report
//! path only ever reads a whole bucket; the recorder overwrites fields and
//! refreshes the bucket's expiry.
//!
//! Implementations:
//! - `InMemoryCounterStore`: For unit tests and DST
//! - `RedisCounterStore`: For production

mod redis_store;

pub use redis_store::RedisCounterStore;

use crate::error::StatError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Hash-per-bucket counter storage
pub trait CounterStore: Send + Sync + 'static {
    /// All `(field, value)` pairs of a bucket; an absent bucket is empty, not an error
    fn fetch_bucket(&self, bucket_key: &str) -> Result<Vec<(String, String)>, StatError>;

    /// Set fields of a bucket, overwriting existing values (HSET semantics)
    fn write_bucket(&self, bucket_key: &str, fields: &[(String, String)]) -> Result<(), StatError>;

    /// Expire the bucket after `ttl`
    fn expire(&self, bucket_key: &str, ttl: Duration) -> Result<(), StatError>;
}

#[derive(Debug, Clone, Default)]
struct StoredBucket {
    /// Fields in first-write order
    fields: Vec<(String, String)>,
    ttl: Option<Duration>,
}

/// In-memory counter store
///
/// Clones share the same data. Supports fault injection so callers can be
/// tested against an unreachable store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCounterStore {
    buckets: Arc<RwLock<HashMap<String, StoredBucket>>>,
    unavailable: Arc<AtomicBool>,
    failing_writes: Arc<AtomicU32>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a bucket with fields (for testing)
    pub fn insert_bucket<K, V>(&self, bucket_key: &str, fields: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut buckets = self.buckets.write();
        let bucket = buckets.entry(bucket_key.to_string()).or_default();
        for (field, value) in fields {
            set_field(bucket, field.into(), value.into());
        }
    }

    /// Make every call fail with `StoreUnavailable` until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `count` writes with `StoreUnavailable`
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Expiry last applied to a bucket (for testing)
    pub fn ttl(&self, bucket_key: &str) -> Option<Duration> {
        self.buckets.read().get(bucket_key).and_then(|b| b.ttl)
    }

    /// Keys of all stored buckets, sorted (for testing)
    pub fn bucket_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.buckets.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.buckets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.read().is_empty()
    }

    fn check_available(&self) -> Result<(), StatError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StatError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

fn set_field(bucket: &mut StoredBucket, field: String, value: String) {
    match bucket.fields.iter_mut().find(|(f, _)| *f == field) {
        Some(slot) => slot.1 = value,
        None => bucket.fields.push((field, value)),
    }
}

impl CounterStore for InMemoryCounterStore {
    fn fetch_bucket(&self, bucket_key: &str) -> Result<Vec<(String, String)>, StatError> {
        self.check_available()?;
        Ok(self
            .buckets
            .read()
            .get(bucket_key)
            .map(|b| b.fields.clone())
            .unwrap_or_default())
    }

    fn write_bucket(&self, bucket_key: &str, fields: &[(String, String)]) -> Result<(), StatError> {
        self.check_available()?;
        let pending = self.failing_writes.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_writes.store(pending - 1, Ordering::SeqCst);
            return Err(StatError::StoreUnavailable("injected write failure".to_string()));
        }

        let mut buckets = self.buckets.write();
        let bucket = buckets.entry(bucket_key.to_string()).or_default();
        for (field, value) in fields {
            set_field(bucket, field.clone(), value.clone());
        }
        Ok(())
    }

    fn expire(&self, bucket_key: &str, ttl: Duration) -> Result<(), StatError> {
        self.check_available()?;
        if let Some(bucket) = self.buckets.write().get_mut(bucket_key) {
            bucket.ttl = Some(ttl);
        }
        Ok(())
    }
}
