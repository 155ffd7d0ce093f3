//! Counter Recorder - the producer side of the bucket hashes
//!
//! Writers call `incr(label)` on a cloneable handle; a single actor task owns
//! the counters and flushes them into the current bucket on a timer.
//!
//! ```text
//! Writer 1 ──┐
//! Writer 2 ──┤──► RecorderActor ──► counters ──► flush tick ──► HSET bucket
//! Writer 3 ──┘
//! ```
//!
//! Every flush writes the cumulative count of each label under
//! `<label>:<worker_token>`, so several processes recording into the same
//! bucket never overwrite each other and a repeated flush is idempotent.
//! A failed write therefore only delays counts: the next flush rewrites them.

use crate::clock::StatClock;
use crate::config::RecorderConfig;
use crate::error::StatError;
use crate::rng::worker_token;
use crate::stats::{format_bucket_key, BucketSelector, KeyCodec};
use crate::store::CounterStore;
use ahash::AHashMap;
use chrono::{NaiveDateTime, TimeDelta};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Messages for the recorder actor
pub enum RecorderMessage {
    /// Count one occurrence of a label
    Incr { label: String },
    /// Flush now and report back when done
    Flush { response_tx: oneshot::Sender<()> },
    /// Final flush, then stop
    Shutdown { response_tx: oneshot::Sender<()> },
}

/// Fields of one bucket, ready for `write_bucket`
type BucketFields = Vec<(String, String)>;

/// Recorder actor that owns the in-memory counters
pub struct RecorderActor<S: CounterStore, C: StatClock> {
    store: S,
    clock: C,
    selector: BucketSelector,
    period: TimeDelta,
    key_ttl: Option<Duration>,
    flush_period: Duration,
    worker_token: String,
    rx: mpsc::UnboundedReceiver<RecorderMessage>,
    counters: AHashMap<String, u64>,
    current_bucket_start: NaiveDateTime,
    /// Counts changed since the last write that reached the store
    updated_since_last_flush: bool,
    /// Ended buckets whose final write failed, retried on every flush
    unflushed: Vec<(String, BucketFields)>,
}

impl<S: CounterStore, C: StatClock> RecorderActor<S, C> {
    /// Run the actor loop
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.flush_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                msg = self.rx.recv() => {
                    let Some(msg) = msg else {
                        // Every handle dropped
                        self.roll_and_flush();
                        self.report_undelivered();
                        break;
                    };
                    if self.handle_message(msg) {
                        break;
                    }
                }
                _ = ticker.tick() => self.roll_and_flush(),
            }
        }
    }

    /// Handle a single message. Returns true if shutdown.
    fn handle_message(&mut self, msg: RecorderMessage) -> bool {
        match msg {
            RecorderMessage::Incr { label } => {
                let count = self.counters.entry(label).or_insert(0);
                *count = count.saturating_add(1);
                self.updated_since_last_flush = true;
                false
            }
            RecorderMessage::Flush { response_tx } => {
                self.roll_and_flush();
                let _ = response_tx.send(());
                false
            }
            RecorderMessage::Shutdown { response_tx } => {
                self.roll_and_flush();
                self.report_undelivered();
                info!("Counter recorder {} shutting down", self.worker_token);
                let _ = response_tx.send(());
                true
            }
        }
    }

    /// Flush, moving to a new bucket first if the current one has ended
    ///
    /// Counts gathered since the last flush still belong to the bucket that
    /// was current when they were taken, so they are written before rolling.
    /// If that write fails the old bucket's fields are kept until one lands.
    fn roll_and_flush(&mut self) {
        self.retry_unflushed();

        let now = self.clock.now();
        if self.current_bucket_start + self.period < now {
            if !self.flush_counters() {
                let bucket_key = self.current_bucket_key();
                warn!(
                    "Recorder {} keeping {} unwritten fields of ended bucket {}",
                    self.worker_token,
                    self.counters.len(),
                    bucket_key
                );
                let fields = self.encode_fields();
                self.unflushed.push((bucket_key, fields));
            }
            self.current_bucket_start = self.selector.bucket_start(now);
            self.counters.clear();
            self.updated_since_last_flush = false;
            debug!(
                "Recorder {} rolled to bucket {}",
                self.worker_token,
                self.current_bucket_key()
            );
            return;
        }
        self.flush_counters();
    }

    fn current_bucket_key(&self) -> String {
        format_bucket_key(self.selector.prefix(), self.current_bucket_start)
    }

    /// Cumulative count of every label under this worker's field names
    fn encode_fields(&self) -> BucketFields {
        let mut fields: BucketFields = self
            .counters
            .iter()
            .map(|(label, count)| {
                (
                    KeyCodec::encode_field(label, &self.worker_token),
                    count.to_string(),
                )
            })
            .collect();
        fields.sort();
        fields
    }

    /// Write the current counters if they changed. Returns false if the
    /// write failed; the counters stay dirty so the next flush rewrites them.
    fn flush_counters(&mut self) -> bool {
        if !self.updated_since_last_flush || self.counters.is_empty() {
            self.updated_since_last_flush = false;
            return true;
        }

        let bucket_key = self.current_bucket_key();
        let fields = self.encode_fields();
        if !self.write_with_retry(&bucket_key, &fields) {
            return false;
        }

        self.updated_since_last_flush = false;
        debug!("Flushed {} fields to {}", fields.len(), bucket_key);
        true
    }

    fn retry_unflushed(&mut self) {
        if self.unflushed.is_empty() {
            return;
        }

        for (bucket_key, fields) in std::mem::take(&mut self.unflushed) {
            if self.write_with_retry(&bucket_key, &fields) {
                info!(
                    "Recorder {} caught up ended bucket {}",
                    self.worker_token, bucket_key
                );
            } else {
                self.unflushed.push((bucket_key, fields));
            }
        }
    }

    /// HSET with one retry, then refresh the expiry
    fn write_with_retry(&self, bucket_key: &str, fields: &[(String, String)]) -> bool {
        if let Err(e) = self.store.write_bucket(bucket_key, fields) {
            warn!("Flush to {} failed, retrying once: {}", bucket_key, e);
            if let Err(e) = self.store.write_bucket(bucket_key, fields) {
                error!(
                    "Flush to {} failed again, {} fields kept for the next flush: {}",
                    bucket_key,
                    fields.len(),
                    e
                );
                return false;
            }
        }

        if let Some(ttl) = self.key_ttl {
            if let Err(e) = self.store.expire(bucket_key, ttl) {
                warn!("Setting expiry on {} failed: {}", bucket_key, e);
            }
        }
        true
    }

    /// Log whatever a final flush could not deliver
    fn report_undelivered(&self) {
        if self.updated_since_last_flush {
            error!(
                "Recorder {} stopping with {} unwritten fields in {}",
                self.worker_token,
                self.counters.len(),
                self.current_bucket_key()
            );
        }
        for (bucket_key, fields) in &self.unflushed {
            error!(
                "Recorder {} stopping with {} unwritten fields in {}",
                self.worker_token,
                fields.len(),
                bucket_key
            );
        }
    }
}

/// Handle for sending counts to the recorder actor
#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::UnboundedSender<RecorderMessage>,
    worker_token: String,
}

impl RecorderHandle {
    /// Count one occurrence of `label` (fire-and-forget)
    pub fn incr(&self, label: impl Into<String>) {
        let _ = self.tx.send(RecorderMessage::Incr {
            label: label.into(),
        });
    }

    /// Count one occurrence of an item shown at a position
    pub fn incr_item(
        &self,
        experiment_tag: &str,
        reason: &str,
        position_index: usize,
        item_id: &str,
    ) -> Result<(), StatError> {
        let label = KeyCodec::encode_label(experiment_tag, reason, position_index, item_id)?;
        self.incr(label);
        Ok(())
    }

    /// Flush pending counts and wait until the write has been attempted
    pub async fn flush(&self) -> Result<(), StatError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(RecorderMessage::Flush { response_tx })
            .map_err(|_| StatError::StoreUnavailable("recorder actor unavailable".to_string()))?;
        response_rx
            .await
            .map_err(|_| StatError::StoreUnavailable("recorder actor dropped flush ack".to_string()))
    }

    /// Graceful shutdown, waits for the final flush
    pub async fn shutdown(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .tx
            .send(RecorderMessage::Shutdown { response_tx })
            .is_ok()
        {
            let _ = response_rx.await;
        }
    }

    /// Dedup token appended to every field this recorder writes
    pub fn worker_token(&self) -> &str {
        &self.worker_token
    }
}

/// Spawn a recorder actor and return its handle + join handle
///
/// Must be called from within a tokio runtime.
pub fn spawn_recorder<S: CounterStore, C: StatClock>(
    store: S,
    config: RecorderConfig,
    clock: C,
) -> Result<(RecorderHandle, tokio::task::JoinHandle<()>), StatError> {
    config.validate()?;
    let selector = config.selector()?;
    let token = worker_token();
    let (tx, rx) = mpsc::unbounded_channel();

    let actor = RecorderActor {
        current_bucket_start: selector.bucket_start(clock.now()),
        period: selector.period(),
        key_ttl: config.key_ttl(),
        flush_period: config.flush_period,
        worker_token: token.clone(),
        store,
        clock,
        selector,
        rx,
        counters: AHashMap::new(),
        updated_since_last_flush: false,
        unflushed: Vec::new(),
    };

    info!(
        "Counter recorder {} started, bucket {}",
        token,
        actor.current_bucket_key()
    );
    let task = tokio::spawn(actor.run());

    let handle = RecorderHandle {
        tx,
        worker_token: token,
    };
    Ok((handle, task))
}
